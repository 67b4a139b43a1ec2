mod debug;
mod proxy;

pub use debug::debug_router;
pub use proxy::{error_response, json_response, proxy_router, relayed_response};
