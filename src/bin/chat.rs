use anyhow::Result;
use clap::Parser;
use common::{LogTarget, data::ChatEntry};
use dotenvy::dotenv;
use futures_util::StreamExt;
use std::io::Write;
use stream_client::{ChatTurn, HttpTransport, StreamingClient, TurnEvent};

/// Sends one message through the relay gateway and prints the reply as it
/// streams in.
#[derive(Parser, Debug)]
#[command(name = "emissary-chat", author, version, about)]
struct Args {
    /// Relay gateway proxy URL.
    #[arg(long, env = "GATEWAY_URL", default_value = "http://127.0.0.1:3000/api/proxy")]
    gateway_url: String,

    /// Backend endpoint the gateway forwards to.
    #[arg(long, default_value = "/vac/streaming/emissary")]
    endpoint: String,

    #[arg(long)]
    instructions: Option<String>,

    /// The message, words are joined with spaces.
    #[arg(required = true, trailing_var_arg = true)]
    message: Vec<String>,
}

impl Args {
    fn to_turn(&self) -> ChatTurn {
        let message = self.message.join(" ");
        let mut turn = ChatTurn::new(message.clone(), self.endpoint.clone());
        turn.instructions = self.instructions.clone().map(Into::into);
        turn.human_chat_history = vec![ChatEntry::new("user", message)];
        turn
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    // stdout carries the reply
    let _guard = common::logging(LogTarget::Stderr, common::default_level());

    let transport = HttpTransport::new(args.gateway_url.clone())?;
    tracing::debug!(gateway = transport.gateway_url(), "sending turn");
    let client = StreamingClient::new(transport);
    let mut events = client.turn(&args.to_turn())?;
    let mut printed = 0;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        let event = event?;
        match &event {
            TurnEvent::Partial(_) => {
                // deliveries are cumulative, print only what is new
                let content = event.content();
                stdout.write_all(content[printed..].as_bytes())?;
                stdout.flush()?;
                printed = content.len();
            }
            TurnEvent::Complete(_) => writeln!(stdout)?,
            TurnEvent::Fallback(apology) => writeln!(stdout, "{apology}")?,
        }
    }

    Ok(())
}
