use faststr::FastStr;

pub const PREVIEW_BYTES: usize = 100;

/// Lossy text preview of a raw chunk, cut at `limit` bytes.
pub fn preview(chunk: &[u8], limit: usize) -> FastStr {
    let cut = chunk.len().min(limit);
    let mut text = String::from_utf8_lossy(&chunk[..cut]).into_owned();
    if chunk.len() > limit {
        text.push_str("...");
    }
    text.into()
}
