use crate::decode::Utf8Decoder;
use crate::error::{Error, Result};
use crate::lock::StreamLock;
use crate::transport::{ByteStream, Transport};
use async_stream::stream;
use common::{
    RetryPolicy,
    data::{BotMessage, ChatEntry, ChatPayload, Document, ForwardRequest, Method},
    retry_with_backoff,
};
use faststr::FastStr;
use futures_util::{Stream, StreamExt};
use std::{pin::Pin, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub const STREAM_TIMEOUT: Duration = Duration::from_secs(60);
pub const FALLBACK_MESSAGE: &str = "Sorry, an error occurred. Please try again.";

/// Events of one turn, in order. `Partial` and `Complete` carry the whole
/// reply accumulated so far, not the latest chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Partial(FastStr),
    Complete(FastStr),
    /// The turn failed before anything was received.
    Fallback(FastStr),
}

impl TurnEvent {
    pub fn content(&self) -> &FastStr {
        match self {
            Self::Partial(c) | Self::Complete(c) | Self::Fallback(c) => c,
        }
    }

    pub fn into_bot_message(self) -> BotMessage {
        match self {
            Self::Partial(c) | Self::Complete(c) | Self::Fallback(c) => BotMessage::bot(c),
        }
    }
}

pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub user_message:       FastStr,
    pub chat_history:       Vec<ChatEntry>,
    pub human_chat_history: Vec<ChatEntry>,
    pub api_endpoint:       FastStr,
    pub instructions:       Option<FastStr>,
    pub documents:          Option<Vec<Document>>,
}

impl ChatTurn {
    pub fn new(user_message: impl Into<FastStr>, api_endpoint: impl Into<FastStr>) -> Self {
        Self {
            user_message: user_message.into(),
            api_endpoint: api_endpoint.into(),
            ..Default::default()
        }
    }

    pub fn to_request(&self) -> Result<ForwardRequest> {
        let payload = ChatPayload {
            user_input:         self.user_message.clone(),
            chat_history:       self.chat_history.clone(),
            human_chat_history: self.human_chat_history.clone(),
            instructions:       self.instructions.clone(),
            documents:          self.documents.clone(),
            stream_only:        Some(true),
            stream_wait_time:   Some(1),
        };
        Ok(ForwardRequest::new(self.api_endpoint.clone(), Method::Post, true).with_payload(&payload)?)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Covers obtaining the response headers, retries included. Also the age
    /// after which a held lock counts as stale.
    pub timeout: Duration,
    pub retry:   RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: STREAM_TIMEOUT,
            retry:   RetryPolicy::default(),
        }
    }
}

pub struct StreamingClient<T> {
    transport: Arc<T>,
    lock:      StreamLock,
    config:    ClientConfig,
}

impl<T: Transport> StreamingClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        let lock = StreamLock::new(config.timeout);
        Self::with_lock(transport, config, lock)
    }

    /// Shares `lock` with whoever else holds a clone of it.
    pub fn with_lock(transport: T, config: ClientConfig, lock: StreamLock) -> Self {
        Self {
            transport: Arc::new(transport),
            lock,
            config,
        }
    }

    pub fn lock(&self) -> &StreamLock {
        &self.lock
    }

    /// Starts a turn. The lock is taken here, so a second call fails with
    /// [`Error::Busy`] before anything is sent. Nothing happens until the
    /// returned stream is polled; dropping it cancels the turn and frees the
    /// lock.
    pub fn turn(&self, turn: &ChatTurn) -> Result<TurnStream> {
        let permit = self.lock.try_acquire()?;
        let request = turn.to_request()?;
        let transport = self.transport.clone();
        let config = self.config.clone();

        Ok(Box::pin(stream! {
            let _permit = permit;
            let mut content = String::new();

            let opened = {
                let transport = transport.as_ref();
                let request = &request;
                timeout(
                    config.timeout,
                    retry_with_backoff(&config.retry, move |attempt| open(transport, request, attempt)),
                )
                .await
                .unwrap_or(Err(Error::Timeout(config.timeout)))
            };

            let failure = match opened {
                Ok(mut body) => {
                    let mut decoder = Utf8Decoder::new();
                    let mut chunks = 0u64;
                    let mut failure = None;
                    while let Some(chunk) = body.next().await {
                        let chunk = match chunk {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        };
                        chunks += 1;
                        let text = match decoder.decode(&chunk) {
                            Ok(text) => text,
                            Err(e) if chunks == 1 => {
                                warn!(error = %e, "error processing first chunk");
                                failure = Some(Error::Decode(e));
                                break;
                            }
                            Err(e) => {
                                warn!(chunk = chunks, error = %e, "invalid utf-8 in stream, replacing");
                                decoder.decode_lossy(&[])
                            }
                        };
                        debug!(chunk = chunks, chunk_size = chunk.len(), "received chunk");
                        if !text.is_empty() {
                            content.push_str(&text);
                            yield Ok(TurnEvent::Partial(content.clone().into()));
                        }
                    }
                    if failure.is_none() {
                        if let Some(tail) = decoder.finish() {
                            content.push_str(&tail);
                        }
                    }
                    // the body is released here whichever way the loop ended
                    drop(body);
                    failure
                }
                Err(e) => Some(e),
            };

            match failure {
                None => {
                    info!(bytes = content.len(), "stream complete");
                    if !content.is_empty() {
                        yield Ok(TurnEvent::Complete(content.into()));
                    }
                }
                Some(e) => {
                    error!(error = %e, delivered = !content.is_empty(), "streaming error");
                    if content.is_empty() {
                        yield Ok(TurnEvent::Fallback(FastStr::from_static_str(FALLBACK_MESSAGE)));
                    }
                    yield Err(e);
                }
            }
        }))
    }

    /// Runs a turn to the end, handing every event to `on_bot_message` as a
    /// bot message.
    pub async fn stream_chat<F>(&self, turn: &ChatTurn, mut on_bot_message: F) -> Result<()>
    where
        F: FnMut(BotMessage),
    {
        let mut events = self.turn(turn)?;
        while let Some(event) = events.next().await {
            on_bot_message(event?.into_bot_message());
        }
        Ok(())
    }
}

async fn open<T: Transport>(
    transport: &T,
    request: &ForwardRequest,
    attempt: u32,
) -> Result<ByteStream> {
    debug!(attempt = attempt + 1, endpoint = ?request.endpoint(), "posting turn");
    let mut res = transport.post(request).await?;
    if !res.status.is_success() {
        return Err(Error::HttpStatus(res.status.as_u16()));
    }
    res.body.take().ok_or(Error::NoBody)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use bytes::Bytes;
    use futures_util::stream;
    use reqwest::StatusCode;
    use serde_json::{Value, json};
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };
    use tokio::time::Instant;

    type Reply = Box<dyn Fn(u32) -> Result<TransportResponse> + Send + Sync>;

    struct FakeTransport {
        reply: Reply,
        calls: AtomicU32,
        seen:  Mutex<Vec<Value>>,
    }

    impl FakeTransport {
        fn new(reply: impl Fn(u32) -> Result<TransportResponse> + Send + Sync + 'static) -> Self {
            Self {
                reply: Box::new(reply),
                calls: AtomicU32::new(0),
                seen:  Mutex::new(vec![]),
            }
        }

        fn chunks(parts: Vec<Result<Vec<u8>>>) -> Self {
            let parts = Arc::new(Mutex::new(Some(parts)));
            Self::new(move |_| {
                let items = parts.lock().unwrap().take().unwrap_or_default();
                Ok(ok_body(items))
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for FakeTransport {
        async fn post(&self, request: &ForwardRequest) -> Result<TransportResponse> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(serde_json::to_value(request).unwrap());
            (self.reply)(attempt)
        }
    }

    fn ok_body(items: Vec<Result<Vec<u8>>>) -> TransportResponse {
        let body: ByteStream = stream::iter(items.into_iter().map(|i| i.map(Bytes::from))).boxed();
        TransportResponse::new(StatusCode::OK, body)
    }

    fn text(parts: &[&str]) -> Vec<Result<Vec<u8>>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    fn turn() -> ChatTurn {
        ChatTurn::new("hello", "/vac/streaming/emissary")
    }

    async fn collect(client: &StreamingClient<FakeTransport>) -> (Vec<BotMessage>, Result<()>) {
        let mut delivered = vec![];
        let res = client.stream_chat(&turn(), |msg| delivered.push(msg)).await;
        (delivered, res)
    }

    fn contents(messages: &[BotMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_cumulative_deliveries() {
        let client = StreamingClient::new(FakeTransport::chunks(text(&["Hel", "lo, ", "world"])));
        let (delivered, res) = collect(&client).await;
        res.unwrap();
        assert_eq!(contents(&delivered), vec![
            "Hel",
            "Hello, ",
            "Hello, world",
            "Hello, world"
        ]);
        assert!(delivered.iter().all(|m| m.sender == common::data::Sender::Bot));
        assert!(!client.lock().is_streaming());
    }

    #[tokio::test]
    async fn test_turn_events() {
        let client = StreamingClient::new(FakeTransport::chunks(text(&["a", "b"])));
        let events: Vec<TurnEvent> = client
            .turn(&turn())
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events, vec![
            TurnEvent::Partial("a".into()),
            TurnEvent::Partial("ab".into()),
            TurnEvent::Complete("ab".into()),
        ]);
    }

    #[tokio::test]
    async fn test_request_body() {
        let client = StreamingClient::new(FakeTransport::chunks(text(&["ok"])));
        let mut turn = turn();
        turn.chat_history = vec![ChatEntry::new("user", "before")];
        turn.instructions = Some("be brief".into());
        client.stream_chat(&turn, |_| {}).await.unwrap();

        let seen = client.transport.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            json!({
                "endpoint": "/vac/streaming/emissary",
                "method": "POST",
                "isStreaming": true,
                "user_input": "hello",
                "chat_history": [{"name": "user", "content": "before"}],
                "humanChatHistory": [],
                "instructions": "be brief",
                "stream_only": true,
                "stream_wait_time": 1,
            })
        );
    }

    #[tokio::test]
    async fn test_busy_while_streaming() {
        let client = StreamingClient::new(FakeTransport::chunks(text(&["x"])));
        let first = client.turn(&turn()).unwrap();
        assert!(matches!(client.turn(&turn()), Err(Error::Busy)));
        let (delivered, res) = collect(&client).await;
        assert!(matches!(res, Err(Error::Busy)));
        assert!(delivered.is_empty());
        assert_eq!(client.transport.calls(), 0);

        // dropping an unpolled turn frees the lock
        drop(first);
        assert!(!client.lock().is_streaming());
        collect(&client).await.1.unwrap();
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lock_is_recovered() {
        let client = StreamingClient::new(FakeTransport::chunks(text(&["fresh"])));
        let abandoned = client.turn(&turn()).unwrap();
        tokio::time::advance(STREAM_TIMEOUT + Duration::from_secs(1)).await;

        let (delivered, res) = collect(&client).await;
        res.unwrap();
        assert_eq!(contents(&delivered), vec!["fresh", "fresh"]);
        drop(abandoned);
        assert!(!client.lock().is_streaming());
    }

    #[tokio::test]
    async fn test_error_after_first_chunk() {
        let client = StreamingClient::new(FakeTransport::chunks(vec![
            Ok(b"Hel".to_vec()),
            Err(Error::Stream("connection reset".into())),
        ]));
        let (delivered, res) = collect(&client).await;
        assert!(matches!(res, Err(Error::Stream(_))));
        assert_eq!(contents(&delivered), vec!["Hel"]);
        assert!(!client.lock().is_streaming());
    }

    #[tokio::test]
    async fn test_error_before_any_chunk() {
        let client = StreamingClient::new(FakeTransport::chunks(vec![Err(Error::Stream(
            "connection reset".into(),
        ))]));
        let (delivered, res) = collect(&client).await;
        assert!(res.is_err());
        assert_eq!(contents(&delivered), vec![FALLBACK_MESSAGE]);
        assert!(!client.lock().is_streaming());
    }

    #[tokio::test]
    async fn test_split_utf8_sequence() {
        let bytes = "café".as_bytes();
        let client = StreamingClient::new(FakeTransport::chunks(vec![
            Ok(bytes[..4].to_vec()),
            Ok(bytes[4..].to_vec()),
        ]));
        let (delivered, res) = collect(&client).await;
        res.unwrap();
        assert_eq!(contents(&delivered), vec!["caf", "café", "café"]);
    }

    #[tokio::test]
    async fn test_invalid_first_chunk_is_fatal() {
        let client = StreamingClient::new(FakeTransport::chunks(vec![Ok(vec![0xFF, b'a'])]));
        let (delivered, res) = collect(&client).await;
        assert!(matches!(res, Err(Error::Decode(_))));
        assert_eq!(contents(&delivered), vec![FALLBACK_MESSAGE]);
    }

    #[tokio::test]
    async fn test_invalid_later_chunk_is_replaced() {
        let client =
            StreamingClient::new(FakeTransport::chunks(vec![Ok(b"ok".to_vec()), Ok(vec![0xFF, b'!'])]));
        let (delivered, res) = collect(&client).await;
        res.unwrap();
        assert_eq!(contents(&delivered), vec!["ok", "ok\u{FFFD}!", "ok\u{FFFD}!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_non_2xx_then_succeeds() {
        let client = StreamingClient::new(FakeTransport::new(|attempt| {
            if attempt < 2 {
                Ok(TransportResponse::new(
                    StatusCode::BAD_GATEWAY,
                    stream::empty().boxed(),
                ))
            } else {
                Ok(ok_body(text(&["done"])))
            }
        }));
        let start = Instant::now();
        let (delivered, res) = collect(&client).await;
        res.unwrap();
        assert_eq!(client.transport.calls(), 3);
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert_eq!(contents(&delivered), vec!["done", "done"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_status() {
        let client = StreamingClient::new(FakeTransport::new(|_| {
            Ok(TransportResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                stream::empty().boxed(),
            ))
        }));
        let (delivered, res) = collect(&client).await;
        assert!(matches!(res, Err(Error::HttpStatus(503))));
        assert_eq!(client.transport.calls(), 3);
        assert_eq!(contents(&delivered), vec![FALLBACK_MESSAGE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_timeout() {
        struct Hanging;
        impl Transport for Hanging {
            async fn post(&self, _request: &ForwardRequest) -> Result<TransportResponse> {
                std::future::pending().await
            }
        }

        let client = StreamingClient::new(Hanging);
        let mut delivered = vec![];
        let res = client.stream_chat(&turn(), |msg| delivered.push(msg)).await;
        assert!(matches!(res, Err(Error::Timeout(t)) if t == STREAM_TIMEOUT));
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].content, FALLBACK_MESSAGE);
        assert!(!client.lock().is_streaming());
    }

    #[tokio::test]
    async fn test_missing_body() {
        let client = StreamingClient::new(FakeTransport::new(|_| {
            Ok(TransportResponse {
                status: StatusCode::OK,
                body:   None,
            })
        }));
        let (_, res) = collect(&client).await;
        assert!(matches!(res, Err(Error::NoBody)));
        // not retryable
        assert_eq!(client.transport.calls(), 1);
    }
}
