use super::schema::{CompletionRequest, Summary};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest_eventsource::{retry, Error as EventSourceError, Event, EventSource, RequestBuilderExt};
use serde::Deserialize;
use std::time::Duration;

/// Incremental content of a streamed completion. `Ok(None)` is a chunk that
/// carried no content (role headers, finish markers).
pub type FragmentStream = BoxStream<'static, Result<Option<String>>>;

/// A chat-completion backend that answers with a fragment stream.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start the call. Errors here mean the call never produced a stream.
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("docsum/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let url = self.endpoint();
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let mut events = builder
            .eventsource()
            .context("Failed to build completion request")?;
        // a dropped stream is a failed call, never a reconnect
        events.set_retry_policy(Box::new(retry::Never));

        let pending = loop {
            match events.next().await {
                Some(Ok(Event::Open)) => break None,
                Some(Ok(Event::Message(message))) => break Some(message.data),
                Some(Err(EventSourceError::InvalidStatusCode(status, response))) => {
                    events.close();
                    let body = response.text().await.unwrap_or_default();
                    bail!("completion API returned {status}: {}", body.trim());
                }
                Some(Err(e)) => {
                    events.close();
                    bail!("Failed to reach {url}: {e}");
                }
                None => bail!("Failed to reach {url}: connection closed before any response"),
            }
        };

        Ok(fragments(events, pending))
    }
}

/// Drain a fragment stream in arrival order, skipping empty chunks.
pub async fn accumulate(mut fragments: FragmentStream) -> Result<Summary> {
    let mut summary = Summary::default();
    while let Some(fragment) = fragments.next().await {
        if let Some(text) = fragment? {
            summary.push_fragment(&text);
        }
    }
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Content of the first choice's delta, if any.
pub fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .with_context(|| format!("Malformed completion chunk: {data}"))?;
    if let Some(error) = chunk.error {
        return Err(anyhow!("completion API reported an error mid-stream: {error}"));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content))
}

struct FragmentState {
    events: EventSource,
    pending: Option<String>,
}

/// Content fragments of an opened event source. Ends at `[DONE]` or when the
/// server closes the stream, whichever comes first. A transport failure is
/// yielded once and ends the stream.
fn fragments(events: EventSource, pending: Option<String>) -> FragmentStream {
    let state = FragmentState { events, pending };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            let data = match state.pending.take() {
                Some(data) => data,
                None => match state.events.next().await {
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => message.data,
                    Some(Err(EventSourceError::StreamEnded)) | None => {
                        state.events.close();
                        return None;
                    }
                    Some(Err(e)) => {
                        state.events.close();
                        return Some((Err(anyhow!("Completion stream interrupted: {e}")), None));
                    }
                },
            };
            if data.trim() == "[DONE]" {
                state.events.close();
                return None;
            }
            return Some((parse_chunk(&data), Some(state)));
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use crate::summarize::schema::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn content_chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    /// Event-stream response whose body arrives as the given pieces.
    fn event_stream(parts: Vec<std::result::Result<String, std::io::Error>>) -> Response {
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(stream::iter(parts)),
        )
            .into_response()
    }

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/")
    }

    /// Server that answers every call with `parts` and counts the calls.
    async fn scripted_server(
        parts: Vec<&'static str>,
        fail_after: bool,
    ) -> (OpenAiCompatibleClient, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = move |State(calls): State<Arc<AtomicUsize>>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut body: Vec<std::result::Result<String, std::io::Error>> =
                parts.iter().map(|p| Ok(p.to_string())).collect();
            if fail_after {
                body.push(Err(std::io::Error::other("connection reset")));
            }
            event_stream(body)
        };
        let router = Router::new()
            .route("/v1/chat/completions", post(handler))
            .with_state(calls.clone());
        let base = spawn_server(router).await;
        let client = OpenAiCompatibleClient::new(base, None, Duration::from_secs(5)).unwrap();
        (client, calls)
    }

    fn leak(s: String) -> &'static str {
        Box::leak(s.into_boxed_str())
    }

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            messages: vec![ChatMessage::system("sum"), ChatMessage::user(content)],
            temperature: 0.8,
            top_p: 1.0,
            max_tokens: 64,
            stream: true,
        }
    }

    #[test]
    fn parse_chunk_reads_delta_content() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_chunk(data).unwrap().as_deref(), Some("Hi"));
        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(role_only).unwrap(), None);
        let null_content = r#"{"choices":[{"delta":{"content":null}}]}"#;
        assert_eq!(parse_chunk(null_content).unwrap(), None);
        let usage_only = r#"{"choices":[],"usage":{"total_tokens":3}}"#;
        assert_eq!(parse_chunk(usage_only).unwrap(), None);
    }

    #[test]
    fn parse_chunk_rejects_garbage_and_error_payloads() {
        assert!(parse_chunk("not json").is_err());
        assert!(parse_chunk(r#"{"error":{"message":"overloaded"}}"#).is_err());
    }

    async fn echo_completions(Json(request): Json<CompletionRequest>) -> Response {
        assert!(request.stream);
        assert_eq!(request.messages.len(), 2);
        let mut body = String::new();
        for word in request.messages[1].content.split_whitespace() {
            body.push_str(&content_chunk(&format!("{word} ")));
        }
        body.push_str("data: [DONE]\n\n");
        event_stream(vec![Ok(body)])
    }

    #[tokio::test]
    async fn client_streams_from_openai_compatible_server() {
        let base = spawn_server(Router::new().route("/v1/chat/completions", post(echo_completions))).await;
        let client = OpenAiCompatibleClient::new(base, Some("k".into()), Duration::from_secs(5)).unwrap();
        let fragments = client.stream(&request("three little words")).await.unwrap();
        let summary = accumulate(fragments).await.unwrap();
        assert_eq!(summary.as_str(), "three little words ");
    }

    #[tokio::test]
    async fn fragments_accumulate_in_order_and_stop_at_done() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n{}",
            content_chunk("Hel"),
            content_chunk("lo"),
            content_chunk(" world"),
            content_chunk("ignored"),
        );
        // split mid-event so the parser has to join reads
        let (head, tail) = leak(body).split_at(17);
        let (client, calls) = scripted_server(vec![head, tail], false).await;
        let summary = accumulate(client.stream(&request("x")).await.unwrap())
            .await
            .unwrap();
        assert_eq!(summary.as_str(), "Hello world");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_closed_without_done_keeps_content_and_does_not_reconnect() {
        let body = leak(format!(": keep-alive\n\n{}{}", content_chunk("a"), content_chunk("b")));
        let (client, calls) = scripted_server(vec![body], false).await;
        let summary = accumulate(client.stream(&request("x")).await.unwrap())
            .await
            .unwrap();
        assert_eq!(summary.as_str(), "ab");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_error_surfaces_after_partial_content() {
        let (client, calls) = scripted_server(vec![leak(content_chunk("partial"))], true).await;
        let mut fragments = client.stream(&request("x")).await.unwrap();
        let err = loop {
            match fragments.next().await {
                Some(Ok(_)) => {}
                Some(Err(e)) => break e,
                None => panic!("stream ended without reporting the broken body"),
            }
        };
        assert!(err.to_string().contains("Completion stream interrupted"), "{err:#}");
        assert!(fragments.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_reports_non_success_status() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = spawn_server(router).await;
        let client = OpenAiCompatibleClient::new(base, None, Duration::from_secs(5)).unwrap();
        let err = client.stream(&request("x")).await.err().unwrap();
        let message = err.to_string();
        assert!(message.contains("401"), "{message}");
        assert!(message.contains("bad key"), "{message}");
    }

    #[tokio::test]
    async fn unreachable_server_fails_before_streaming() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/v1", listener.local_addr().unwrap());
        drop(listener);
        let client = OpenAiCompatibleClient::new(base, None, Duration::from_secs(5)).unwrap();
        let err = client.stream(&request("x")).await.err().unwrap();
        assert!(err.to_string().contains("Failed to reach"), "{err:#}");
    }
}
