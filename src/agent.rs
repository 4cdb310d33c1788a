//! The conversational research agent seen from this application.
//!
//! The agent is an external service. [`Agent`] is the seam the rest of the
//! crate talks to; [`ChatCompletionsAgent`] adapts any OpenAI-compatible
//! chat completions endpoint to it, including server-sent-event streaming.

use std::{
    collections::VecDeque,
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt,
};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{ChatMessage, Config, ResearchError, Result};

/// One incremental unit of a streamed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub content: Option<String>,
}

impl Fragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    /// The new text carried by this fragment, if any.
    pub fn delta(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }
}

/// Complete result of a non-streaming agent run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub content: Option<String>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

/// What the agent gets to see besides the question itself.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Earlier messages of the session, oldest first
    pub history: Vec<ChatMessage>,
    /// Current local time, when the agent should know it
    pub now: Option<DateTime<Local>>,
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Runs the agent to completion and returns its whole result.
    async fn run(&self, question: &str, context: &RunContext) -> Result<RunOutput>;

    /// Runs the agent and returns its answer as a lazy, finite fragment stream.
    async fn run_stream(
        &self,
        question: &str,
        context: &RunContext,
    ) -> Result<BoxStream<'static, Result<Fragment>>>;
}

/// Holds the process-wide agent, built on first use and shared afterwards.
#[derive(Default)]
pub struct AgentCell {
    cell: OnceLock<Arc<dyn Agent>>,
}

impl AgentCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cell that already holds `agent`; the initialiser is never called.
    pub fn with_agent(agent: Arc<dyn Agent>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(agent);
        Self { cell }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the agent, constructing it with `init` if this is the first request.
    ///
    /// A failed construction leaves the cell empty so the next request retries it.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<dyn Agent>>
    where
        F: FnOnce() -> Result<Arc<dyn Agent>>,
    {
        if let Some(agent) = self.cell.get() {
            return Ok(Arc::clone(agent));
        }

        let agent = init()?;
        Ok(Arc::clone(self.cell.get_or_init(|| agent)))
    }
}

/// Agent backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    name: String,
    system_prompt: String,
}

impl ChatCompletionsAgent {
    /// Builds the agent from configuration, reading the key from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(config, api_key)
    }

    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        let endpoint = format!(
            "{}/chat/completions",
            config.api_base.trim_end_matches('/')
        );

        let mut system_prompt = format!(
            "{}\n\n{}",
            config.description.trim(),
            config.instructions.trim()
        );
        if config.markdown {
            system_prompt.push_str("\n\nUse markdown to format your answers.");
        }

        info!(
            "Configured agent '{}' with model {} at {}",
            config.agent_name, config.model, endpoint
        );

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            name: config.agent_name.clone(),
            system_prompt,
        })
    }

    /// System prompt, optional history and the question, in request order.
    pub fn build_messages(&self, question: &str, context: &RunContext) -> Vec<ChatMessage> {
        let mut system = self.system_prompt.clone();
        if let Some(now) = context.now {
            system.push_str(&format!(
                "\n\nThe current time is {}.",
                now.format("%Y-%m-%d %H:%M:%S %:z")
            ));
        }

        let mut messages = Vec::with_capacity(context.history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(context.history.iter().cloned());
        messages.push(ChatMessage::user(question));
        messages
    }

    async fn post(
        &self,
        question: &str,
        context: &RunContext,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let body = json!({
            "model": self.model,
            "messages": self.build_messages(question, context),
            "stream": stream,
        });

        debug!(
            "Agent '{}' request to {} (stream={})",
            self.name, self.endpoint, stream
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Agent request failed: {}", e);
                ResearchError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Agent endpoint returned {}: {}", status, detail);
            return Err(ResearchError::agent(format!(
                "endpoint returned {}: {}",
                status,
                detail.trim()
            )));
        }

        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: Option<String>,
}

#[async_trait]
impl Agent for ChatCompletionsAgent {
    async fn run(&self, question: &str, context: &RunContext) -> Result<RunOutput> {
        let response = self.post(question, context, false).await?;
        let completion: CompletionResponse = response.json().await?;

        let choice = completion.choices.into_iter().next();
        let finish_reason = choice.as_ref().and_then(|c| c.finish_reason.clone());
        let content = choice.and_then(|c| c.message).and_then(|m| m.content);

        trace!("Agent returned {} characters", content.as_deref().map_or(0, str::len));
        Ok(RunOutput {
            content,
            model: completion.model,
            finish_reason,
        })
    }

    async fn run_stream(
        &self,
        question: &str,
        context: &RunContext,
    ) -> Result<BoxStream<'static, Result<Fragment>>> {
        let response = self.post(question, context, true).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ResearchError::from));

        Ok(sse_fragments(body))
    }
}

/// A single parsed line of a server-sent-event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(Fragment),
    Error(String),
    Done,
    Skip,
}

/// Parses one SSE line of a chat completions stream.
///
/// Comments, blank lines and non-`data` fields are skipped. Malformed JSON is an error.
pub fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let payload = payload.trim();

    if payload.is_empty() {
        return Ok(SseEvent::Skip);
    }
    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(payload)?;
    if let Some(error) = chunk.error {
        return Ok(SseEvent::Error(
            error
                .message
                .unwrap_or_else(|| "stream reported an error".to_string()),
        ));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);

    Ok(SseEvent::Fragment(Fragment { content }))
}

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<Fragment>>,
    finished: bool,
}

impl SseState {
    fn drain_lines(&mut self, at_eof: bool) {
        while !self.finished {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }

        if at_eof && !self.finished && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&String::from_utf8_lossy(&rest));
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_sse_line(line) {
            Ok(SseEvent::Fragment(fragment)) => self.pending.push_back(Ok(fragment)),
            Ok(SseEvent::Error(message)) => {
                error!("Agent stream reported an error: {}", message);
                self.pending.push_back(Err(ResearchError::agent(message)));
                self.finished = true;
            }
            Ok(SseEvent::Done) => {
                trace!("Agent stream finished");
                self.finished = true;
            }
            Ok(SseEvent::Skip) => {}
            Err(e) => warn!("Skipping malformed stream line {:?}: {}", line.trim(), e),
        }
    }
}

/// Turns a raw SSE byte stream into answer fragments.
///
/// Lines may be split across chunks at any byte, including inside a UTF-8 sequence.
pub fn sse_fragments<S>(body: S) -> BoxStream<'static, Result<Fragment>>
where
    S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    let state = SseState {
        body: body.boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_lines(false);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    state.drain_lines(true);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::Role;

    fn chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    async fn collect(chunks: Vec<Vec<u8>>) -> Vec<Result<Fragment>> {
        let body = stream::iter(chunks.into_iter().map(Ok));
        sse_fragments(body).collect().await
    }

    #[test]
    fn parses_data_lines() {
        let line = chunk("Hel");
        assert_eq!(
            parse_sse_line(line.trim_end()).unwrap(),
            SseEvent::Fragment(Fragment::text("Hel"))
        );
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_sse_line("").unwrap(), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Skip);
        assert_eq!(parse_sse_line("event: message").unwrap(), SseEvent::Skip);
        assert!(parse_sse_line("data: {oops").is_err());
    }

    #[test]
    fn role_only_delta_has_no_text() {
        let event =
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        match event {
            SseEvent::Fragment(fragment) => assert_eq!(fragment.delta(), None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_payload_is_reported() {
        let event = parse_sse_line(r#"data: {"error":{"message":"quota exceeded"}}"#).unwrap();
        assert_eq!(event, SseEvent::Error("quota exceeded".to_string()));
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let raw = format!("{}{}data: [DONE]\n\n", chunk("héllo"), chunk(" wörld"));
        let bytes = raw.into_bytes();
        // split inside the two-byte 'é'
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let chunks = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];

        let texts: Vec<String> = collect(chunks)
            .await
            .into_iter()
            .map(|f| f.unwrap().content.unwrap())
            .collect();
        assert_eq!(texts, vec!["héllo", " wörld"]);
    }

    #[tokio::test]
    async fn stops_at_done_and_skips_garbage() {
        let raw = format!(
            "{}data: not json\n\n{}data: [DONE]\n\n{}",
            chunk("a"),
            chunk("b"),
            chunk("after done")
        );
        let fragments = collect(vec![raw.into_bytes()]).await;
        let texts: Vec<String> = fragments
            .into_iter()
            .map(|f| f.unwrap().content.unwrap())
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_kept() {
        let raw = chunk("tail");
        let fragments = collect(vec![raw.trim_end().as_bytes().to_vec()]).await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap().delta(), Some("tail"));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let body = stream::iter(vec![
            Ok(chunk("partial").into_bytes()),
            Err(ResearchError::agent("connection reset")),
            Ok(chunk("never").into_bytes()),
        ]);
        let items: Vec<Result<Fragment>> = sse_fragments(body).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn messages_include_history_and_time() {
        let agent = ChatCompletionsAgent::new(&Config::default(), "key".to_string()).unwrap();
        let context = RunContext {
            history: vec![
                ChatMessage::user("earlier question"),
                ChatMessage::assistant("earlier answer"),
            ],
            now: Some(Local.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap()),
        };

        let messages = agent.build_messages("new question", &context);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("research agent"));
        assert!(messages[0].content.contains("2025-06-01 12:30:00"));
        assert!(messages[0].content.contains("markdown"));
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[3], ChatMessage::user("new question"));
    }

    #[test]
    fn messages_without_context_are_system_and_question() {
        let mut config = Config::default();
        config.markdown = false;
        let agent = ChatCompletionsAgent::new(&config, "key".to_string()).unwrap();

        let messages = agent.build_messages("q", &RunContext::default());
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].content.contains("current time"));
        assert!(!messages[0].content.contains("markdown"));
    }

    struct StaticAgent;

    #[async_trait]
    impl Agent for StaticAgent {
        async fn run(&self, _question: &str, _context: &RunContext) -> Result<RunOutput> {
            Ok(RunOutput::default())
        }

        async fn run_stream(
            &self,
            _question: &str,
            _context: &RunContext,
        ) -> Result<BoxStream<'static, Result<Fragment>>> {
            Ok(stream::empty().boxed())
        }
    }

    #[test]
    fn agent_cell_builds_once() {
        let cell = AgentCell::new();
        let builds = AtomicUsize::new(0);
        let build = || -> Result<Arc<dyn Agent>> {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StaticAgent))
        };

        let first = cell.get_or_try_init(build).unwrap();
        let second = cell.get_or_try_init(build).unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn agent_cell_retries_after_failed_build() {
        let cell = AgentCell::new();
        let failed = cell.get_or_try_init(|| {
            Err(ResearchError::ConfigError {
                message: "no key".to_string(),
            })
        });
        assert!(failed.is_err());
        assert!(!cell.is_initialized());

        cell.get_or_try_init(|| Ok(Arc::new(StaticAgent) as Arc<dyn Agent>))
            .unwrap();
        assert!(cell.is_initialized());
    }
}
