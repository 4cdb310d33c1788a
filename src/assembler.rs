//! Normalises the agent's output into one final answer string.
//!
//! Streaming answers are shown incrementally through a [`DisplaySink`] with a
//! transient cursor; batch answers are shown once.

use console::Term;
use futures::{Stream, StreamExt};
use log::{debug, error, trace};

use crate::{Agent, Fragment, ResearchError, ResponseMode, Result, RunContext, RunOutput};

/// Marker appended to the display value while an answer is still arriving.
pub const CURSOR: char = '▌';

/// Receives the current display value of an answer.
pub trait DisplaySink {
    fn show(&mut self, value: &str);
}

/// Keeps every displayed value, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub values: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&str> {
        self.values.last().map(String::as_str)
    }
}

impl DisplaySink for RecordingSink {
    fn show(&mut self, value: &str) {
        self.values.push(value.to_string());
    }
}

/// Renders incremental display values on stdout.
///
/// Only the text not yet printed is written. On a terminal the cursor is
/// drawn and erased before each update; redirected output never sees it.
pub struct TerminalSink {
    term: Term,
    interactive: bool,
    printed_len: usize,
    cursor_visible: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::with_term(Term::stdout())
    }

    pub fn with_term(term: Term) -> Self {
        Self {
            interactive: term.is_term(),
            term,
            printed_len: 0,
            cursor_visible: false,
        }
    }

    fn write(&self, text: &str) {
        if let Err(e) = self.term.write_str(text) {
            debug!("Failed to write answer to terminal: {}", e);
        }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for TerminalSink {
    fn show(&mut self, value: &str) {
        let (text, with_cursor) = match value.strip_suffix(CURSOR) {
            Some(text) => (text, true),
            None => (value, false),
        };
        let with_cursor = with_cursor && self.interactive;

        if self.cursor_visible {
            if let Err(e) = self.term.clear_chars(1) {
                debug!("Failed to erase cursor: {}", e);
            }
        }

        let fresh = text.get(self.printed_len..).unwrap_or_default();
        self.write(fresh);
        self.printed_len = text.len();

        if with_cursor {
            self.write(&CURSOR.to_string());
        }
        self.cursor_visible = with_cursor;

        if let Err(e) = self.term.flush() {
            debug!("Failed to flush terminal: {}", e);
        }
    }
}

fn agent_failure(e: ResearchError) -> ResearchError {
    if e.is_agent_failure() {
        e
    } else {
        ResearchError::agent(e.to_string())
    }
}

/// Consumes a fragment stream to completion and returns the concatenated answer.
///
/// After every fragment with text, `sink` sees the answer so far plus [`CURSOR`];
/// once the stream ends it sees the bare answer.
pub async fn assemble_stream<S>(mut fragments: S, sink: &mut dyn DisplaySink) -> Result<String>
where
    S: Stream<Item = Result<Fragment>> + Unpin,
{
    let mut answer = String::new();

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment.map_err(|e| {
            error!("Answer stream failed after {} bytes: {}", answer.len(), e);
            agent_failure(e)
        })?;

        if let Some(delta) = fragment.delta() {
            answer.push_str(delta);
            sink.show(&format!("{}{}", answer, CURSOR));
        }
    }

    sink.show(&answer);
    trace!("Assembled streamed answer of {} bytes", answer.len());
    Ok(answer)
}

/// Extracts the answer text of a complete result.
///
/// Falls back to the result's debug rendering when there is no content, so
/// the answer is never empty.
pub fn assemble_output(output: &RunOutput) -> String {
    match output.content.as_deref() {
        Some(content) if !content.is_empty() => content.to_string(),
        _ => {
            debug!("Agent result has no content, using generic rendering");
            format!("{:?}", output)
        }
    }
}

/// Asks `agent` and returns the final answer, displaying it through `sink`.
///
/// Any failure while invoking the agent or reading its stream becomes
/// [`ResearchError::AgentInvocation`]; no partial answer is returned.
pub async fn collect_answer(
    agent: &dyn Agent,
    question: &str,
    context: &RunContext,
    mode: ResponseMode,
    sink: &mut dyn DisplaySink,
) -> Result<String> {
    match mode {
        ResponseMode::Stream => {
            let fragments = agent
                .run_stream(question, context)
                .await
                .map_err(agent_failure)?;
            assemble_stream(fragments, sink).await
        }
        ResponseMode::Batch => {
            let output = agent.run(question, context).await.map_err(agent_failure)?;
            let answer = assemble_output(&output);
            sink.show(&answer);
            Ok(answer)
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    use std::io::{Read, Seek, SeekFrom};

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};

    use super::*;

    fn fragments(parts: &[&str]) -> impl Stream<Item = Result<Fragment>> + Unpin {
        let items: Vec<Result<Fragment>> = parts.iter().map(|p| Ok(Fragment::text(*p))).collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn streaming_shows_cursor_then_final_value() {
        let mut sink = RecordingSink::new();
        let answer = assemble_stream(fragments(&["Hello", " ", "world"]), &mut sink)
            .await
            .unwrap();

        assert_eq!(answer, "Hello world");
        assert_eq!(
            sink.values,
            vec!["Hello▌", "Hello ▌", "Hello world▌", "Hello world"]
        );
    }

    #[tokio::test]
    async fn empty_fragments_do_not_update_display() {
        let items = vec![
            Ok(Fragment::default()),
            Ok(Fragment::text("a")),
            Ok(Fragment::text("")),
            Ok(Fragment::text("b")),
        ];
        let mut sink = RecordingSink::new();
        let answer = assemble_stream(stream::iter(items), &mut sink).await.unwrap();

        assert_eq!(answer, "ab");
        assert_eq!(sink.values, vec!["a▌", "ab▌", "ab"]);
    }

    #[tokio::test]
    async fn empty_stream_gives_empty_answer() {
        let mut sink = RecordingSink::new();
        let answer = assemble_stream(fragments(&[]), &mut sink).await.unwrap();
        assert!(answer.is_empty());
        assert_eq!(sink.last(), Some(""));
    }

    #[tokio::test]
    async fn stream_error_yields_no_answer() {
        let items = vec![
            Ok(Fragment::text("partial")),
            Err(ResearchError::Io(std::io::Error::other("reset"))),
            Ok(Fragment::text("never")),
        ];
        let mut sink = RecordingSink::new();
        let err = assemble_stream(stream::iter(items), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, ResearchError::AgentInvocation { .. }));
        assert_eq!(sink.values, vec!["partial▌"]);
    }

    #[cfg(unix)]
    #[test]
    fn redirected_output_has_no_cursor_or_escapes() {
        let file = tempfile::tempfile().unwrap();
        let term = Term::read_write_pair(file.try_clone().unwrap(), file.try_clone().unwrap());
        let mut sink = TerminalSink::with_term(term);

        for value in ["Hello▌", "Hello ▌", "Hello world▌", "Hello world"] {
            sink.show(value);
        }

        let mut file = file;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut written = String::new();
        file.read_to_string(&mut written).unwrap();

        assert_eq!(written, "Hello world");
    }

    #[test]
    fn output_content_is_used_verbatim() {
        let output = RunOutput {
            content: Some("# Answer".to_string()),
            ..RunOutput::default()
        };
        assert_eq!(assemble_output(&output), "# Answer");
    }

    #[test]
    fn missing_or_empty_content_falls_back_to_rendering() {
        let empty = RunOutput {
            content: Some(String::new()),
            model: Some("gemini".to_string()),
            finish_reason: None,
        };
        let rendered = assemble_output(&empty);
        assert!(!rendered.is_empty());
        assert!(rendered.contains("gemini"));

        assert!(!assemble_output(&RunOutput::default()).is_empty());
    }

    enum Behaviour {
        Answer(&'static str),
        Fail,
    }

    struct ScriptedAgent(Behaviour);

    #[async_trait]
    impl Agent for ScriptedAgent {
        async fn run(&self, _question: &str, _context: &RunContext) -> Result<RunOutput> {
            match self.0 {
                Behaviour::Answer(text) => Ok(RunOutput {
                    content: Some(text.to_string()),
                    ..RunOutput::default()
                }),
                Behaviour::Fail => Err(ResearchError::ConfigError {
                    message: "bad key".to_string(),
                }),
            }
        }

        async fn run_stream(
            &self,
            _question: &str,
            _context: &RunContext,
        ) -> Result<BoxStream<'static, Result<Fragment>>> {
            match self.0 {
                Behaviour::Answer(text) => {
                    let parts: Vec<Result<Fragment>> = text
                        .split_inclusive(' ')
                        .map(|p| Ok(Fragment::text(p)))
                        .collect();
                    Ok(stream::iter(parts).boxed())
                }
                Behaviour::Fail => Err(ResearchError::agent("unreachable")),
            }
        }
    }

    #[tokio::test]
    async fn collect_answer_in_both_modes() {
        let agent = ScriptedAgent(Behaviour::Answer("streamed answer text"));
        let context = RunContext::default();

        let mut sink = RecordingSink::new();
        let streamed = collect_answer(&agent, "q", &context, ResponseMode::Stream, &mut sink)
            .await
            .unwrap();
        assert_eq!(streamed, "streamed answer text");
        assert_eq!(sink.values.len(), 4);

        let mut sink = RecordingSink::new();
        let batch = collect_answer(&agent, "q", &context, ResponseMode::Batch, &mut sink)
            .await
            .unwrap();
        assert_eq!(batch, "streamed answer text");
        assert_eq!(sink.values, vec!["streamed answer text"]);
    }

    #[tokio::test]
    async fn collect_answer_maps_failures_to_agent_errors() {
        let agent = ScriptedAgent(Behaviour::Fail);
        let context = RunContext::default();

        for mode in [ResponseMode::Stream, ResponseMode::Batch] {
            let mut sink = RecordingSink::new();
            let err = collect_answer(&agent, "q", &context, mode, &mut sink)
                .await
                .unwrap_err();
            assert!(err.is_agent_failure(), "{err:?}");
            assert!(sink.values.is_empty());
        }
    }
}
