//! NDJSON streaming response parser for Ollama chat completions.
//!
//! Reads the response body as a byte stream, splits it on newlines, parses each
//! line as a [`ChatResponseLine`], and turns it into [`StreamEvent`]s.
//!
//! A line that fails to parse is held back until it is known whether more
//! lines follow: if they do, it surfaces as a `Warning` and the stream goes
//! on; if it was the last line, the stream ends with `MalformedResponse`.

use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::{ChatResponseLine, StreamChunk, StreamEvent, ToolInvocation};

// ─── NDJSON line parser ──────────────────────────────────────────────────────

/// Parse a raw NDJSON byte stream into `StreamEvent`s.
///
/// This is the main entry point for streaming. It:
/// 1. Buffers bytes until a full line is available (UTF-8 safe across chunk
///    boundaries)
/// 2. Parses each line as a `ChatResponseLine`
/// 3. Emits one `StreamChunk` per line with new text
/// 4. Ends after the final chunk (`done: true` or any tool call)
///
/// `endpoint` is only used to label transport errors.
pub fn parse_ndjson_stream<S, B, E>(
    byte_stream: S,
    endpoint: String,
) -> impl Stream<Item = Result<StreamEvent, InferenceError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = LineState::new(endpoint);

    stream::unfold(
        (byte_stream, state, Vec::<u8>::new()),
        |(mut byte_stream, mut state, mut buffer)| async move {
            loop {
                if state.finished {
                    return None;
                }

                // Drop blank lines so a held-back malformed line is only
                // reported once real content follows it.
                while buffer.first() == Some(&b'\n') || buffer.starts_with(b"\r\n") {
                    let skip = if buffer[0] == b'\n' { 1 } else { 2 };
                    buffer.drain(..skip);
                }

                if let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    if let Some(warning) = state.pending_malformed.take() {
                        return Some((
                            Ok(StreamEvent::Warning(warning)),
                            (byte_stream, state, buffer),
                        ));
                    }

                    let line: Vec<u8> = buffer.drain(..=line_end).collect();
                    match state.process_line(&line) {
                        Ok(Some(chunk)) => {
                            return Some((
                                Ok(StreamEvent::Chunk(chunk)),
                                (byte_stream, state, buffer),
                            ))
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), (byte_stream, state, buffer)));
                        }
                    }
                }

                if state.eof {
                    // Body exhausted without a final chunk.
                    state.finished = true;
                    let err = state.pending_malformed.take().unwrap_or_else(|| {
                        InferenceError::MalformedResponse {
                            reason: "stream ended before the completion marker".into(),
                        }
                    });
                    return Some((Err(err), (byte_stream, state, buffer)));
                }

                // Need more data from the stream
                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = InferenceError::UnreachableServer {
                            endpoint: state.endpoint.clone(),
                            reason: format!("stream read error: {e}"),
                        };
                        return Some((Err(err), (byte_stream, state, buffer)));
                    }
                    None => {
                        state.eof = true;
                        // Treat an unterminated trailing line as a full line.
                        if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                            buffer.push(b'\n');
                        } else {
                            buffer.clear();
                        }
                    }
                }
            }
        },
    )
}

// ─── Line State ──────────────────────────────────────────────────────────────

/// Mutable state carried across lines of one response.
struct LineState {
    endpoint: String,
    /// A line that failed to parse, not yet known to be the last one.
    pending_malformed: Option<InferenceError>,
    /// The byte stream has ended.
    eof: bool,
    /// The final chunk (or a terminal error) has been emitted.
    finished: bool,
}

impl LineState {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            pending_malformed: None,
            eof: false,
            finished: false,
        }
    }

    /// Process one raw line (including its trailing newline).
    ///
    /// Returns `Ok(None)` for lines that carry nothing to surface, and records
    /// unparseable lines in `pending_malformed`.
    fn process_line(&mut self, raw: &[u8]) -> Result<Option<StreamChunk>, InferenceError> {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text.trim(),
            Err(e) => {
                self.pending_malformed = Some(InferenceError::MalformedResponse {
                    reason: format!("stream line is not valid UTF-8: {e}"),
                });
                return Ok(None);
            }
        };
        if text.is_empty() {
            return Ok(None);
        }

        let line: ChatResponseLine = match serde_json::from_str(text) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, line = %text, "unparseable stream line");
                self.pending_malformed = Some(InferenceError::MalformedResponse {
                    reason: format!("failed to parse stream line: {e} (line: {text})"),
                });
                return Ok(None);
            }
        };

        if let Some(message) = line.error {
            return Err(InferenceError::ServerError { message });
        }

        let (delta_text, tool_calls) = match line.message {
            Some(message) => (message.content, message.tool_calls),
            None => (String::new(), Vec::new()),
        };

        // Any tool call finalizes the stream, even mid-stream.
        if let Some(first) = tool_calls.first() {
            if tool_calls.len() > 1 {
                tracing::warn!(
                    requested = tool_calls.len(),
                    used = %first.function.name,
                    "model requested several tool calls; only the first is executed"
                );
            }
            let invocation = ToolInvocation::try_from_wire(first)?;
            self.finished = true;
            return Ok(Some(StreamChunk {
                delta_text,
                is_final: true,
                tool_invocation: Some(invocation),
            }));
        }

        if line.done {
            self.finished = true;
            return Ok(Some(StreamChunk {
                delta_text,
                is_final: true,
                tool_invocation: None,
            }));
        }

        if delta_text.is_empty() {
            return Ok(None);
        }

        Ok(Some(StreamChunk {
            delta_text,
            is_final: false,
            tool_invocation: None,
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `parts` as separate network reads and collect every item.
    async fn collect(parts: &[&str]) -> Vec<Result<StreamEvent, InferenceError>> {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        parse_ndjson_stream(stream::iter(owned), "http://test/api/chat".into())
            .collect()
            .await
    }

    fn chunks(items: &[Result<StreamEvent, InferenceError>]) -> Vec<&StreamChunk> {
        items
            .iter()
            .filter_map(|item| match item {
                Ok(StreamEvent::Chunk(c)) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn content_line(text: &str) -> String {
        format!(
            "{}\n",
            serde_json::json!({"message": {"role": "assistant", "content": text}, "done": false})
        )
    }

    const DONE: &str = "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n";

    #[tokio::test]
    async fn test_deltas_concatenate_to_full_message() {
        let a = content_line("The ");
        let b = content_line("answer ");
        let c = content_line("is 42.");
        let items = collect(&[&a, &b, &c, DONE]).await;

        assert!(items.iter().all(|i| i.is_ok()));
        let chunks = chunks(&items);
        assert_eq!(chunks.len(), 4);
        assert!(chunks[..3].iter().all(|c| !c.is_final));
        assert!(chunks[3].is_final);

        let text: String = chunks.iter().map(|c| c.delta_text.as_str()).collect();
        assert_eq!(text, "The answer is 42.");
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let line = content_line("héllo");
        let (head, tail) = line.as_bytes().split_at(30);
        let owned: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(head.to_vec()),
            Ok(tail.to_vec()),
            Ok(DONE.as_bytes().to_vec()),
        ];
        let items: Vec<_> = parse_ndjson_stream(stream::iter(owned), "t".into())
            .collect()
            .await;
        let chunks = chunks(&items);
        assert_eq!(chunks[0].delta_text, "héllo");
        assert!(chunks[1].is_final);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_reads() {
        let line = content_line("€");
        let bytes = line.as_bytes();
        let euro_start = line.find('€').unwrap();
        let owned: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(bytes[..euro_start + 1].to_vec()),
            Ok(bytes[euro_start + 1..].to_vec()),
            Ok(DONE.as_bytes().to_vec()),
        ];
        let items: Vec<_> = parse_ndjson_stream(stream::iter(owned), "t".into())
            .collect()
            .await;
        assert_eq!(chunks(&items)[0].delta_text, "€");
    }

    #[tokio::test]
    async fn test_malformed_middle_line_is_warning() {
        let a = content_line("one ");
        let b = content_line("two");
        let items = collect(&[&a, "{not json\n", &b, DONE]).await;

        assert_eq!(items.len(), 4);
        assert!(matches!(
            items[1],
            Ok(StreamEvent::Warning(InferenceError::MalformedResponse { .. }))
        ));
        let text: String = chunks(&items).iter().map(|c| c.delta_text.as_str()).collect();
        assert_eq!(text, "one two");
        assert!(chunks(&items).last().unwrap().is_final);
    }

    #[tokio::test]
    async fn test_malformed_last_line_is_error() {
        let a = content_line("partial");
        let items = collect(&[&a, "{\"message\": {\"content\": \"trunc"]).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(StreamEvent::Chunk(_))));
        assert!(matches!(
            items[1],
            Err(InferenceError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_done_marker_is_error() {
        let a = content_line("never finishes");
        let items = collect(&[&a]).await;
        assert!(matches!(
            items.last(),
            Some(Err(InferenceError::MalformedResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn test_tool_call_finalizes_stream() {
        let call = "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"get_top_cryptocurrencies\",\"arguments\":{}}}]},\"done\":false}\n";
        let trailing = content_line("ignored");
        let items = collect(&[call, &trailing, DONE]).await;

        assert_eq!(items.len(), 1, "nothing after the tool call is read");
        let chunk = chunks(&items)[0];
        assert!(chunk.is_final);
        let inv = chunk.tool_invocation.as_ref().unwrap();
        assert_eq!(inv.tool_name, "get_top_cryptocurrencies");
        assert!(inv.arguments.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_object_ends_stream() {
        let a = content_line("hi");
        let items = collect(&[&a, "{\"error\":\"model crashed\"}\n", DONE]).await;
        assert_eq!(items.len(), 2);
        match &items[1] {
            Err(InferenceError::ServerError { message }) => assert_eq!(message, "model crashed"),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_thinking_chunks_skipped() {
        let thinking = "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"thinking\":\"let me see\"},\"done\":false}\n";
        let a = content_line("ok");
        let items = collect(&[thinking, thinking, &a, DONE]).await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_read_error_is_unreachable() {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(content_line("a").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let items: Vec<_> = parse_ndjson_stream(stream::iter(owned), "t".into())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[1],
            Err(InferenceError::UnreachableServer { .. })
        ));
    }
}
