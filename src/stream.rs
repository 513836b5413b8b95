use anyhow::{anyhow, Result};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;

/// Ordered fragments of model output; ends at end-of-stream or after an error
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Reassembles UTF-8 text from byte chunks that may split a character
#[derive(Debug, Default)]
pub struct Utf8Assembler {
    carry: Vec<u8>,
}

impl Utf8Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as possible. An incomplete sequence at the
    /// end is kept for the next call; invalid bytes become U+FFFD.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.carry.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(std::str::from_utf8(&self.carry[..valid_up_to]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid_up_to + bad);
                        }
                        None => {
                            self.carry.drain(..valid_up_to);
                            return text;
                        }
                    }
                }
            }
        }
    }

    /// Whatever is still held at end of input, lossily decoded
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

/// One decoded server-sent event payload
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Content(String),
    Done,
}

/// Line-oriented parser for OpenAI-style `data:` event streams
#[derive(Debug, Default)]
pub struct SseParser {
    decoder: Utf8Assembler,
    line: String,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw body bytes and collect the events completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseEvent>> {
        let text = self.decoder.push(chunk);
        self.push_text(&text)
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Vec<Result<SseEvent>> {
        let rest = self.decoder.finish();
        let mut events = self.push_text(&rest);
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn push_text(&mut self, text: &str) -> Vec<Result<SseEvent>> {
        let mut events = Vec::new();
        for c in text.chars() {
            if c == '\n' {
                let line = std::mem::take(&mut self.line);
                if let Some(event) = self.parse_line(&line) {
                    events.push(event);
                }
            } else {
                self.line.push(c);
            }
        }
        events
    }

    fn parse_line(&mut self, line: &str) -> Option<Result<SseEvent>> {
        if self.done {
            return None;
        }
        let line = line.trim_end_matches('\r');
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return Some(Ok(SseEvent::Done));
        }
        Some(parse_delta(data))
    }
}

/// Extract `choices[0].delta.content` from one chunk payload
fn parse_delta(data: &str) -> Result<SseEvent> {
    let json: Value =
        serde_json::from_str(data).map_err(|e| anyhow!("Failed to parse stream chunk: {}", e))?;

    if let Some(error) = json.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(anyhow!("Model stream returned error: {}", message));
    }

    let content = json["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    Ok(SseEvent::Content(content))
}

/// Turn a stream of body chunks into a stream of text fragments
pub fn sse_fragments<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let body = body
        .map(Some)
        .chain(stream::once(async { None }));

    let events = body.scan(SseParser::new(), |parser, chunk| {
        let events = match chunk {
            Some(Ok(bytes)) if !parser.is_done() => parser.push(bytes.as_ref()),
            Some(Ok(_)) => Vec::new(),
            // the answer is already complete once [DONE] arrived
            Some(Err(_)) if parser.is_done() => Vec::new(),
            Some(Err(e)) => vec![Err(anyhow!("Model stream interrupted: {}", e))],
            None => parser.finish(),
        };
        futures::future::ready(Some(events))
    });

    let fragments = events
        .flat_map(stream::iter)
        .filter_map(|event| {
            futures::future::ready(match event {
                Ok(SseEvent::Content(text)) if !text.is_empty() => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });

    Box::pin(fragments)
}

/// A fragment stream over fixed text pieces, used for locally produced frames
pub fn from_fragments<I>(fragments: I) -> FragmentStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    Box::pin(stream::iter(fragments.into_iter().map(Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_split_at_every_byte() {
        let text = "问AI: 你好, world ✓";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut assembler = Utf8Assembler::new();
            let mut out = assembler.push(&bytes[..split]);
            out.push_str(&assembler.push(&bytes[split..]));
            out.push_str(&assembler.finish());
            assert_eq!(out, text, "split at byte {}", split);
        }
    }

    #[test]
    fn test_utf8_invalid_bytes_replaced() {
        let mut assembler = Utf8Assembler::new();
        let out = assembler.push(&[b'a', 0xFF, b'b']);
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_truncated_tail_on_finish() {
        let mut assembler = Utf8Assembler::new();
        let bytes = "好".as_bytes();
        assert_eq!(assembler.push(&bytes[..2]), "");
        assert_eq!(assembler.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_sse_parser_content_and_done() {
        let mut parser = SseParser::new();
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        let events: Vec<SseEvent> = parser.push(body.as_bytes()).into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![SseEvent::Content("Hi".to_string()), SseEvent::Done]);
        assert!(parser.is_done());
    }

    #[test]
    fn test_sse_parser_line_split_across_chunks() {
        let mut parser = SseParser::new();
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
        let mut events = Vec::new();
        for byte in body {
            events.extend(parser.push(std::slice::from_ref(byte)));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &SseEvent::Content("你好".to_string()));
    }

    #[test]
    fn test_sse_parser_ignores_comments_and_role_chunks() {
        let mut parser = SseParser::new();
        let body = ": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n";
        let events: Vec<SseEvent> = parser.push(body.as_bytes()).into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![SseEvent::Content(String::new())]);
    }

    #[test]
    fn test_sse_parser_error_payload() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: {\"error\":{\"message\":\"rate limit\"}}\n");
        assert!(events[0].as_ref().unwrap_err().to_string().contains("rate limit"));
    }

    #[tokio::test]
    async fn test_sse_fragments_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"``\"}}]}\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"`\\n\"}}]}\n\ndata: [DONE]\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n".to_vec()),
        ];
        let fragments: Vec<String> = sse_fragments(stream::iter(chunks))
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["``".to_string(), "`\n".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_fragments_transport_error() {
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let items: Vec<Result<String>> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(items[1].as_ref().unwrap_err().to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_sse_fragments_connection_closed_after_done() {
        let chunks: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n".to_vec()),
            Err("connection closed".to_string()),
        ];
        let items: Vec<Result<String>> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
    }
}
