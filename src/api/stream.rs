/// One complete server-sent event, before payload decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

const DEFAULT_EVENT_NAME: &str = "message";

/// Incremental SSE framer; chunks may split frames at any byte, including
/// inside a multibyte character. Only complete frames are decoded as UTF-8.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.windows(2).any(|pair| pair == b"\r\n") {
            self.buffer = strip_carriage_returns(&self.buffer);
        }

        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(end) = find_frame_end(&self.buffer[start..]) {
            let frame_end = start + end + 2;
            let text = String::from_utf8_lossy(&self.buffer[start..frame_end]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }

    /// Parses a trailing frame the server closed without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&String::from_utf8_lossy(&rest))
    }
}

fn find_frame_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == b"\n\n")
}

/// Drops the `\r` of every `\r\n`. A `\r` still waiting for its `\n` stays.
fn strip_carriage_returns(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for (position, byte) in bytes.iter().enumerate() {
        if *byte == b'\r' && bytes.get(position + 1) == Some(&b'\n') {
            continue;
        }
        out.push(*byte);
    }
    out
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.trim().to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }

    Some(SseFrame {
        event: event
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_comments_are_skipped() {
        let mut parser = StreamParser::new();
        let frames = parser.process(b": ping - 2024-01-01\n\nevent: done\ndata: {}\n\n");
        assert_eq!(frames, vec![SseFrame::new("done", "{}")]);
    }

    #[test]
    fn test_crlf_frames_split_across_chunks() {
        let mut parser = StreamParser::new();
        assert!(parser.process(b"event: ask\r\ndata: {\"tool_calls\"").is_empty());
        let frames = parser.process(b":[]}\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("ask", "{\"tool_calls\":[]}")]);
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_finish_returns_unterminated_trailing_frame() {
        let mut parser = StreamParser::new();
        assert!(parser.process(b"event: done\ndata: {\"status\":\"completed\"}").is_empty());
        assert_eq!(
            parser.finish(),
            Some(SseFrame::new("done", "{\"status\":\"completed\"}"))
        );
    }

    #[test]
    fn test_multibyte_character_split_between_chunks() {
        let mut parser = StreamParser::new();
        let frame = "event: text\ndata: {\"content\":\"h\u{e9}llo\"}\n\n".as_bytes();
        let split = frame.iter().position(|byte| *byte == 0xC3).unwrap() + 1;

        assert!(parser.process(&frame[..split]).is_empty());
        let frames = parser.process(&frame[split..]);
        assert_eq!(
            frames,
            vec![SseFrame::new("text", "{\"content\":\"h\u{e9}llo\"}")]
        );
    }

    #[test]
    fn test_multiple_data_lines_are_joined() {
        let mut parser = StreamParser::new();
        let frames = parser.process(b"data: first\ndata: second\n\n");
        assert_eq!(frames, vec![SseFrame::new("message", "first\nsecond")]);
    }
}
