//! Server-Sent Events framing for the streamable HTTP transport.

/// Splits a byte stream into lines, tolerating chunk boundaries anywhere.
/// Blank lines are kept because they terminate events.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = self.buffer[search_index..].iter().position(|b| *b == b'\n')
        {
            let newline_index = search_index + relative_pos;
            let mut line_end = newline_index;
            if line_end > search_index && self.buffer[line_end - 1] == b'\r' {
                line_end -= 1;
            }
            lines.push(String::from_utf8_lossy(&self.buffer[search_index..line_end]).into_owned());
            search_index = newline_index + 1;
        }

        if flush {
            let rest = &self.buffer[search_index..];
            if !rest.is_empty() {
                let text = String::from_utf8_lossy(rest);
                lines.push(text.trim_end_matches('\r').to_string());
            }
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// Events without an explicit type default to `message`.
    pub fn is_message(&self) -> bool {
        self.event_type
            .as_deref()
            .is_none_or(|event_type| event_type == "message")
    }
}

/// Assembles [`SseEvent`]s from `event:`/`data:` lines. Multiple `data:`
/// lines are joined with `\n`; comments and unknown fields are ignored.
#[derive(Default)]
pub struct SseEventParser {
    lines: SseLineBuffer,
    event_type: Option<String>,
    data: Vec<String>,
}

impl SseEventParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let lines = self.lines.push(chunk);
        self.feed_lines(lines)
    }

    /// Flushes a trailing partial event when the stream ends without a
    /// terminating blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let lines = self.lines.finish();
        let mut events = self.feed_lines(lines);
        events.extend(self.dispatch());
        events
    }

    fn feed_lines(&mut self, lines: Vec<String>) -> Vec<SseEvent> {
        lines
            .iter()
            .filter_map(|line| self.feed_line(line))
            .collect()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event_type, data })
    }
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}
