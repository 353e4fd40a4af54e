//! Server-Sent Events decoding for the answer stream

/// Incremental Server-Sent Events decoder
///
/// Buffers incoming bytes and yields one payload per dispatched event. Bytes
/// are only decoded once a full line has arrived, so a multi-byte character
/// split across network chunks survives intact. Multiple
/// `data:` lines inside one event are joined with `\n`; the event is dispatched
/// on the blank line that terminates it. Comment lines (`:`) and other fields
/// (`event:`, `id:`, `retry:`) are skipped.
///
/// # Example
/// ```
/// use transcript_client::api::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"data: {\"type\":\"del").is_empty());
/// assert_eq!(decoder.push(b"ta\"}\n\n"), vec!["{\"type\":\"delta\"}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push incoming bytes and return every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(payload) = self.accept_line(line.trim_end_matches(['\n', '\r'])) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest);
        let mut payloads = Vec::new();
        for line in rest.lines() {
            if let Some(payload) = self.accept_line(line) {
                payloads.push(payload);
            }
        }
        if let Some(payload) = self.dispatch() {
            payloads.push(payload);
        }
        payloads
    }

    fn accept_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"type\":\"end\"}\n\n");
        assert_eq!(payloads, vec!["{\"type\":\"end\"}"]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"accumulated\":\"The").is_empty());
        assert!(decoder.push(b" lecture\"}\n").is_empty());
        assert_eq!(
            decoder.push(b"\n"),
            vec!["{\"accumulated\":\"The lecture\"}"]
        );
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: first\ndata: second\n\n");
        assert_eq!(payloads, vec!["first\nsecond"]);
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let payloads =
            decoder.push(b": keep-alive\r\nevent: message\r\ndata: {\"x\":1}\r\n\r\n");
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}").len() == 1);
        assert_eq!(decoder.finish(), vec!["{\"b\":2}"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let event = "data: {\"text\":\"café résumé\"}\n\n".as_bytes();
        // Split between the two bytes of the first 'é'
        let split = event.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&event[..split]).is_empty());
        assert_eq!(
            decoder.push(&event[split..]),
            vec!["{\"text\":\"café résumé\"}"]
        );
    }

    #[test]
    fn test_multibyte_tail_flushed_on_finish() {
        let event = "data: naïve".as_bytes();
        // Split after the lead byte of 'ï'
        let split = event.len() - 3;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&event[..split]).is_empty());
        assert!(decoder.push(&event[split..]).is_empty());
        assert_eq!(decoder.finish(), vec!["naïve"]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"text\":\"\xFF\"}\n\n");
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("text"));
    }
}
