use std::io::{self, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::bitmap::Frame;

/// Map a write failure: a closed peer is a cancellation, anything else is I/O.
pub(crate) fn write_error(e: io::Error) -> RiterError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => RiterError::Cancelled,
        _ => RiterError::Io(e),
    }
}

/// Preview wire: one `data: <base64>` event per frame, `event: error` on a fault.
///
/// Each event is flushed as soon as it is written.
#[derive(Debug)]
pub struct SseSink<W: Write> {
    out: W,
}

impl<W: Write> SseSink<W> {
    /// Sink writing server-sent events to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &str) -> RiterResult<()> {
        self.out.write_all(event.as_bytes()).map_err(write_error)?;
        self.out.flush().map_err(write_error)
    }
}

impl<W: Write> FrameSink for SseSink<W> {
    fn begin(&mut self, _cfg: SinkConfig) -> RiterResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, _idx: FrameIndex, frame: &Frame) -> RiterResult<()> {
        let payload = STANDARD.encode(frame.as_bytes());
        self.emit(&format!("data: {payload}\n\n"))
    }

    fn fault(&mut self, _err: &RiterError) -> RiterResult<()> {
        self.emit("event: error\n\n")
    }

    fn end(&mut self) -> RiterResult<()> {
        self.out.flush().map_err(write_error)
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A frame payload.
    Frame(Frame),
    /// The producer reported a terminal fault.
    Error,
}

/// Incremental decoder for the preview wire.
///
/// Bytes may arrive split anywhere, including inside a line or a UTF-8 sequence; incomplete
/// lines stay buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: String,
}

impl SseDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> RiterResult<Vec<SseEvent>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(nl) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=nl).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|_| RiterError::configuration("sse line is not valid utf-8"))?;
            if let Some(ev) = self.line(&line)? {
                out.push(ev);
            }
        }
        Ok(out)
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn line(&mut self, line: &str) -> RiterResult<Option<SseEvent>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> RiterResult<Option<SseEvent>> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.as_deref() == Some("error") {
            return Ok(Some(SseEvent::Error));
        }
        if data.is_empty() {
            return Ok(None);
        }
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| RiterError::configuration(format!("invalid frame payload: {e}")))?;
        Ok(Some(SseEvent::Frame(Frame::from_slice(&bytes)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: usize) -> Frame {
        Frame::from_fn(|x, y| y * 96 + x < n)
    }

    #[test]
    fn sink_writes_data_lines_and_bare_error_event() {
        let mut sink = SseSink::new(Vec::new());
        sink.push_frame(FrameIndex(0), &lit(8)).unwrap();
        sink.fault(&RiterError::trap("oob")).unwrap();
        sink.end().unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let mut expected = String::from("data: /w");
        expected.push_str(&"A".repeat(606));
        expected.push_str("\n\nevent: error\n\n");
        assert_eq!(text, expected);
        assert!(!text.contains("oob"));
    }

    #[test]
    fn decoder_handles_arbitrary_splits() {
        let mut sink = SseSink::new(Vec::new());
        sink.push_frame(FrameIndex(0), &lit(3)).unwrap();
        sink.push_frame(FrameIndex(1), &lit(50)).unwrap();
        sink.fault(&RiterError::runtime("x")).unwrap();
        let wire = sink.into_inner();

        for split in [1, 7, 100, 455, wire.len() - 1] {
            let mut dec = SseDecoder::new();
            let mut events = dec.feed(&wire[..split]).unwrap();
            events.extend(dec.feed(&wire[split..]).unwrap());
            assert_eq!(
                events,
                vec![
                    SseEvent::Frame(lit(3)),
                    SseEvent::Frame(lit(50)),
                    SseEvent::Error
                ],
                "split at {split}"
            );
            assert_eq!(dec.pending(), 0);
        }
    }

    #[test]
    fn decoder_ignores_comments_and_accepts_crlf() {
        let mut dec = SseDecoder::new();
        let payload = STANDARD.encode(Frame::blank().as_bytes());
        let wire = format!(": keepalive\r\nevent: screen_update\r\ndata: {payload}\r\n\r\n");
        assert_eq!(
            dec.feed(wire.as_bytes()).unwrap(),
            vec![SseEvent::Frame(Frame::blank())]
        );
    }

    #[test]
    fn decoder_rejects_wrong_sized_payload() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"data: AAAA\n\n").is_err());
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn broken_pipe_is_cancellation() {
        let mut sink = SseSink::new(Closed);
        let err = sink.push_frame(FrameIndex(0), &Frame::blank()).unwrap_err();
        assert!(matches!(err, RiterError::Cancelled));
    }
}
