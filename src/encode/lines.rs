use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::encode::sse::write_error;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::bitmap::Frame;

/// Batch contract: one base64 frame per line.
///
/// Faults write nothing; the caller reports them out of band.
#[derive(Debug)]
pub struct Base64LineSink<W: Write> {
    out: W,
}

impl<W: Write> Base64LineSink<W> {
    /// Sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for Base64LineSink<W> {
    fn begin(&mut self, _cfg: SinkConfig) -> RiterResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, _idx: FrameIndex, frame: &Frame) -> RiterResult<()> {
        writeln!(self.out, "{}", STANDARD.encode(frame.as_bytes())).map_err(write_error)?;
        self.out.flush().map_err(write_error)
    }

    fn fault(&mut self, _err: &RiterError) -> RiterResult<()> {
        Ok(())
    }

    fn end(&mut self) -> RiterResult<()> {
        self.out.flush().map_err(write_error)
    }
}

/// Terminal dump: each frame as 38 rows of `#` and `.`, separated by a blank line.
#[derive(Debug)]
pub struct AsciiSink<W: Write> {
    out: W,
}

impl<W: Write> AsciiSink<W> {
    /// Sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for AsciiSink<W> {
    fn begin(&mut self, _cfg: SinkConfig) -> RiterResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> RiterResult<()> {
        write!(self.out, "frame {}\n{}\n", idx.0, frame.to_ascii()).map_err(write_error)?;
        self.out.flush().map_err(write_error)
    }

    fn fault(&mut self, err: &RiterError) -> RiterResult<()> {
        writeln!(self.out, "fault: {err}").map_err(write_error)
    }

    fn end(&mut self) -> RiterResult<()> {
        self.out.flush().map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_per_frame_that_decodes_back() {
        let mut sink = Base64LineSink::new(Vec::new());
        let a = Frame::from_fn(|x, _| x == 0);
        let b = Frame::from_fn(|_, y| y == 37);
        sink.push_frame(FrameIndex(0), &a).unwrap();
        sink.push_frame(FrameIndex(1), &b).unwrap();
        sink.fault(&RiterError::runtime("ignored")).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back = Frame::from_slice(&STANDARD.decode(lines[1]).unwrap()).unwrap();
        assert_eq!(back, b);
        assert_eq!(lines[0].len(), 608);
    }

    #[test]
    fn ascii_dump_has_header_and_rows() {
        let mut sink = AsciiSink::new(Vec::new());
        sink.push_frame(FrameIndex(4), &Frame::from_fn(|x, y| x == 0 && y == 0))
            .unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("frame 4"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("#."));
        assert_eq!(first.len(), 96);
    }
}
