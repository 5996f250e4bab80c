use std::sync::mpsc;
use std::time::Duration;

use crate::foundation::core::{FrameIndex, HEIGHT, WIDTH};
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::bitmap::Frame;
use crate::show::ShowKind;

/// Configuration provided to a [`FrameSink`] when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Kind of the show being rendered.
    pub kind: ShowKind,
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
    /// Pacing between frames, if the session is paced.
    pub frame_interval: Option<Duration>,
}

impl SinkConfig {
    /// Config for the fixed 96x38 display.
    pub fn new(kind: ShowKind, frame_interval: Option<Duration>) -> Self {
        Self {
            kind,
            width: WIDTH as u32,
            height: HEIGHT as u32,
            frame_interval,
        }
    }
}

/// Sink contract for consuming frames as a session produces them.
///
/// Ordering contract: `begin` once, then `push_frame` in strictly increasing [`FrameIndex`]
/// order, then at most one `fault`, then `end`. Returning [`RiterError::Cancelled`] from
/// `push_frame` means the consumer has gone away.
pub trait FrameSink {
    /// Called once before any frame is produced.
    fn begin(&mut self, cfg: SinkConfig) -> RiterResult<()>;

    /// Called before each frame is produced. `false` means the consumer will take no more frames
    /// and the session ends as cancelled. May block to apply backpressure.
    fn poll_ready(&mut self) -> bool {
        true
    }

    /// Deliver one frame.
    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> RiterResult<()>;

    /// Terminal runtime fault or trap; no frames follow.
    fn fault(&mut self, err: &RiterError) -> RiterResult<()>;

    /// Called once when the session is over, whatever the outcome.
    fn end(&mut self) -> RiterResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, Frame)>,
    fault: Option<String>,
    ended: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    /// Captured frames, in delivery order.
    pub fn frames(&self) -> &[(FrameIndex, Frame)] {
        &self.frames
    }

    /// Message of the terminal fault, if one was delivered.
    pub fn fault_message(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Whether `end` has been called.
    pub fn ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> RiterResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.fault = None;
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> RiterResult<()> {
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn fault(&mut self, err: &RiterError) -> RiterResult<()> {
        self.fault = Some(err.to_string());
        Ok(())
    }

    fn end(&mut self) -> RiterResult<()> {
        self.ended = true;
        Ok(())
    }
}

/// What a [`ChannelSink`] forwards to its receiver.
#[derive(Debug)]
pub enum Delivery {
    /// One frame.
    Frame(FrameIndex, Frame),
    /// Terminal fault; nothing but [`Delivery::End`] follows.
    Fault(RiterError),
    /// The session is over.
    End,
}

/// Buffering sink for a display driver or any consumer on another thread.
///
/// Frames travel through a bounded channel. With a demand channel attached the producer also
/// waits for an explicit request before each frame, so at most one frame is ever in flight.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::SyncSender<Delivery>,
    demand: Option<mpsc::Receiver<()>>,
}

impl ChannelSink {
    /// Sink plus receiver with room for `capacity` undelivered items (at least one).
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self { tx, demand: None }, rx)
    }

    /// Sink that produces a frame only after a `()` arrives on the returned sender.
    pub fn on_demand() -> (Self, mpsc::Sender<()>, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::sync_channel(1);
        let (demand_tx, demand_rx) = mpsc::channel();
        (
            Self {
                tx,
                demand: Some(demand_rx),
            },
            demand_tx,
            rx,
        )
    }
}

impl FrameSink for ChannelSink {
    fn begin(&mut self, _cfg: SinkConfig) -> RiterResult<()> {
        Ok(())
    }

    fn poll_ready(&mut self) -> bool {
        match &self.demand {
            Some(demand) => demand.recv().is_ok(),
            None => true,
        }
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &Frame) -> RiterResult<()> {
        self.tx
            .send(Delivery::Frame(idx, frame.clone()))
            .map_err(|_| RiterError::Cancelled)
    }

    fn fault(&mut self, err: &RiterError) -> RiterResult<()> {
        self.tx
            .send(Delivery::Fault(err.duplicate()))
            .map_err(|_| RiterError::Cancelled)
    }

    fn end(&mut self) -> RiterResult<()> {
        // A consumer that stopped reading must not block the producer here.
        let _ = self.tx.try_send(Delivery::End);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_records_everything() {
        let mut sink = InMemorySink::new();
        sink.begin(SinkConfig::new(ShowKind::Glyph, None)).unwrap();
        sink.push_frame(FrameIndex(0), &Frame::blank()).unwrap();
        sink.fault(&RiterError::runtime("boom")).unwrap();
        sink.end().unwrap();
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.config().unwrap().width, 96);
        assert!(sink.fault_message().unwrap().contains("boom"));
        assert!(sink.ended());
    }

    #[test]
    fn channel_sink_reports_dropped_receiver_as_cancelled() {
        let (mut sink, rx) = ChannelSink::new(1);
        drop(rx);
        let err = sink.push_frame(FrameIndex(0), &Frame::blank()).unwrap_err();
        assert!(matches!(err, RiterError::Cancelled));
        assert!(sink.end().is_ok());
    }

    #[test]
    fn on_demand_sink_waits_for_requests() {
        let (mut sink, demand, rx) = ChannelSink::on_demand();
        demand.send(()).unwrap();
        assert!(sink.poll_ready());
        sink.push_frame(FrameIndex(0), &Frame::blank()).unwrap();
        assert!(matches!(rx.recv().unwrap(), Delivery::Frame(FrameIndex(0), _)));
        drop(demand);
        assert!(!sink.poll_ready());
    }
}
