use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::encode::sink::{ChannelSink, Delivery};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::bitmap::Frame;
use crate::session::cancel::CancelToken;
use crate::session::config::RenderConfig;
use crate::session::render_session::{RenderSession, SessionReport};
use crate::show::ShowProgram;

/// Sketch interpretation recurses; give session threads room beyond the platform default.
const SESSION_STACK_BYTES: usize = 8 * 1024 * 1024;

/// A render session running on its own thread, pulled as an iterator.
///
/// Each call to `next` requests exactly one frame, so the producer never runs ahead of the
/// consumer. The iterator yields `Ok` frames in order, then at most one `Err` for a runtime fault
/// or trap, then ends. Dropping the stream cancels the session and joins its thread.
#[derive(Debug)]
pub struct FrameStream {
    rx: Option<mpsc::Receiver<Delivery>>,
    demand: Option<mpsc::Sender<()>>,
    cancel: CancelToken,
    handle: Option<JoinHandle<RiterResult<SessionReport>>>,
    done: bool,
}

impl FrameStream {
    /// Start a session for `program`. Configuration and compile errors are returned here,
    /// before any frame is requested.
    pub fn spawn(program: ShowProgram, config: RenderConfig) -> RiterResult<Self> {
        let cancel = CancelToken::new();
        let (sink, demand, rx) = ChannelSink::on_demand();
        let (setup_tx, setup_rx) = mpsc::channel::<RiterResult<()>>();

        let session_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("riter-{}", program.kind))
            .stack_size(SESSION_STACK_BYTES)
            .spawn(move || {
                let mut sink = sink;
                let session = match RenderSession::new(program, config) {
                    Ok(session) => {
                        let _ = setup_tx.send(Ok(()));
                        session
                    }
                    Err(e) => {
                        let returned = e.duplicate();
                        let _ = setup_tx.send(Err(e));
                        return Err(returned);
                    }
                };
                session.run(&mut sink, &session_cancel)
            })?;

        match setup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                rx: Some(rx),
                demand: Some(demand),
                cancel,
                handle: Some(handle),
                done: false,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(join(handle).err().unwrap_or_else(|| {
                RiterError::Other(anyhow::anyhow!("session thread exited during setup"))
            })),
        }
    }

    /// Handle that cancels this stream's session from anywhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop the session. Frames already received stay valid; `next` returns `None` from now on.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.done = true;
    }

    /// Stop requesting frames, wait for the session thread and return its report.
    ///
    /// Called after the iterator is exhausted this reports how the session ended; called earlier
    /// it ends the session as cancelled.
    pub fn finish(mut self) -> RiterResult<SessionReport> {
        self.demand = None;
        let handle = self
            .handle
            .take()
            .ok_or_else(|| RiterError::Other(anyhow::anyhow!("session already joined")))?;
        join(handle)
    }
}

fn join(handle: JoinHandle<RiterResult<SessionReport>>) -> RiterResult<SessionReport> {
    handle
        .join()
        .map_err(|_| RiterError::Other(anyhow::anyhow!("session thread panicked")))?
}

impl Iterator for FrameStream {
    type Item = RiterResult<(FrameIndex, Frame)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cancel.is_cancelled() {
            self.done = true;
            return None;
        }
        let (Some(demand), Some(rx)) = (&self.demand, &self.rx) else {
            return None;
        };
        if demand.send(()).is_err() {
            self.done = true;
            return None;
        }
        match rx.recv() {
            Ok(Delivery::Frame(idx, frame)) => Some(Ok((idx, frame))),
            Ok(Delivery::Fault(err)) => {
                self.done = true;
                Some(Err(err))
            }
            Ok(Delivery::End) | Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.demand = None;
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::render_session::SessionEnd;
    use crate::show::ShowKind;

    #[test]
    fn yields_frames_in_order_then_ends() {
        let cfg = RenderConfig {
            max_frames: Some(4),
            ..RenderConfig::batch()
        };
        let stream = FrameStream::spawn(ShowProgram::new(ShowKind::Shader, "u_time"), cfg).unwrap();
        let idx: Vec<u64> = stream.map(|r| r.unwrap().0.0).collect();
        assert_eq!(idx, vec![0, 1, 2, 3]);
    }

    #[test]
    fn setup_errors_are_synchronous() {
        let err = FrameStream::spawn(
            ShowProgram::new(ShowKind::Imperative, "function ("),
            RenderConfig::batch(),
        )
        .unwrap_err();
        assert!(matches!(err, RiterError::Compile(_)));
    }

    #[test]
    fn finish_early_reports_cancelled() {
        let mut stream =
            FrameStream::spawn(ShowProgram::new(ShowKind::Shader, "1.0"), RenderConfig::batch())
                .unwrap();
        assert!(stream.next().unwrap().is_ok());
        let report = stream.finish().unwrap();
        assert_eq!(report.end, SessionEnd::Cancelled);
        assert_eq!(report.frames, 1);
    }

    #[test]
    fn fault_is_yielded_once() {
        let mut stream = FrameStream::spawn(
            ShowProgram::new(ShowKind::Imperative, "function draw() { boom(); }"),
            RenderConfig::batch(),
        )
        .unwrap();
        assert!(matches!(stream.next(), Some(Err(RiterError::RuntimeFault(_)))));
        assert!(stream.next().is_none());
        assert!(matches!(stream.finish(), Err(RiterError::RuntimeFault(_))));
    }
}
