use std::time::{Duration, Instant};

use crate::backend::{Backend, FrameContext, FrameStep, Interrupt, create_backend};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::encoder::encode;
use crate::session::cancel::CancelToken;
use crate::session::config::RenderConfig;
use crate::show::ShowProgram;

/// Longest single sleep while pacing, so cancellation is noticed promptly.
const PACING_SLICE: Duration = Duration::from_millis(10);

/// A budget that ended a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Budget {
    /// `RenderConfig::wall_clock_ms` elapsed.
    WallClock,
    /// `RenderConfig::max_frames` frames were delivered.
    FrameLimit,
}

/// How a session that did not fault ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The program finished or reached its backend's frame ceiling.
    Completed,
    /// A configured budget ran out.
    BudgetExhausted(Budget),
    /// The consumer cancelled or went away.
    Cancelled,
}

/// Outcome and statistics of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionReport {
    /// Why the session ended.
    pub end: SessionEnd,
    /// Frames delivered to the sink.
    pub frames: u64,
    /// Wall-clock time spent in `run`.
    pub elapsed: Duration,
}

/// One sandboxed run of a show.
///
/// [`RenderSession::new`] dispatches and initializes the backend, so configuration and compile
/// errors surface before any frame. [`RenderSession::run`] then drives the backend frame by frame
/// into a sink. A session is consumed by `run` and never reused.
pub struct RenderSession {
    program: ShowProgram,
    config: RenderConfig,
    backend: Box<dyn Backend>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("kind", &self.program.kind)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum Step {
    Continue,
    Stop(SessionEnd),
}

impl RenderSession {
    /// Validate `config`, pick the backend for `program.kind` and initialize it.
    #[tracing::instrument(skip_all, fields(kind = %program.kind))]
    pub fn new(program: ShowProgram, config: RenderConfig) -> RiterResult<Self> {
        config.validate()?;
        let mut backend = create_backend(program.kind)?;
        backend.initialize(&program.source, &config)?;
        Ok(Self {
            program,
            config,
            backend,
        })
    }

    /// The program being rendered.
    pub fn program(&self) -> &ShowProgram {
        &self.program
    }

    /// The effective configuration.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Drive the backend until it finishes, a budget runs out, the consumer cancels, or the
    /// program faults.
    ///
    /// A runtime fault or trap is delivered to the sink with [`FrameSink::fault`] after the
    /// frames that preceded it and then returned as `Err`. Cancellation is not an error.
    #[tracing::instrument(skip_all, fields(kind = %self.program.kind))]
    pub fn run(
        mut self,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
    ) -> RiterResult<SessionReport> {
        let started = Instant::now();
        let deadline = self.config.wall_clock().map(|d| started + d);
        let interval = self.config.frame_interval();
        let ceiling = self.backend.frame_ceiling();

        sink.begin(SinkConfig::new(self.program.kind, interval))?;

        let mut index = FrameIndex(0);
        let mut last_delivery: Option<Instant> = None;
        let outcome = loop {
            match self.step(
                sink,
                cancel,
                &mut index,
                &mut last_delivery,
                deadline,
                ceiling,
            ) {
                Ok(Step::Continue) => {}
                Ok(Step::Stop(end)) => break Ok(end),
                Err(e) => break Err(e),
            }
        };

        let frames = index.0;
        match outcome {
            Ok(end) => {
                let ended = sink.end();
                if end != SessionEnd::Cancelled {
                    match ended {
                        Err(RiterError::Cancelled) => {}
                        other => other?,
                    }
                }
                let report = SessionReport {
                    end,
                    frames,
                    elapsed: started.elapsed(),
                };
                tracing::debug!(end = ?report.end, frames, "session ended");
                Ok(report)
            }
            Err(err) => {
                if err.is_session_fault() {
                    tracing::warn!(%err, frames, "session faulted");
                    let _ = sink.fault(&err);
                }
                let _ = sink.end();
                Err(err)
            }
        }
    }

    fn step(
        &mut self,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
        index: &mut FrameIndex,
        last_delivery: &mut Option<Instant>,
        deadline: Option<Instant>,
        ceiling: Option<u64>,
    ) -> RiterResult<Step> {
        let ctx = FrameContext::new(deadline, cancel);
        if let Some(why) = ctx.interrupt() {
            return Ok(Step::Stop(interrupted(why)));
        }
        if self.config.max_frames.is_some_and(|max| index.0 >= max) {
            return Ok(Step::Stop(SessionEnd::BudgetExhausted(Budget::FrameLimit)));
        }
        if ceiling.is_some_and(|max| index.0 >= max) {
            return Ok(Step::Stop(SessionEnd::Completed));
        }
        if !sink.poll_ready() {
            return Ok(Step::Stop(SessionEnd::Cancelled));
        }
        if let (Some(last), Some(interval)) = (*last_delivery, self.config.frame_interval())
            && let Some(why) = pace(last + interval, &ctx)
        {
            return Ok(Step::Stop(interrupted(why)));
        }
        if let Some(why) = ctx.interrupt() {
            return Ok(Step::Stop(interrupted(why)));
        }

        let native = match self.backend.produce_frame(*index, &ctx)? {
            FrameStep::Frame(native) => native,
            FrameStep::Finished => return Ok(Step::Stop(SessionEnd::Completed)),
            FrameStep::Interrupted(why) => return Ok(Step::Stop(interrupted(why))),
        };
        let frame = encode(&native)?;
        // Cancellation observed after the frame was computed still suppresses it.
        if cancel.is_cancelled() {
            return Ok(Step::Stop(SessionEnd::Cancelled));
        }
        match sink.push_frame(*index, &frame) {
            Ok(()) => {}
            Err(RiterError::Cancelled) => return Ok(Step::Stop(SessionEnd::Cancelled)),
            Err(e) => return Err(e),
        }
        *last_delivery = Some(Instant::now());
        *index = index.next();
        Ok(Step::Continue)
    }
}

fn interrupted(why: Interrupt) -> SessionEnd {
    match why {
        Interrupt::Cancelled => SessionEnd::Cancelled,
        Interrupt::Deadline => SessionEnd::BudgetExhausted(Budget::WallClock),
    }
}

/// Sleep until `due` in short slices, stopping early on cancellation or deadline.
fn pace(due: Instant, ctx: &FrameContext<'_>) -> Option<Interrupt> {
    loop {
        if let Some(why) = ctx.interrupt() {
            return Some(why);
        }
        let now = Instant::now();
        if now >= due {
            return None;
        }
        let mut nap = (due - now).min(PACING_SLICE);
        if let Some(deadline) = ctx.deadline {
            nap = nap.min(deadline.saturating_duration_since(now));
        }
        std::thread::sleep(nap);
    }
}
