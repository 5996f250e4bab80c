use crate::backend::{Backend, FrameContext, FrameStep, not_initialized};
use crate::expression::bytecode::BytecodeProgram;
use crate::expression::compile::compile_fragment;
use crate::expression::vm::{FragmentInputs, VmScratch, eval_fragment};
use crate::foundation::core::{FrameIndex, HEIGHT, PIXELS, WIDTH};
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::encoder::NativePixels;
use crate::session::config::RenderConfig;
use crate::show::ShowKind;

/// Frames in a shader show.
pub const SHADER_FRAMES: u64 = 200;
/// `u_time` advance per frame, in seconds.
pub const SHADER_TIME_STEP: f64 = 0.05;
/// The constant, centered `u_mouse`.
pub const SHADER_MOUSE: [f64; 2] = [WIDTH as f64 / 2.0, HEIGHT as f64 / 2.0];

/// Evaluates a compiled fragment program for every pixel.
///
/// Evaluation sees only the frame index through `u_time`, so identical sources yield identical
/// frames.
#[derive(Debug, Default)]
pub struct ShaderBackend {
    program: Option<BytecodeProgram>,
    scratch: VmScratch,
}

impl ShaderBackend {
    /// Unbound shader backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for ShaderBackend {
    fn kind(&self) -> ShowKind {
        ShowKind::Shader
    }

    #[tracing::instrument(skip_all, fields(len = source.len()))]
    fn initialize(&mut self, source: &str, _config: &RenderConfig) -> RiterResult<()> {
        let program = compile_fragment(source).map_err(|e| RiterError::compile(e.message))?;
        tracing::debug!(ops = program.ops.len(), "shader compiled");
        self.program = Some(program);
        Ok(())
    }

    fn produce_frame(
        &mut self,
        index: FrameIndex,
        ctx: &FrameContext<'_>,
    ) -> RiterResult<FrameStep> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| not_initialized(ShowKind::Shader))?;
        if index.0 >= SHADER_FRAMES {
            return Ok(FrameStep::Finished);
        }

        let mut inputs = FragmentInputs {
            frag_coord: [0.0, 0.0, 0.0, 1.0],
            resolution: [WIDTH as f64, HEIGHT as f64],
            mouse: SHADER_MOUSE,
            time: index.0 as f64 * SHADER_TIME_STEP,
        };

        let mut out = Vec::with_capacity(PIXELS);
        for y in 0..HEIGHT {
            if let Some(why) = ctx.interrupt() {
                return Ok(FrameStep::Interrupted(why));
            }
            // GLSL puts the origin at the bottom-left pixel's corner.
            inputs.frag_coord[1] = (HEIGHT - 1 - y) as f64 + 0.5;
            for x in 0..WIDTH {
                inputs.frag_coord[0] = x as f64 + 0.5;
                let rgba = eval_fragment(program, &mut self.scratch, &inputs).map_err(|e| {
                    RiterError::runtime(format!("pixel ({x}, {y}): {}", e.message))
                })?;
                out.push(rgba);
            }
        }
        Ok(FrameStep::Frame(NativePixels::RgbaF32(out)))
    }

    fn frame_ceiling(&self) -> Option<u64> {
        Some(SHADER_FRAMES)
    }
}
