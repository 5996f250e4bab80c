use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use riter::{
    AsciiSink, Base64LineSink, CancelToken, FrameIndex, FrameSink, HEIGHT, InMemorySink,
    RenderConfig, RenderProfile, RenderSession, SessionEnd, ShowKind, ShowProgram, SseSink, WIDTH,
};

#[derive(Parser, Debug)]
#[command(name = "riter", version, about = "Render 96x38 monochrome shows")]
struct Cli {
    /// Log level written to stderr (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one base64 frame per line until the show ends or a budget runs out.
    Render(RenderArgs),
    /// Write the preview wire (server-sent events) to stdout.
    Sse(ShowArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show source file. With `--kind` it is raw program text, otherwise
    /// `{"kind": "...", "source": "..."}` JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Show kind: glyph, imperative, shader, byte-program (or text, p5, wasm).
    #[arg(long)]
    kind: Option<ShowKind>,

    /// Budget preset.
    #[arg(long, default_value = "batch")]
    profile: RenderProfile,

    /// JSON render config; overrides the preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Seed for `random()` in imperative shows.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    show: ShowArgs,

    /// Dump frames as `#`/`.` text instead of base64.
    #[arg(long, default_value_t = false)]
    ascii: bool,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    show: ShowArgs,

    /// Frame index (0-based).
    #[arg(long)]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Integer upscale factor for the PNG.
    #[arg(long, default_value_t = 1)]
    scale: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Sse(args) => cmd_sse(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

impl ShowArgs {
    fn program(&self) -> anyhow::Result<ShowProgram> {
        let program = match self.kind {
            Some(kind) => {
                let source = std::fs::read_to_string(&self.in_path)
                    .with_context(|| format!("read show '{}'", self.in_path.display()))?;
                ShowProgram::new(kind, source)
            }
            None => ShowProgram::from_path(&self.in_path)
                .with_context(|| format!("load show '{}'", self.in_path.display()))?,
        };
        Ok(program)
    }

    fn config(&self) -> anyhow::Result<RenderConfig> {
        let mut cfg = match &self.config {
            Some(path) => RenderConfig::from_path(path)?,
            None => RenderConfig::for_profile(self.profile),
        };
        if self.max_frames.is_some() {
            cfg.max_frames = self.max_frames;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        Ok(cfg)
    }
}

/// Run a session to completion; faults are returned after the sink has seen them.
fn run(show: &ShowArgs, cfg: RenderConfig, sink: &mut dyn FrameSink) -> anyhow::Result<()> {
    let program = show.program()?;
    let session = RenderSession::new(program, cfg)?;
    let report = session.run(sink, &CancelToken::new())?;
    tracing::info!(end = ?report.end, frames = report.frames, "done");
    if report.end == SessionEnd::Cancelled {
        tracing::debug!("consumer closed the output");
    }
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = args.show.config()?;
    let stdout = std::io::stdout().lock();
    if args.ascii {
        run(&args.show, cfg, &mut AsciiSink::new(stdout))
    } else {
        run(&args.show, cfg, &mut Base64LineSink::new(stdout))
    }
}

fn cmd_sse(args: ShowArgs) -> anyhow::Result<()> {
    let cfg = args.config()?;
    let mut sink = SseSink::new(std::io::stdout().lock());
    run(&args, cfg, &mut sink)
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.scale >= 1, "--scale must be at least 1");
    let mut cfg = args.show.config()?;
    cfg.max_frames = Some(args.index.saturating_add(1));
    cfg.frame_interval_ms = None;

    let mut sink = InMemorySink::new();
    run(&args.show, cfg, &mut sink)?;
    let frame = sink
        .frames()
        .iter()
        .find(|(idx, _)| *idx == FrameIndex(args.index))
        .map(|(_, f)| f)
        .with_context(|| {
            format!(
                "show ended after {} frame(s); no frame {}",
                sink.frames().len(),
                args.index
            )
        })?;

    let img = image::RgbaImage::from_raw(WIDTH as u32, HEIGHT as u32, frame.to_rgba8())
        .context("frame buffer has unexpected size")?;
    let img = if args.scale > 1 {
        image::imageops::resize(
            &img,
            WIDTH as u32 * args.scale,
            HEIGHT as u32 * args.scale,
            image::imageops::FilterType::Nearest,
        )
    } else {
        img
    };

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    let mut err = std::io::stderr().lock();
    writeln!(err, "wrote {}", args.out.display())?;
    Ok(())
}
