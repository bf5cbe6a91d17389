use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "trajviz", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one scene's trajectories onto its frames.
    Render(RenderArgs),
    /// Render every `<camera>_<scene>` frame directory of a dataset.
    Batch(BatchArgs),
    /// Encode a directory of frames into an MP4 (requires `ffmpeg` on PATH).
    Video(VideoArgs),
    /// Split a video, or every `.avi` of a directory, into numbered JPEG frames.
    Extract(ExtractArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StyleArg {
    Solid,
    Dotted,
    Dashed,
}

impl From<StyleArg> for trajviz::LineStyle {
    fn from(s: StyleArg) -> Self {
        match s {
            StyleArg::Solid => trajviz::LineStyle::Solid,
            StyleArg::Dotted => trajviz::LineStyle::Dotted,
            StyleArg::Dashed => trajviz::LineStyle::Dashed,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Plain,
    Tagged,
}

impl From<FormatArg> for trajviz::TrajectoryFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Plain => trajviz::TrajectoryFormat::Plain,
            FormatArg::Tagged => trajviz::TrajectoryFormat::Tagged,
        }
    }
}

/// Drawing flags shared by `render` and `batch`. Unset flags keep the
/// value from `--config` (or the defaults).
#[derive(Args, Debug)]
struct DrawArgs {
    /// JSON render config; flags given on the command line override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output root directory.
    #[arg(long)]
    write_dir: Option<PathBuf>,

    /// Integer upscale of the photographic output.
    #[arg(long)]
    scale: Option<u32>,

    /// Only render this person id.
    #[arg(long)]
    person: Option<u32>,

    /// Maximum number of track files read per directory.
    #[arg(long)]
    max_tracks: Option<usize>,

    /// Isolated-view mode for `--person` (skeletons only, no boxes).
    #[arg(long)]
    local_skeleton: bool,

    #[arg(long)]
    no_pred_skeleton: bool,

    #[arg(long)]
    no_gt_skeleton: bool,

    #[arg(long)]
    pred_bbox: bool,

    #[arg(long)]
    gt_bbox: bool,

    #[arg(long, value_enum)]
    pred_style: Option<StyleArg>,

    #[arg(long, value_enum)]
    gt_style: Option<StyleArg>,

    /// Trajectory file layout.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    draw: DrawArgs,

    /// Frames directory, named `<camera>_<scene>` unless `--camera` is given.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Predicted trajectory directory (one `<person>.csv` per track).
    #[arg(long)]
    trajectories: Option<PathBuf>,

    /// Ground-truth trajectory directory.
    #[arg(long)]
    gt_trajectories: Option<PathBuf>,

    /// Anomaly mask table, or directory of per-scene `.npy` arrays.
    #[arg(long)]
    masks: Option<PathBuf>,

    #[arg(long)]
    camera: Option<String>,

    #[arg(long)]
    scene: Option<String>,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    #[command(flatten)]
    draw: DrawArgs,

    /// Directory of `<camera>_<scene>` frame directories.
    #[arg(long)]
    frames_root: PathBuf,

    /// Directory of `<scene>` predicted trajectory directories.
    #[arg(long)]
    pred_root: PathBuf,

    /// Directory of `<camera>/<scene>` ground-truth trajectory directories.
    #[arg(long)]
    gt_root: Option<PathBuf>,

    /// Dataset test root holding `frame_level_masks/<camera>`.
    #[arg(long)]
    test_data: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct VideoArgs {
    /// Directory of frames to encode.
    #[arg(long)]
    frames_dir: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = trajviz::ffmpeg::DEFAULT_FPS)]
    fps: u32,
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Input video, or a directory of `.avi` videos.
    #[arg(long)]
    video: PathBuf,

    /// Output frames directory (one subdirectory per video for directory input).
    #[arg(long)]
    out_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Batch(args) => cmd_batch(args),
        Command::Video(args) => cmd_video(args),
        Command::Extract(args) => cmd_extract(args),
    }
}

fn base_config(draw: &DrawArgs) -> anyhow::Result<trajviz::RenderConfig> {
    let mut cfg = match &draw.config {
        Some(path) => trajviz::RenderConfig::from_json_file(path)?,
        None => trajviz::RenderConfig::new("", ""),
    };
    if let Some(dir) = &draw.write_dir {
        cfg.write_dir = dir.clone();
    }
    if let Some(scale) = draw.scale {
        cfg.scale = scale;
    }
    if draw.person.is_some() {
        cfg.person = draw.person;
    }
    if let Some(n) = draw.max_tracks {
        cfg.max_tracks = n;
    }
    cfg.local_skeleton |= draw.local_skeleton;
    if draw.no_pred_skeleton {
        cfg.prediction.skeleton = false;
    }
    if draw.no_gt_skeleton {
        cfg.ground_truth.skeleton = false;
    }
    cfg.prediction.bbox |= draw.pred_bbox;
    cfg.ground_truth.bbox |= draw.gt_bbox;
    if let Some(style) = draw.pred_style {
        cfg.prediction.style = style.into();
    }
    if let Some(style) = draw.gt_style {
        cfg.ground_truth.style = style.into();
    }
    if let Some(format) = draw.format {
        cfg.format = format.into();
    }
    if cfg.write_dir.as_os_str().is_empty() {
        anyhow::bail!("--write-dir is required (or `write_dir` in --config)");
    }
    Ok(cfg)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = base_config(&args.draw)?;
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if args.trajectories.is_some() {
        cfg.trajectories = args.trajectories;
    }
    if args.gt_trajectories.is_some() {
        cfg.gt_trajectories = args.gt_trajectories;
    }
    if args.masks.is_some() {
        cfg.masks = args.masks;
    }
    if args.camera.is_some() {
        cfg.camera = args.camera;
    }
    if args.scene.is_some() {
        cfg.scene = args.scene;
    }
    if cfg.frames.as_os_str().is_empty() {
        anyhow::bail!("--frames is required (or `frames` in --config)");
    }

    let report = trajviz::render_scene(&cfg)
        .with_context(|| format!("render scene from '{}'", cfg.frames.display()))?;
    eprintln!(
        "wrote {} images for {} to {}",
        report.written.images,
        report.scene,
        cfg.write_dir.display()
    );
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let template = base_config(&args.draw)?;
    let roots = trajviz::BatchRoots {
        frames: args.frames_root,
        predictions: args.pred_root,
        ground_truth: args.gt_root,
        test_data: args.test_data,
    };
    let reports = trajviz::render_batch(&template, &roots)?;
    let images: u64 = reports.iter().map(|r| r.written.images).sum();
    eprintln!(
        "rendered {} scenes ({images} images) to {}",
        reports.len(),
        template.write_dir.display()
    );
    Ok(())
}

fn cmd_video(args: VideoArgs) -> anyhow::Result<()> {
    let frames = trajviz::ffmpeg::encode_frames_dir(&args.frames_dir, &args.out, args.fps)?;
    eprintln!("wrote {} ({frames} frames)", args.out.display());
    Ok(())
}

fn cmd_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let frames = if args.video.is_dir() {
        trajviz::ffmpeg::extract_dataset(&args.video, &args.out_dir)?
    } else {
        trajviz::ffmpeg::extract_frames(&args.video, &args.out_dir)?
    };
    eprintln!("extracted {frames} frames to {}", args.out_dir.display());
    Ok(())
}
