use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use edgewatch::{
    assets::{install_asset, AssetBundle},
    camera::{CameraView, FrameListener, FrameSink, FrameSource, ImageSequence, ImageSequenceWriter, RunStats},
    config::{self, AppConfig},
    edge::EdgeDetector,
    loader::{Backend, Loader},
    logging,
    motion::MotionDetector,
};

#[derive(Parser)]
#[command(name = "edgewatch", version)]
#[command(about = "Edge and motion overlays for camera frames")]
struct Cli {
    /// Directory for log files (overrides `logging.dir`)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Black out and outline Canny edge contours
    Edges(RunArgs),

    /// Outline regions that changed since the previous frame
    Motion(RunArgs),

    /// Copy the bundled cascade classifier into writable storage
    InstallCascade {
        #[arg(long)] assets: Option<PathBuf>,
        #[arg(long)] dest:   Option<PathBuf>,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Directory of input frames (png/jpg/bmp, processed in name order)
    #[arg(short, long)]
    #[cfg_attr(not(feature = "opencv"), arg(required = true))]
    #[cfg_attr(feature = "opencv", arg(required_unless_present_any = ["device", "url"]))]
    input: Option<PathBuf>,

    /// Directory the annotated frames are written to
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long)]
    max_frames: Option<u64>,

    /// Capture from a camera device through OpenCV instead of `--input`
    #[cfg(feature = "opencv")]
    #[arg(long, conflicts_with_all = ["input", "url"])]
    device: Option<i32>,

    /// Read frames from a video file or stream URL through OpenCV
    #[cfg(feature = "opencv")]
    #[arg(long, conflicts_with = "input")]
    url: Option<String>,
}

#[derive(Clone, Copy, Debug)]
enum Pipeline {
    Edges,
    Motion,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = config::load_config();
    let (mut cfg, load_err) = match loaded {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Some(dir) = cli.log_dir {
        cfg.logging.dir = Some(dir);
    }
    logging::init_logging(&cfg.logging);
    if let Some(e) = load_err {
        warn!("Config load failed ({}), using defaults", e);
    }

    match cli.command {
        Command::Edges(args) => run(Pipeline::Edges, args, cfg).await?,
        Command::Motion(args) => run(Pipeline::Motion, args, cfg).await?,
        Command::InstallCascade { assets, dest } => {
            if let Some(a) = assets { cfg.cascade.asset_dir   = a; }
            if let Some(d) = dest   { cfg.cascade.install_dir = d; }
            let bundle = AssetBundle::open(&cfg.cascade.asset_dir);
            let path = install_asset(&bundle, &cfg.cascade.file_name, &cfg.cascade.install_dir)
                .with_context(|| {
                    format!(
                        "installing {} from {} (see assets/README.md)",
                        cfg.cascade.file_name,
                        cfg.cascade.asset_dir.display()
                    )
                })?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn run(pipeline: Pipeline, args: RunArgs, mut cfg: AppConfig) -> Result<()> {
    if args.max_frames.is_some() {
        cfg.camera.max_frames = args.max_frames;
    }
    let backend = backend_for(&args);

    // The view stays disabled until the backend is connected.
    let loader = Loader::new(backend, cfg.cascade.clone());
    let deps = loader.initialize().await.context("connecting vision backend")?;
    match &deps.cascade {
        Some(c) => info!("Using {} with cascade {}", deps.version, c),
        None => info!("Using {} without cascade", deps.version),
    }

    let stats = tokio::task::spawn_blocking(move || run_blocking(pipeline, backend, &args, &cfg))
        .await??;
    println!(
        "{:?}: {} frames{}",
        pipeline,
        stats.frames,
        stats.size.map(|(w, h)| format!(" at {}x{}", w, h)).unwrap_or_default()
    );
    Ok(())
}

#[cfg(feature = "opencv")]
fn backend_for(args: &RunArgs) -> Backend {
    if args.device.is_some() || args.url.is_some() { Backend::OpenCv } else { Backend::ImageProc }
}

#[cfg(not(feature = "opencv"))]
fn backend_for(_args: &RunArgs) -> Backend {
    Backend::ImageProc
}

fn run_blocking(pipeline: Pipeline, backend: Backend, args: &RunArgs, cfg: &AppConfig) -> Result<RunStats> {
    let ratio = cfg.cascade.face_size_ratio;

    #[cfg(feature = "opencv")]
    if backend == Backend::OpenCv {
        use edgewatch::cv::{CvEdgeDetector, CvMotionDetector, DeviceCapture, MatWriter};

        let source = match (&args.url, args.device) {
            (Some(url), _) => DeviceCapture::open_url(url)?,
            (None, Some(device)) => DeviceCapture::open_device(device)?,
            (None, None) => anyhow::bail!("no capture device or URL"),
        };
        let mut sink = MatWriter::create(&args.output)?;
        return match pipeline {
            Pipeline::Edges => {
                let mut det = CvEdgeDetector::new(cfg.edges.clone(), &cfg.overlay).with_face_size_ratio(ratio);
                drive(source, &mut det, &mut sink, cfg)
            }
            Pipeline::Motion => {
                let mut det = CvMotionDetector::new(cfg.motion.clone(), &cfg.overlay)?.with_face_size_ratio(ratio);
                drive(source, &mut det, &mut sink, cfg)
            }
        };
    }
    #[cfg(not(feature = "opencv"))]
    let _ = backend;

    let input = args.input.as_ref().context("--input is required")?;
    let source = ImageSequence::open(input)
        .with_context(|| format!("opening frames in {}", input.display()))?;
    let mut sink = ImageSequenceWriter::create(&args.output)?;

    match pipeline {
        Pipeline::Edges => {
            let mut det = EdgeDetector::new(cfg.edges.clone(), &cfg.overlay).with_face_size_ratio(ratio);
            drive(source, &mut det, &mut sink, cfg)
        }
        Pipeline::Motion => {
            let mut det = MotionDetector::new(cfg.motion.clone(), &cfg.overlay).with_face_size_ratio(ratio);
            drive(source, &mut det, &mut sink, cfg)
        }
    }
}

fn drive<S, L, K>(source: S, listener: &mut L, sink: &mut K, cfg: &AppConfig) -> Result<RunStats>
where
    S: FrameSource,
    L: FrameListener<Frame = S::Frame>,
    K: FrameSink<S::Frame>,
{
    let mut view = CameraView::new(source).with_max_frames(cfg.camera.max_frames);
    view.enable_view();
    Ok(view.run(listener, sink)?)
}
