use anyhow::{bail, Context, Result};
use clap::Parser;
use motion_tracker::pipeline::{AcceptancePredicate, TrackBirthPolicy};
use motion_tracker::{ParallelPipeline, PipelineConfig, PixelBuffer, Report, SequenceStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Detects and tracks moving objects in a directory of still frames and writes the
/// annotated frames as PNGs.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the input frames, processed in file name order.
    input_dir: PathBuf,

    /// Directory the annotated frames are written to.
    output_dir: PathBuf,

    /// Initial background image. Without it the first input frame is used.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Process at most this many frames.
    #[arg(long)]
    frame_count: Option<usize>,

    /// TOML file with pipeline settings. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    threshold: Option<u8>,

    #[arg(long)]
    min_object_size: Option<u32>,

    #[arg(long)]
    death_budget: Option<u32>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    palette_size: Option<usize>,

    /// Accept a match when the distance is below this multiple of the track's own extent.
    #[arg(long)]
    own_extent_factor: Option<f64>,

    /// Start new tracks for unclaimed objects in any frame, not only the first.
    #[arg(long)]
    every_frame_births: bool,

    /// Paint detected component borders onto the output frames.
    #[arg(long)]
    overlay: bool,

    #[arg(long)]
    join_timeout_ms: Option<u64>,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            config.difference_threshold = threshold;
        }
        if let Some(size) = self.min_object_size {
            config.min_object_size = size;
        }
        if let Some(budget) = self.death_budget {
            config.death_budget = budget;
        }
        if let Some(workers) = self.workers {
            config.worker_pool_size = workers;
        }
        if let Some(size) = self.palette_size {
            config.palette_size = size;
        }
        if let Some(factor) = self.own_extent_factor {
            config.acceptance = AcceptancePredicate::OwnExtent { factor };
        }
        if self.every_frame_births {
            config.track_birth = TrackBirthPolicy::EveryFrame;
        }
        if self.overlay {
            config.overlay_detections = true;
        }
        if self.join_timeout_ms.is_some() {
            config.join_timeout_ms = self.join_timeout_ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn frame_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_frame {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_frame(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    Ok(PixelBuffer::from_rgba_image(image)?)
}

fn log_report(report: &Report) {
    tracing::info!(
        frames = report.frames,
        candidates = report.candidates_per_frame.iter().sum::<usize>(),
        tracks = report.tracks.len(),
        "run finished"
    );
    for track in &report.tracks {
        tracing::info!(
            id = track.id,
            state = ?track.state,
            start = track.start_frame,
            died_at = ?track.died_at,
            observations = track.observations,
            end = ?track.path.last(),
            "track"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.pipeline_config()?;

    let mut paths = frame_paths(&args.input_dir)?;
    if let Some(limit) = args.frame_count {
        paths.truncate(limit);
    }
    if paths.is_empty() {
        bail!("no frames found in {}", args.input_dir.display());
    }
    tracing::info!(frames = paths.len(), dir = %args.input_dir.display(), "loading frames");

    let frames = paths.iter().map(|path| load_frame(path)).collect::<Result<Vec<_>>>()?;
    let store = match &args.background {
        Some(path) => SequenceStore::new(load_frame(path)?, frames)?,
        None => SequenceStore::from_frames(frames)?,
    };
    let store = Arc::new(store);

    let pipeline = ParallelPipeline::new(config)?;
    let report = pipeline.run(Arc::clone(&store)).await?;
    log_report(&report);

    let store = Arc::try_unwrap(store)
        .map_err(|_| anyhow::anyhow!("sequence store is still shared after the run"))?;
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    for (i, frame) in store.into_output_frames()?.into_iter().enumerate() {
        let path = args.output_dir.join(format!("frame_{:05}.png", i + 1));
        frame
            .into_rgba_image()
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    tracing::info!(dir = %args.output_dir.display(), "annotated frames written");
    Ok(())
}
