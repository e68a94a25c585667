// THEORY:
// The `pipeline` module is the top-level API of the engine. It owns the public
// configuration (`PipelineConfig`), the end-of-run `Report`, and `VisionPipeline`,
// the sequential orchestration of the two phases:
//
//   Phase 1 (detection): for frames 1..=N, difference each frame against the
//   running background, clean up the mask, extract candidate rectangles, then step
//   the background toward the frame.
//   Phase 2 (tracking): associate candidates into tracks frame by frame, then draw
//   every track's rectangles and final path onto the output frames.
//
// `ParallelPipeline` runs the same phases on a bounded worker pool. Both share the
// per-frame and per-track units (`FrameProcessor`, `Tracker`, `renderer`), so their
// results are identical.

use crate::core_modules::frame_processor::FrameProcessor;
use crate::core_modules::palette::Palette;
use crate::core_modules::renderer;
use crate::core_modules::sequence_store::SequenceStore;
use crate::error::{validate_mask_size, Result, VisionError};
use std::time::Duration;

// Re-export key data structures for the public API.
pub use crate::core_modules::filters::BackgroundChannelMode;
pub use crate::core_modules::pixel::pixel::Pixel;
pub use crate::core_modules::rectangle::{Point, Rectangle};
pub use crate::core_modules::tracker::{AcceptancePredicate, Track, TrackBirthPolicy, TrackState, Tracker};

/// Mask sizes of the dilation → erosion → dilation cleanup and the border ring.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MorphologyConfig {
    pub first_dilation: usize,
    pub erosion: usize,
    pub second_dilation: usize,
    pub border_width: usize,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            first_dilation: 13,
            erosion: 15,
            second_dilation: 3,
            border_width: 3,
        }
    }
}

/// Configuration for the vision pipeline, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Gray-level difference a pixel must exceed to count as motion.
    pub difference_threshold: u8,
    /// Candidates with either extent below this are treated as noise.
    pub min_object_size: u32,
    /// Per-frame background adaptation limit, per channel.
    pub background_step: u8,
    pub background_mode: BackgroundChannelMode,
    pub morphology: MorphologyConfig,
    /// Consecutive unmatched frames a track survives.
    pub death_budget: u32,
    /// Number of pool workers used by `ParallelPipeline`.
    pub worker_pool_size: usize,
    pub palette_size: usize,
    pub acceptance: AcceptancePredicate,
    pub track_birth: TrackBirthPolicy,
    /// Paint detected component borders onto the output frames.
    pub overlay_detections: bool,
    /// Upper bound for each join barrier of `ParallelPipeline`, in milliseconds.
    pub join_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            difference_threshold: 5,
            min_object_size: 10,
            background_step: 1,
            background_mode: BackgroundChannelMode::PerChannel,
            morphology: MorphologyConfig::default(),
            death_budget: 20,
            worker_pool_size: num_cpus::get(),
            palette_size: 8,
            acceptance: AcceptancePredicate::CandidateExtent,
            track_birth: TrackBirthPolicy::FirstFrameOnly,
            overlay_detections: false,
            join_timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let m = &self.morphology;
        for mask in [m.first_dilation, m.erosion, m.second_dilation, m.border_width] {
            validate_mask_size(mask)?;
        }
        if self.death_budget == 0 {
            return Err(VisionError::invalid("death budget must be at least one frame"));
        }
        if self.worker_pool_size == 0 {
            return Err(VisionError::invalid("worker pool needs at least one worker"));
        }
        if self.palette_size == 0 {
            return Err(VisionError::invalid("palette must hold at least one color"));
        }
        if let AcceptancePredicate::OwnExtent { factor } = self.acceptance {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(VisionError::invalid(format!(
                    "own-extent factor must be positive, got {factor}"
                )));
            }
        }
        if self.join_timeout_ms == Some(0) {
            return Err(VisionError::invalid("join timeout must be positive"));
        }
        Ok(())
    }

    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_ms.map(Duration::from_millis)
    }

    pub fn palette(&self) -> Result<Palette> {
        Palette::generate(self.palette_size)
    }
}

/// Summary of one track at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub id: u64,
    pub color: Pixel,
    pub state: TrackState,
    pub start_frame: usize,
    pub died_at: Option<usize>,
    pub path: Vec<Point>,
    pub observations: usize,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            color: track.color,
            state: track.state,
            start_frame: track.start_frame,
            died_at: track.died_at,
            path: track.path.clone(),
            observations: track.observations.len(),
        }
    }
}

/// The primary output of a run, next to the annotated frames left in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub frames: usize,
    /// Number of size-filtered candidates per frame, frame 1 first.
    pub candidates_per_frame: Vec<usize>,
    pub tracks: Vec<TrackSummary>,
}

impl Report {
    pub(crate) fn build(store: &SequenceStore, tracks: &[Track]) -> Result<Self> {
        let candidates_per_frame = store
            .indices()
            .map(|index| store.candidates(index).map(<[Rectangle]>::len))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            frames: store.len(),
            candidates_per_frame,
            tracks: tracks.iter().map(TrackSummary::from).collect(),
        })
    }
}

/// Sequential detection-to-tracking pipeline.
pub struct VisionPipeline {
    config: PipelineConfig,
    processor: FrameProcessor,
}

impl VisionPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            processor: FrameProcessor::new(config.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Phase 1: publishes the candidate list of every frame, in frame order.
    pub fn detect(&self, store: &SequenceStore) -> Result<()> {
        let mut background = store.background().clone();
        for index in store.indices() {
            self.processor.process_slot(store, index, &background)?;
            background = self.processor.next_background(&background, store.raw(index)?)?;
        }
        Ok(())
    }

    /// Phase 2a: frame-by-frame association over the published candidates.
    pub fn track(&self, store: &SequenceStore) -> Result<Vec<Track>> {
        Tracker::associate(store, &self.config)
    }

    /// Phase 2b: draws every track onto the output frames.
    pub fn render(&self, store: &SequenceStore, tracks: &[Track]) -> Result<()> {
        for track in tracks {
            renderer::render_track(store, track)?;
        }
        Ok(())
    }

    pub fn run(&self, store: &SequenceStore) -> Result<Report> {
        tracing::info!(frames = store.len(), "detection phase started");
        self.detect(store)?;
        let tracks = self.track(store)?;
        tracing::info!(tracks = tracks.len(), "tracking phase started");
        self.render(store, &tracks)?;
        Report::build(store, &tracks)
    }
}
