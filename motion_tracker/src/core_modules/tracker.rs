// THEORY:
// The `tracker` module is the heart of the behavioral layer. It gives detected
// rectangles an identity over time by associating each frame's candidates with the
// tracks alive before that frame.
//
// Key architectural principles:
// 1.  **Seeding**: tracks are born from the size-passing candidates of the first
//     observed frame. With `TrackBirthPolicy::EveryFrame`, candidates that no track
//     claimed in a later frame also start new tracks.
// 2.  **Nearest-neighbor association**: an active track looks for the candidate whose
//     center is closest to its own. Ties go to the candidate discovered first. The
//     nearest candidate is adopted only if the run's `AcceptancePredicate` holds.
// 3.  **Lifecycle**: adoption resets the death counter to the budget and extends the
//     path. Every miss decrements it; at zero the track is `Dead` for good, keeping
//     everything it recorded.
// 4.  **Centralized claims**: all active tracks compute their requests against the
//     frame's immutable candidate list first, then the claims are committed on a
//     per-frame working copy. No two tasks ever write the same `claimed` flag.

use crate::core_modules::palette::Palette;
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::rectangle::{Point, Rectangle};
use crate::core_modules::sequence_store::SequenceStore;
use crate::error::Result;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Active,
    Dead,
}

/// Decides whether a track may move to its nearest candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum AcceptancePredicate {
    /// The distance must be below both extents of the candidate.
    #[default]
    CandidateExtent,
    /// The distance must be below `factor` times the larger extent of the track's
    /// current rectangle.
    OwnExtent { factor: f64 },
}

impl AcceptancePredicate {
    pub fn accepts(&self, distance: f64, own: &Rectangle, candidate: &Rectangle) -> bool {
        match *self {
            AcceptancePredicate::CandidateExtent => {
                distance < candidate.side_x as f64 && distance < candidate.side_y as f64
            }
            AcceptancePredicate::OwnExtent { factor } => {
                distance < factor * own.side_x.max(own.side_y) as f64
            }
        }
    }
}

/// When new tracks may be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TrackBirthPolicy {
    /// Only objects present in the first frame are tracked.
    #[default]
    FirstFrameOnly,
    /// Unclaimed candidates of any frame start new tracks.
    EveryFrame,
}

/// A rectangle a track adopted, and the frame it was adopted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub frame: usize,
    pub rectangle: Rectangle,
}

/// Represents an object that is being tracked across multiple frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// A unique and persistent ID for this tracked object.
    pub id: u64,
    pub color: Pixel,
    /// The most recently adopted rectangle.
    pub rectangle: Rectangle,
    /// Centers of every adopted rectangle, oldest first.
    pub path: Vec<Point>,
    pub observations: Vec<Observation>,
    /// Remaining misses before the track dies.
    pub death_counter: u32,
    pub state: TrackState,
    pub start_frame: usize,
    /// Frame on which the death counter reached zero.
    pub died_at: Option<usize>,
}

impl Track {
    fn spawn(id: u64, color: Pixel, frame: usize, mut rectangle: Rectangle, budget: u32) -> Self {
        rectangle.claimed = true;
        Self {
            id,
            color,
            rectangle,
            path: vec![rectangle.center()],
            observations: vec![Observation { frame, rectangle }],
            death_counter: budget,
            state: TrackState::Active,
            start_frame: frame,
            died_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TrackState::Active
    }

    pub fn last_frame(&self) -> usize {
        self.observations.last().map_or(self.start_frame, |o| o.frame)
    }

    fn accept(&mut self, frame: usize, rectangle: Rectangle, budget: u32) {
        self.rectangle = rectangle;
        self.path.push(rectangle.center());
        self.observations.push(Observation { frame, rectangle });
        self.death_counter = budget;
    }

    fn reject(&mut self, frame: usize) {
        self.death_counter = self.death_counter.saturating_sub(1);
        if self.death_counter == 0 {
            self.state = TrackState::Dead;
            self.died_at = Some(frame);
        }
    }
}

/// Index of and distance to the size-passing candidate closest to `point`.
/// The first candidate wins ties.
pub fn nearest_candidate(point: &Point, candidates: &[Rectangle], min_size: u32) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if !candidate.meets_min_size(min_size) {
            continue;
        }
        let distance = candidate.distance_to(point);
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((i, distance));
        }
    }
    best
}

/// Manages the list of `Track`s from one frame to the next.
pub struct Tracker {
    tracks: Vec<Track>,
    next_id: u64,
    frames_observed: usize,
    palette: Palette,
    death_budget: u32,
    min_object_size: u32,
    acceptance: AcceptancePredicate,
    track_birth: TrackBirthPolicy,
}

impl Tracker {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tracks: Vec::new(),
            next_id: 0,
            frames_observed: 0,
            palette: config.palette()?,
            death_budget: config.death_budget,
            min_object_size: config.min_object_size,
            acceptance: config.acceptance,
            track_birth: config.track_birth,
        })
    }

    /// Runs association over every published frame of the store, in order.
    pub fn associate(store: &SequenceStore, config: &PipelineConfig) -> Result<Vec<Track>> {
        store.ensure_complete()?;
        let mut tracker = Tracker::new(config)?;
        for index in store.indices() {
            tracker.observe_frame(index, store.candidates(index)?);
        }
        let tracks = tracker.into_tracks();
        tracing::info!(
            tracks = tracks.len(),
            dead = tracks.iter().filter(|t| !t.is_active()).count(),
            "association finished"
        );
        Ok(tracks)
    }

    /// Advances every track by one frame and returns the frame's candidates with
    /// the claims made in it.
    pub fn observe_frame(&mut self, frame: usize, candidates: &[Rectangle]) -> Vec<Rectangle> {
        let mut working = candidates.to_vec();
        let seeding = self.frames_observed == 0;
        self.frames_observed += 1;

        if !seeding {
            let requests: Vec<(usize, Option<usize>)> = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(_, track)| track.is_active())
                .map(|(i, track)| (i, self.request(track, &working)))
                .collect();

            for (track_index, choice) in requests {
                let track = &mut self.tracks[track_index];
                match choice {
                    Some(candidate_index) => {
                        working[candidate_index].claimed = true;
                        track.accept(frame, working[candidate_index], self.death_budget);
                    }
                    None => {
                        track.reject(frame);
                        if !track.is_active() {
                            tracing::debug!(track = track.id, frame, "track died");
                        }
                    }
                }
            }
        }

        if seeding || self.track_birth == TrackBirthPolicy::EveryFrame {
            self.spawn_unclaimed(frame, &mut working);
        }
        working
    }

    fn request(&self, track: &Track, candidates: &[Rectangle]) -> Option<usize> {
        let (index, distance) = nearest_candidate(&track.rectangle.center(), candidates, self.min_object_size)?;
        self.acceptance
            .accepts(distance, &track.rectangle, &candidates[index])
            .then_some(index)
    }

    fn spawn_unclaimed(&mut self, frame: usize, working: &mut [Rectangle]) {
        for rectangle in working.iter_mut() {
            if rectangle.claimed || !rectangle.meets_min_size(self.min_object_size) {
                continue;
            }
            rectangle.claimed = true;
            let id = self.next_id;
            self.next_id += 1;
            if id == self.palette.len() as u64 {
                tracing::warn!(palette = self.palette.len(), "more tracks than palette colors, colors repeat");
            }
            let color = self.palette.color_for(id);
            tracing::debug!(track = id, frame, x = rectangle.center_x, y = rectangle.center_y, "track born");
            self.tracks
                .push(Track::spawn(id, color, frame, *rectangle, self.death_budget));
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }
}
