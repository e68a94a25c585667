// THEORY:
// The `SequenceStore` is the one shared structure of a run. It is built explicitly
// by the caller and handed (behind an `Arc`) to every stage; there is no global
// sequence state anywhere in the crate.
//
// Each `FrameSlot` has three parts with different sharing rules:
// 1.  **Raw frame**: immutable after construction, read by anyone.
// 2.  **Candidates**: published exactly once by the detection worker that owns the
//     slot (`OnceLock`), then read-only for the tracking phase. Reading a slot that was
//     never published is an error, which is how the join barrier between the two
//     phases is enforced.
// 3.  **Output frame**: starts as a copy of the raw frame and is annotated in place.
//     Several track render tasks can draw into the same frame, so each output buffer
//     sits behind its own `Mutex`.

use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::rectangle::Rectangle;
use crate::error::{Result, VisionError};
use std::sync::{Mutex, OnceLock};

#[derive(Debug)]
pub struct FrameSlot {
    index: usize,
    raw: PixelBuffer,
    candidates: OnceLock<Vec<Rectangle>>,
    output: Mutex<PixelBuffer>,
}

impl FrameSlot {
    fn new(index: usize, raw: PixelBuffer) -> Self {
        let output = Mutex::new(raw.clone());
        Self {
            index,
            raw,
            candidates: OnceLock::new(),
            output,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn raw(&self) -> &PixelBuffer {
        &self.raw
    }

    pub fn candidates(&self) -> Option<&[Rectangle]> {
        self.candidates.get().map(Vec::as_slice)
    }
}

#[derive(Debug)]
pub struct SequenceStore {
    background: PixelBuffer,
    slots: Vec<FrameSlot>,
}

impl SequenceStore {
    /// Builds a store from an initial background and frames 1..=N.
    pub fn new(background: PixelBuffer, frames: Vec<PixelBuffer>) -> Result<Self> {
        if frames.is_empty() {
            return Err(VisionError::invalid("a sequence needs at least one frame"));
        }
        for frame in &frames {
            background.ensure_same_dimensions(frame)?;
        }
        let slots = frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| FrameSlot::new(i + 1, frame))
            .collect();
        Ok(Self { background, slots })
    }

    /// Uses the first frame as the initial background and the rest as frames 1..=N-1.
    pub fn from_frames(mut frames: Vec<PixelBuffer>) -> Result<Self> {
        if frames.len() < 2 {
            return Err(VisionError::invalid(
                "a sequence without a separate background needs at least two frames",
            ));
        }
        let background = frames.remove(0);
        Self::new(background, frames)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.background.dimensions()
    }

    pub fn background(&self) -> &PixelBuffer {
        &self.background
    }

    /// Frame indices, 1-based and in order.
    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Result<&FrameSlot> {
        index
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .ok_or(VisionError::UnknownFrame(index))
    }

    pub fn raw(&self, index: usize) -> Result<&PixelBuffer> {
        self.slot(index).map(FrameSlot::raw)
    }

    /// Stores the candidate list of one frame. A slot accepts exactly one publication.
    pub fn publish_candidates(&self, index: usize, candidates: Vec<Rectangle>) -> Result<()> {
        self.slot(index)?
            .candidates
            .set(candidates)
            .map_err(|_| VisionError::AlreadyPublished(index))
    }

    pub fn candidates(&self, index: usize) -> Result<&[Rectangle]> {
        self.slot(index)?
            .candidates()
            .ok_or(VisionError::MissingCandidates(index))
    }

    /// Fails with `MissingCandidates` for the first slot that was never published.
    pub fn ensure_complete(&self) -> Result<()> {
        match self.slots.iter().find(|slot| slot.candidates.get().is_none()) {
            Some(slot) => Err(VisionError::MissingCandidates(slot.index)),
            None => Ok(()),
        }
    }

    /// Runs `draw` with exclusive access to one frame's output buffer.
    pub fn with_output<T>(&self, index: usize, draw: impl FnOnce(&mut PixelBuffer) -> T) -> Result<T> {
        let slot = self.slot(index)?;
        let mut output = slot
            .output
            .lock()
            .map_err(|_| VisionError::PoisonedFrame(index))?;
        Ok(draw(&mut output))
    }

    /// Copy of one frame's current output buffer.
    pub fn output_snapshot(&self, index: usize) -> Result<PixelBuffer> {
        self.with_output(index, |output| output.clone())
    }

    /// Consumes the store and yields the annotated frames in order.
    pub fn into_output_frames(self) -> Result<Vec<PixelBuffer>> {
        self.slots
            .into_iter()
            .map(|slot| {
                let index = slot.index;
                slot.output
                    .into_inner()
                    .map_err(|_| VisionError::PoisonedFrame(index))
            })
            .collect()
    }
}
