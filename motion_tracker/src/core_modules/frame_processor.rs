// THEORY:
// The `FrameProcessor` is the unit of per-frame parallelism. Given the background
// that was current before frame i and frame i itself, it runs the whole detection
// chain and produces frame i's candidate list:
//
//   difference(grayscale(background), grayscale(frame))
//     → binarize(threshold)
//     → dilation → erosion → dilation   (fill holes, drop speckle, restore size)
//     → draw_border
//     → extract_objects, minus anything smaller than `min_object_size`
//
// The background update is a separate call (`next_background`): each
// background depends on the previous one, so the chain of backgrounds is walked
// sequentially by the caller while `detect` calls for earlier frames can already run
// elsewhere. A processor holds only configuration and can be cloned into workers.

use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::filters;
use crate::core_modules::pixel::pixel::{Channel, Pixel};
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::rectangle::Rectangle;
use crate::core_modules::sequence_store::SequenceStore;
use crate::error::Result;
use crate::pipeline::PipelineConfig;

const FOREGROUND: Channel = 255;
const BACKGROUND: Channel = 0;
/// Color of the component outlines produced by `draw_border`.
pub const BORDER_COLOR: Pixel = Pixel::RED;

/// Everything detection produced for a single frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub candidates: Vec<Rectangle>,
    /// The outline image the candidates were extracted from.
    pub borders: PixelBuffer,
}

#[derive(Debug, Clone)]
pub struct FrameProcessor {
    config: PipelineConfig,
}

impl FrameProcessor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs the detection chain for one frame against the background preceding it.
    pub fn detect(&self, background: &PixelBuffer, frame: &PixelBuffer) -> Result<Detection> {
        let diff = filters::difference(&filters::grayscale(background), &filters::grayscale(frame))?;
        let mask = filters::binarize(&diff, self.config.difference_threshold, BACKGROUND, FOREGROUND);

        let m = &self.config.morphology;
        let mask = filters::dilation(&mask, FOREGROUND, BACKGROUND, m.first_dilation)?;
        let mask = filters::erosion(&mask, FOREGROUND, BACKGROUND, m.erosion)?;
        let mask = filters::dilation(&mask, FOREGROUND, BACKGROUND, m.second_dilation)?;

        let borders = filters::draw_border(&mask, FOREGROUND, BACKGROUND, m.border_width, BORDER_COLOR)?;
        let candidates = blob_detector::extract_objects(&borders, BORDER_COLOR, Pixel::WHITE)
            .into_iter()
            .filter(|rect| rect.meets_min_size(self.config.min_object_size))
            .collect();

        Ok(Detection { candidates, borders })
    }

    /// The background that follows `background` once `frame` has been seen.
    pub fn next_background(&self, background: &PixelBuffer, frame: &PixelBuffer) -> Result<PixelBuffer> {
        filters::adaptive_background_step(
            background,
            frame,
            self.config.background_step,
            self.config.background_mode,
        )
    }

    /// Detects frame `index` and publishes its candidates into the store. Only the
    /// slot at `index` is written. Returns the number of published candidates.
    pub fn process_slot(&self, store: &SequenceStore, index: usize, background: &PixelBuffer) -> Result<usize> {
        let detection = self.detect(background, store.raw(index)?)?;
        let count = detection.candidates.len();

        if self.config.overlay_detections {
            store.with_output(index, |output| overlay_borders(output, &detection.borders))?;
        }
        store.publish_candidates(index, detection.candidates)?;

        tracing::debug!(frame = index, candidates = count, "frame processed");
        Ok(count)
    }
}

fn overlay_borders(output: &mut PixelBuffer, borders: &PixelBuffer) {
    let (width, height) = borders.dimensions();
    for y in 0..height {
        for x in 0..width {
            if borders.at(x, y).same_color(&BORDER_COLOR) {
                output.put(x, y, BORDER_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(width, height, Pixel::gray(20)).unwrap();
        for &(x0, y0, side) in squares {
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    buffer.set(x, y, Pixel::rgb(230, 220, 210)).unwrap();
                }
            }
        }
        buffer
    }

    #[test]
    fn detects_a_square_as_its_border_ring() {
        let processor = FrameProcessor::new(PipelineConfig::default());
        let background = scene(100, 100, &[]);
        let frame = scene(100, 100, &[(20, 30, 20)]);

        let detection = processor.detect(&background, &frame).unwrap();

        // The 20x20 square survives the cleanup unchanged and is outlined one pixel outside.
        assert_eq!(detection.candidates, vec![Rectangle::new(29, 39, 21, 21)]);
    }

    #[test]
    fn static_scene_has_no_candidates() {
        let processor = FrameProcessor::new(PipelineConfig::default());
        let frame = scene(60, 60, &[(20, 20, 15)]);
        let detection = processor.detect(&frame, &frame).unwrap();
        assert!(detection.candidates.is_empty());
        assert!(detection
            .borders
            .as_rgba_image()
            .pixels()
            .all(|p| !Pixel::from(*p).same_color(&BORDER_COLOR)));
    }

    #[test]
    fn small_objects_are_rejected_as_noise() {
        let config = PipelineConfig {
            min_object_size: 30,
            ..PipelineConfig::default()
        };
        let processor = FrameProcessor::new(config);
        let detection = processor
            .detect(&scene(100, 100, &[]), &scene(100, 100, &[(20, 20, 20)]))
            .unwrap();
        assert!(detection.candidates.is_empty());
    }

    #[test]
    fn speckle_noise_is_removed() {
        let processor = FrameProcessor::new(PipelineConfig::default());
        let mut frame = scene(80, 80, &[]);
        for (x, y) in [(10, 10), (40, 12), (60, 70), (33, 50)] {
            frame.set(x, y, Pixel::WHITE).unwrap();
        }
        let detection = processor.detect(&scene(80, 80, &[]), &frame).unwrap();
        assert!(detection.candidates.is_empty());
    }

    #[test]
    fn process_slot_publishes_and_overlays() {
        let config = PipelineConfig {
            overlay_detections: true,
            ..PipelineConfig::default()
        };
        let processor = FrameProcessor::new(config);
        let background = scene(100, 100, &[]);
        let store = SequenceStore::new(background.clone(), vec![scene(100, 100, &[(40, 40, 20)])]).unwrap();

        assert_eq!(processor.process_slot(&store, 1, &background).unwrap(), 1);
        assert_eq!(store.candidates(1).unwrap().len(), 1);
        let output = store.output_snapshot(1).unwrap();
        assert_eq!(output.get(39, 45).unwrap(), BORDER_COLOR);
        assert_eq!(output.get(45, 45).unwrap(), Pixel::rgb(230, 220, 210));
    }

    #[test]
    fn background_follows_frame_one_step_at_a_time() {
        let processor = FrameProcessor::new(PipelineConfig::default());
        let background = PixelBuffer::filled(4, 4, Pixel::gray(10)).unwrap();
        let frame = PixelBuffer::filled(4, 4, Pixel::gray(200)).unwrap();
        let next = processor.next_background(&background, &frame).unwrap();
        assert_eq!(next.get(2, 2).unwrap(), Pixel::gray(11));
    }
}
