// Annotation drawing. Rectangles and path segments are drawn with `imageproc`
// directly on the `RgbaImage` inside a `PixelBuffer`; shapes that leave the frame are
// clipped. `render_track` is the per-track unit of the tracking phase: it touches
// one output frame at a time and only through the store's per-frame lock.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::rectangle::{Point, Rectangle};
use crate::core_modules::sequence_store::SequenceStore;
use crate::core_modules::tracker::Track;
use crate::error::Result;
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

/// Outlines `rectangle` centered on its centroid.
pub fn draw_rectangle(buffer: &mut PixelBuffer, rectangle: &Rectangle, color: Pixel) {
    let (left, top) = rectangle.top_left();
    let outline = Rect::at(left as i32, top as i32).of_size(rectangle.width(), rectangle.height());
    draw_hollow_rect_mut(buffer.as_rgba_image_mut(), outline, color.into());
}

/// Connects consecutive path points with line segments.
pub fn draw_path(buffer: &mut PixelBuffer, path: &[Point], color: Pixel) {
    if let [only] = path {
        // Nothing to connect; still mark where the track was. Clipped like segments.
        if buffer.contains(only.x as i64, only.y as i64) {
            buffer.put(only.x, only.y, color);
        }
        return;
    }
    for segment in path.windows(2) {
        draw_line_segment_mut(
            buffer.as_rgba_image_mut(),
            (segment[0].x as f32, segment[0].y as f32),
            (segment[1].x as f32, segment[1].y as f32),
            color.into(),
        );
    }
}

/// Draws every adopted rectangle of `track` onto its frame, then the full path onto
/// the final frame of the sequence.
pub fn render_track(store: &SequenceStore, track: &Track) -> Result<()> {
    for observation in &track.observations {
        store.with_output(observation.frame, |output| {
            draw_rectangle(output, &observation.rectangle, track.color)
        })?;
    }
    store.with_output(store.len(), |output| draw_path(output, &track.path, track.color))?;
    tracing::debug!(track = track.id, points = track.path.len(), "track rendered");
    Ok(())
}
