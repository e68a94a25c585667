// THEORY:
// The `blob_detector` is the engine of the spatial grouping layer. It turns a
// border image (the output of `filters::draw_border`) into a list of candidate
// `Rectangle`s with classic connected-component labeling.
//
// Algorithm:
// 1.  **Row-major scan**: pixels are visited top to bottom, left to right. The
//     first unconsumed pixel of the mark color seeds a new component, so components
//     come out in discovery order.
// 2.  **Iterative flood fill**: the component is grown over its 8-connected
//     neighbors with an explicit stack. Large components only grow the heap-allocated
//     stack, never the call stack.
// 3.  **Consumption**: each pixel is repainted to the background color the moment it
//     is pushed, so it can be neither pushed twice nor re-seeded later.
// 4.  **Stateless utility**: the scan works on a private copy of the input; the
//     caller's buffer is left untouched.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::rectangle::{Point, Rectangle};

pub mod blob_detector {
    use super::*;

    const NEIGHBORS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    /// Finds every 8-connected component of `mark_color` pixels and summarizes
    /// each as a `Rectangle`, in row-major discovery order.
    pub fn extract_objects(img: &PixelBuffer, mark_color: Pixel, bg_color: Pixel) -> Vec<Rectangle> {
        let mut work = img.clone();
        let mut rectangles = Vec::new();

        if mark_color.same_color(&bg_color) {
            // Repainting would never consume anything.
            return rectangles;
        }

        for y in 0..work.height() {
            for x in 0..work.width() {
                if !work.at(x, y).same_color(&mark_color) {
                    continue;
                }
                let members = flood_fill(&mut work, Point::new(x, y), mark_color, bg_color);
                if let Some(rect) = Rectangle::from_points(&members) {
                    rectangles.push(rect);
                }
            }
        }

        rectangles
    }

    fn flood_fill(work: &mut PixelBuffer, seed: Point, mark_color: Pixel, bg_color: Pixel) -> Vec<Point> {
        let mut members = Vec::new();
        let mut stack = vec![seed];
        work.put(seed.x, seed.y, bg_color);

        while let Some(current) = stack.pop() {
            members.push(current);
            for (dx, dy) in NEIGHBORS {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if !work.contains(nx, ny) {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                if work.at(nx, ny).same_color(&mark_color) {
                    work.put(nx, ny, bg_color);
                    stack.push(Point::new(nx, ny));
                }
            }
        }

        members
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::extract_objects;
    use super::*;

    fn paint(buffer: &mut PixelBuffer, x0: u32, y0: u32, x1: u32, y1: u32, color: Pixel) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                buffer.set(x, y, color).unwrap();
            }
        }
    }

    #[test]
    fn finds_two_disjoint_squares() {
        let mut img = PixelBuffer::filled(100, 100, Pixel::gray(0)).unwrap();
        paint(&mut img, 10, 10, 19, 19, Pixel::gray(255));
        paint(&mut img, 50, 50, 59, 59, Pixel::gray(255));
        let before = img.clone();

        let rects = extract_objects(&img, Pixel::gray(255), Pixel::gray(0));

        assert_eq!(rects.len(), 2);
        assert_eq!((rects[0].center_x, rects[0].center_y), (14, 14));
        assert_eq!((rects[1].center_x, rects[1].center_y), (54, 54));
        assert!(rects.iter().all(|r| r.side_x == 9 && r.side_y == 9));
        assert_eq!(img, before);
    }

    #[test]
    fn diagonal_neighbors_are_connected() {
        let mut img = PixelBuffer::filled(10, 10, Pixel::BLACK).unwrap();
        for i in 0..6 {
            img.set(2 + i, 2 + i, Pixel::RED).unwrap();
        }
        let rects = extract_objects(&img, Pixel::RED, Pixel::WHITE);
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0], Rectangle::new(4, 4, 5, 5));
    }

    #[test]
    fn discovery_order_is_row_major() {
        let mut img = PixelBuffer::filled(40, 40, Pixel::BLACK).unwrap();
        paint(&mut img, 30, 5, 33, 8, Pixel::RED);
        paint(&mut img, 2, 20, 5, 23, Pixel::RED);
        paint(&mut img, 10, 6, 12, 9, Pixel::RED);
        let rects = extract_objects(&img, Pixel::RED, Pixel::BLACK);
        let centers: Vec<_> = rects.iter().map(|r| (r.center_x, r.center_y)).collect();
        assert_eq!(centers, vec![(31, 6), (11, 7), (3, 21)]);
    }

    #[test]
    fn large_component_does_not_overflow() {
        let img = PixelBuffer::filled(600, 600, Pixel::RED).unwrap();
        let rects = extract_objects(&img, Pixel::RED, Pixel::BLACK);
        assert_eq!(rects, vec![Rectangle::new(299, 299, 599, 599)]);
    }

    #[test]
    fn other_colors_are_ignored() {
        let mut img = PixelBuffer::filled(10, 10, Pixel::BLACK).unwrap();
        paint(&mut img, 1, 1, 3, 3, Pixel::WHITE);
        assert!(extract_objects(&img, Pixel::RED, Pixel::BLACK).is_empty());
    }
}
