// THEORY:
// A `Rectangle` is the spatial summary of one connected component in one frame:
// the candidate object handed from detection to tracking. Like the other data
// containers it is "dumb": it knows its centroid and extent and how far it is from
// a point, but nothing about other frames.
//
// The extent (`side_x`, `side_y`) is the max-min span of the member coordinates,
// i.e. a component covering columns 10..=19 has `side_x == 9`. This is one less than
// the geometric width and is kept that way on purpose; `width()`/`height()` give
// the geometric values for drawing.

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A candidate object detected in a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    /// Integer-truncated mean of the member x coordinates.
    pub center_x: u32,
    /// Integer-truncated mean of the member y coordinates.
    pub center_y: u32,
    /// Span of member x coordinates (max - min).
    pub side_x: u32,
    /// Span of member y coordinates (max - min).
    pub side_y: u32,
    /// Set once a track adopts this rectangle in the frame it belongs to.
    pub claimed: bool,
}

impl Rectangle {
    pub fn new(center_x: u32, center_y: u32, side_x: u32, side_y: u32) -> Self {
        Self {
            center_x,
            center_y,
            side_x,
            side_y,
            claimed: false,
        }
    }

    /// Summarizes a non-empty set of member coordinates.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        let (mut sum_x, mut sum_y) = (0u64, 0u64);
        for point in points {
            min_x = min_x.min(point.x);
            max_x = max_x.max(point.x);
            min_y = min_y.min(point.y);
            max_y = max_y.max(point.y);
            sum_x += point.x as u64;
            sum_y += point.y as u64;
        }
        let count = points.len() as u64;
        Some(Self::new(
            (sum_x / count) as u32,
            (sum_y / count) as u32,
            max_x - min_x,
            max_y - min_y,
        ))
    }

    pub fn center(&self) -> Point {
        Point::new(self.center_x, self.center_y)
    }

    pub fn distance_to(&self, point: &Point) -> f64 {
        self.center().distance_to(point)
    }

    /// Noise rejection: both extents must reach `min_size`.
    pub fn meets_min_size(&self, min_size: u32) -> bool {
        self.side_x >= min_size && self.side_y >= min_size
    }

    /// Geometric width in pixels (`side_x + 1`).
    pub fn width(&self) -> u32 {
        self.side_x + 1
    }

    /// Geometric height in pixels (`side_y + 1`).
    pub fn height(&self) -> u32 {
        self.side_y + 1
    }

    /// Top-left corner of the box centered on the centroid, possibly negative.
    pub fn top_left(&self) -> (i64, i64) {
        (
            self.center_x as i64 - (self.side_x / 2) as i64,
            self.center_y as i64 - (self.side_y / 2) as i64,
        )
    }
}
