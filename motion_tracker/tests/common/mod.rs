#![allow(dead_code)]

use motion_tracker::{Pixel, PixelBuffer};

pub const SKY: Pixel = Pixel::gray(20);
pub const OBJECT: Pixel = Pixel::rgb(230, 220, 210);

/// A flat scene with solid squares given as `(left, top, side)`.
pub fn scene(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> PixelBuffer {
    let mut buffer = PixelBuffer::filled(width, height, SKY).unwrap();
    for &(left, top, side) in squares {
        for y in top..top + side {
            for x in left..left + side {
                buffer.set(x, y, OBJECT).unwrap();
            }
        }
    }
    buffer
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
