// THEORY:
// A `PixelBuffer` is the fixed-size 2D grid every other component reads and
// writes. It wraps an `image::RgbaImage` so that decode/encode collaborators and
// `imageproc` drawing routines can work on it directly, while the public accessors
// here enforce the grid invariant: every coordinate access lies inside
// [0, width) x [0, height), and out-of-range access is an error instead of a panic.
//
// Copies are deep: `Clone` duplicates the pixel storage, so a cloned buffer can be
// mutated without affecting the original.

use crate::core_modules::pixel::pixel::{Channel, Packed, Pixel};
use crate::error::{Result, VisionError};
use image::RgbaImage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Creates a transparent black buffer.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::filled(width, height, Pixel::new(0, 0, 0, 0))
    }

    /// Creates a buffer with every pixel set to `fill`.
    pub fn filled(width: u32, height: u32, fill: Pixel) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VisionError::invalid(format!(
                "dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, fill.into()),
        })
    }

    /// Wraps a decoded image. Fails on an empty image.
    pub fn from_rgba_image(image: RgbaImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::invalid("cannot wrap an empty image"));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width() as i64 && y < self.height() as i64
    }

    fn check(&self, x: u32, y: u32) -> Result<()> {
        if x < self.width() && y < self.height() {
            Ok(())
        } else {
            Err(VisionError::OutOfRange {
                x: x as i64,
                y: y as i64,
                width: self.width(),
                height: self.height(),
            })
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Result<Pixel> {
        self.check(x, y)?;
        Ok(self.at(x, y))
    }

    pub fn set(&mut self, x: u32, y: u32, pixel: Pixel) -> Result<()> {
        self.check(x, y)?;
        self.put(x, y, pixel);
        Ok(())
    }

    pub fn red(&self, x: u32, y: u32) -> Result<Channel> {
        self.get(x, y).map(|p| p.red)
    }

    pub fn green(&self, x: u32, y: u32) -> Result<Channel> {
        self.get(x, y).map(|p| p.green)
    }

    pub fn blue(&self, x: u32, y: u32) -> Result<Channel> {
        self.get(x, y).map(|p| p.blue)
    }

    pub fn alpha(&self, x: u32, y: u32) -> Result<Channel> {
        self.get(x, y).map(|p| p.alpha)
    }

    /// Sets an opaque color from wide channel values, validating each one.
    pub fn set_rgb_checked(&mut self, x: u32, y: u32, red: i64, green: i64, blue: i64) -> Result<()> {
        let pixel = Pixel::try_rgb(red, green, blue)?;
        self.set(x, y, pixel)
    }

    /// Packed `0xAARRGGBB` color at (x, y).
    pub fn get_argb(&self, x: u32, y: u32) -> Result<Packed> {
        self.get(x, y).map(|p| p.to_argb())
    }

    pub fn set_argb(&mut self, x: u32, y: u32, packed: Packed) -> Result<()> {
        self.set(x, y, Pixel::from_argb(packed))
    }

    /// Fails with `DimensionMismatch` unless both buffers have the same size.
    pub fn ensure_same_dimensions(&self, other: &PixelBuffer) -> Result<()> {
        if self.dimensions() == other.dimensions() {
            Ok(())
        } else {
            Err(VisionError::DimensionMismatch {
                left_width: self.width(),
                left_height: self.height(),
                right_width: other.width(),
                right_height: other.height(),
            })
        }
    }

    /// Number of pixels whose red channel equals `value`.
    pub fn count_red(&self, value: Channel) -> usize {
        self.image.pixels().filter(|p| p.0[0] == value).count()
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.image
    }

    pub(crate) fn as_rgba_image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.image
    }

    // Unchecked accessors for filters whose loops are already bounded by the dimensions.
    #[inline]
    pub(crate) fn at(&self, x: u32, y: u32) -> Pixel {
        Pixel::from(*self.image.get_pixel(x, y))
    }

    #[inline]
    pub(crate) fn put(&mut self, x: u32, y: u32, pixel: Pixel) {
        self.image.put_pixel(x, y, pixel.into());
    }

    #[inline]
    pub(crate) fn red_at(&self, x: u32, y: u32) -> Channel {
        self.image.get_pixel(x, y).0[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(PixelBuffer::new(0, 4), Err(VisionError::InvalidArgument(_))));
        assert!(matches!(PixelBuffer::new(4, 0), Err(VisionError::InvalidArgument(_))));
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut buffer = PixelBuffer::new(3, 2).unwrap();
        assert!(matches!(buffer.get(3, 0), Err(VisionError::OutOfRange { .. })));
        assert!(matches!(buffer.set(0, 2, Pixel::WHITE), Err(VisionError::OutOfRange { .. })));
        assert!(buffer.get(2, 1).is_ok());
    }

    #[test]
    fn checked_setter_validates_channels() {
        let mut buffer = PixelBuffer::new(2, 2).unwrap();
        assert!(buffer.set_rgb_checked(0, 0, 10, 20, 30).is_ok());
        assert_eq!(buffer.green(0, 0).unwrap(), 20);
        assert!(matches!(
            buffer.set_rgb_checked(0, 0, 10, 300, 30),
            Err(VisionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn clones_are_independent() {
        let original = PixelBuffer::filled(4, 4, Pixel::gray(7)).unwrap();
        let mut copy = original.clone();
        copy.set(1, 1, Pixel::WHITE).unwrap();
        assert_eq!(original.get(1, 1).unwrap(), Pixel::gray(7));
        assert_eq!(copy.get(1, 1).unwrap(), Pixel::WHITE);
    }

    #[test]
    fn packed_access_matches_channels() {
        let mut buffer = PixelBuffer::new(2, 2).unwrap();
        buffer.set_argb(1, 0, 0xFF102030).unwrap();
        assert_eq!(buffer.red(1, 0).unwrap(), 0x10);
        assert_eq!(buffer.blue(1, 0).unwrap(), 0x30);
        assert_eq!(buffer.get_argb(1, 0).unwrap(), 0xFF102030);
    }

    #[test]
    fn dimension_check_reports_both_sizes() {
        let a = PixelBuffer::new(4, 4).unwrap();
        let b = PixelBuffer::new(4, 5).unwrap();
        assert!(a.ensure_same_dimensions(&a.clone()).is_ok());
        assert!(matches!(
            a.ensure_same_dimensions(&b),
            Err(VisionError::DimensionMismatch { right_height: 5, .. })
        ));
    }
}
