// THEORY:
// The `Pixel` module is the most fundamental unit of the engine. A `Pixel` is a
// "dumb" data container for one RGBA color, used both as the value stored in a
// `PixelBuffer` cell and as the packed color handed to drawing and extraction
// routines (border color, mark color, track color).
//
// Key principles:
// 1) Byte channels: every channel is a `u8`, so a constructed `Pixel` is always
//    inside [0, 255]. Wide integers coming from configuration or callers go through
//    `Pixel::try_rgb`, which performs the range check.
// 2) Single-pixel scope: heuristics here (the gray average, packing) never read
//    neighbors or history. Anything spatial lives in `filters`.

pub mod pixel {
    use crate::error::{channel_value, Result, VisionError};

    pub type Channel = u8;
    pub type Packed = u32;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Default for Pixel {
        fn default() -> Self {
            Pixel::BLACK
        }
    }

    impl Pixel {
        pub const BLACK: Pixel = Pixel::rgb(0, 0, 0);
        pub const WHITE: Pixel = Pixel::rgb(255, 255, 255);
        pub const RED: Pixel = Pixel::rgb(255, 0, 0);

        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// An opaque color.
        pub const fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel::new(red, green, blue, 255)
        }

        /// An opaque gray level with every color channel set to `value`.
        pub const fn gray(value: Channel) -> Self {
            Pixel::rgb(value, value, value)
        }

        /// Builds an opaque color from wide integers, rejecting any channel outside [0, 255].
        pub fn try_rgb(red: i64, green: i64, blue: i64) -> Result<Self> {
            Ok(Pixel::rgb(
                channel_value(red)?,
                channel_value(green)?,
                channel_value(blue)?,
            ))
        }

        /// Builds a color from wide integers including alpha.
        pub fn try_argb(alpha: i64, red: i64, green: i64, blue: i64) -> Result<Self> {
            Ok(Pixel::new(
                channel_value(red)?,
                channel_value(green)?,
                channel_value(blue)?,
                channel_value(alpha)?,
            ))
        }

        /// Integer mean of the three color channels, ⌊(R+G+B)/3⌋.
        pub fn gray_level(&self) -> Channel {
            ((self.red as u16 + self.green as u16 + self.blue as u16) / 3) as Channel
        }

        /// Whether the color channels match, ignoring alpha.
        pub fn same_color(&self, other: &Pixel) -> bool {
            self.red == other.red && self.green == other.green && self.blue == other.blue
        }

        /// Packs the pixel as `0xAARRGGBB`.
        pub fn to_argb(&self) -> Packed {
            (self.alpha as Packed) << 24
                | (self.red as Packed) << 16
                | (self.green as Packed) << 8
                | self.blue as Packed
        }

        /// Unpacks a `0xAARRGGBB` value.
        pub fn from_argb(packed: Packed) -> Self {
            Pixel::new(
                ((packed >> 16) & 0xFF) as Channel,
                ((packed >> 8) & 0xFF) as Channel,
                (packed & 0xFF) as Channel,
                ((packed >> 24) & 0xFF) as Channel,
            )
        }
    }

    impl TryFrom<&[u8]> for Pixel {
        type Error = VisionError;

        /// Reads an RGBA quadruple; a 3-byte slice is treated as opaque RGB.
        fn try_from(bytes: &[u8]) -> Result<Self> {
            match *bytes {
                [red, green, blue] => Ok(Pixel::rgb(red, green, blue)),
                [red, green, blue, alpha] => Ok(Pixel::new(red, green, blue, alpha)),
                _ => Err(VisionError::invalid(format!(
                    "a pixel needs 3 or 4 bytes, got {}",
                    bytes.len()
                ))),
            }
        }
    }

    impl From<image::Rgba<u8>> for Pixel {
        fn from(value: image::Rgba<u8>) -> Self {
            let [red, green, blue, alpha] = value.0;
            Pixel::new(red, green, blue, alpha)
        }
    }

    impl From<Pixel> for image::Rgba<u8> {
        fn from(value: Pixel) -> Self {
            image::Rgba([value.red, value.green, value.blue, value.alpha])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::Pixel;

    #[test]
    fn argb_packing_round_trips_channels() {
        let p = Pixel::new(12, 34, 56, 78);
        assert_eq!(p.to_argb(), 0x4E0C2238);
        assert_eq!(Pixel::from_argb(0x4E0C2238), p);
    }

    #[test]
    fn gray_level_truncates_mean() {
        assert_eq!(Pixel::rgb(255, 255, 254).gray_level(), 254);
        assert_eq!(Pixel::rgb(1, 1, 0).gray_level(), 0);
    }

    #[test]
    fn try_rgb_rejects_wide_values() {
        assert!(Pixel::try_rgb(0, 128, 255).is_ok());
        assert!(Pixel::try_rgb(0, 256, 0).is_err());
        assert!(Pixel::try_argb(-3, 0, 0, 0).is_err());
    }

    #[test]
    fn byte_slices_need_three_or_four_channels() {
        assert_eq!(Pixel::try_from(&[1u8, 2, 3][..]).unwrap(), Pixel::rgb(1, 2, 3));
        assert_eq!(Pixel::try_from(&[1u8, 2, 3, 4][..]).unwrap(), Pixel::new(1, 2, 3, 4));
        for bad in [&[][..], &[1u8][..], &[1u8, 2][..], &[1u8, 2, 3, 4, 5][..]] {
            assert!(matches!(
                Pixel::try_from(bad),
                Err(crate::error::VisionError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn same_color_ignores_alpha() {
        assert!(Pixel::new(1, 2, 3, 0).same_color(&Pixel::rgb(1, 2, 3)));
        assert!(!Pixel::rgb(1, 2, 3).same_color(&Pixel::rgb(1, 2, 4)));
    }
}
