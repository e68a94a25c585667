// Deterministic track colors. Hues are spread evenly around the color wheel at
// full saturation and value, and a track's color is `palette[id % size]`. Once more
// tracks are alive than the palette has entries, colors repeat.

use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{Result, VisionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Pixel>,
}

impl Palette {
    /// Generates `size` evenly spaced, fully saturated hues starting at red.
    pub fn generate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(VisionError::invalid("palette must hold at least one color"));
        }
        let colors = (0..size)
            .map(|i| hue_to_rgb(360.0 * i as f64 / size as f64))
            .collect();
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn color_for(&self, track_id: u64) -> Pixel {
        self.colors[(track_id % self.colors.len() as u64) as usize]
    }

    pub fn colors(&self) -> &[Pixel] {
        &self.colors
    }
}

fn hue_to_rgb(hue: f64) -> Pixel {
    let sector = hue / 60.0;
    let fraction = sector - sector.floor();
    let rising = (255.0 * fraction).round() as u8;
    let falling = 255 - rising;
    match sector.floor() as u32 % 6 {
        0 => Pixel::rgb(255, rising, 0),
        1 => Pixel::rgb(falling, 255, 0),
        2 => Pixel::rgb(0, 255, rising),
        3 => Pixel::rgb(0, falling, 255),
        4 => Pixel::rgb(rising, 0, 255),
        _ => Pixel::rgb(255, 0, falling),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_distinct_within_palette() {
        let palette = Palette::generate(8).unwrap();
        let colors = palette.colors();
        for i in 0..colors.len() {
            for j in i + 1..colors.len() {
                assert_ne!(colors[i], colors[j]);
            }
        }
        assert_eq!(colors[0], Pixel::RED);
    }

    #[test]
    fn colors_repeat_after_palette_size() {
        let palette = Palette::generate(6).unwrap();
        assert_eq!(palette.color_for(1), palette.color_for(7));
        assert_ne!(palette.color_for(1), palette.color_for(2));
        assert_eq!(palette.color_for(0), Pixel::RED);
        assert_eq!(palette.color_for(2), Pixel::rgb(0, 255, 0));
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(Palette::generate(5).unwrap(), Palette::generate(5).unwrap());
    }

    #[test]
    fn empty_palette_is_rejected() {
        assert!(Palette::generate(0).is_err());
    }
}
