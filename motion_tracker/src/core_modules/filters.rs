// THEORY:
// The `filters` module is the image-processing toolbox of the detection layer.
// Every function here is pure: the input buffers are borrowed immutably and a new
// `PixelBuffer` is returned. Nothing is cached between calls, which is what lets the
// frame workers run these transforms on different frames at the same time.
//
// Conventions shared by every filter:
// 1.  **Binarized images** use a foreground channel value `fg` and a background
//     value `bg`, painted as opaque grays. Tests for "is this pixel foreground" look at
//     the red channel only, exactly as `binarize` writes it.
// 2.  **Masks** are square structuring elements of odd size >= 1. The margin of
//     `mask_size / 2` pixels along every border is never processed: morphological
//     results there are always `bg`, never copied from the source.
// 3.  **Multi-input filters** require equal dimensions and fail with
//     `DimensionMismatch` otherwise.

use crate::core_modules::pixel::pixel::{Channel, Pixel};
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{validate_mask_size, Result, VisionError};

/// How `adaptive_background_step` computes each channel's delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackgroundChannelMode {
    /// Each channel moves toward its own destination value.
    #[default]
    PerChannel,
    /// Green takes its step magnitude and blue takes its step direction from the
    /// destination's red channel. Results are clamped to [0, 255].
    CrossedRed,
}

/// Replaces every color channel with ⌊(R+G+B)/3⌋.
pub fn grayscale(img: &PixelBuffer) -> PixelBuffer {
    let mut result = img.clone();
    for pixel in result.as_rgba_image_mut().pixels_mut() {
        let gray = Pixel::from(*pixel).gray_level();
        *pixel = Pixel::gray(gray).into();
    }
    result
}

/// Per-channel absolute difference |a - b|.
pub fn difference(a: &PixelBuffer, b: &PixelBuffer) -> Result<PixelBuffer> {
    a.ensure_same_dimensions(b)?;
    let mut result = a.clone();
    for (x, y, pixel) in result.as_rgba_image_mut().enumerate_pixels_mut() {
        let left = Pixel::from(*pixel);
        let right = b.at(x, y);
        *pixel = Pixel::rgb(
            left.red.abs_diff(right.red),
            left.green.abs_diff(right.green),
            left.blue.abs_diff(right.blue),
        )
        .into();
    }
    Ok(result)
}

/// Two-level image: `fg` where the red channel exceeds `threshold`, `bg` elsewhere.
pub fn binarize(img: &PixelBuffer, threshold: Channel, bg: Channel, fg: Channel) -> PixelBuffer {
    let mut result = img.clone();
    for pixel in result.as_rgba_image_mut().pixels_mut() {
        let value = if pixel.0[0] > threshold { fg } else { bg };
        *pixel = Pixel::gray(value).into();
    }
    result
}

#[inline]
fn move_towards(source: Channel, magnitude_target: Channel, sign_target: Channel, step: Channel) -> Channel {
    let magnitude = (magnitude_target as i16 - source as i16).abs().min(step as i16);
    let direction = (sign_target as i16 - source as i16).signum();
    (source as i16 + magnitude * direction).clamp(0, 255) as Channel
}

/// Moves `src` toward `dst` by at most `step` per channel:
/// `src + min(|dst - src|, step) * sign(dst - src)`.
pub fn adaptive_background_step(
    src: &PixelBuffer,
    dst: &PixelBuffer,
    step: Channel,
    mode: BackgroundChannelMode,
) -> Result<PixelBuffer> {
    src.ensure_same_dimensions(dst)?;
    let mut result = src.clone();
    for (x, y, pixel) in result.as_rgba_image_mut().enumerate_pixels_mut() {
        let s = Pixel::from(*pixel);
        let d = dst.at(x, y);
        let moved = match mode {
            BackgroundChannelMode::PerChannel => Pixel::rgb(
                move_towards(s.red, d.red, d.red, step),
                move_towards(s.green, d.green, d.green, step),
                move_towards(s.blue, d.blue, d.blue, step),
            ),
            BackgroundChannelMode::CrossedRed => Pixel::rgb(
                move_towards(s.red, d.red, d.red, step),
                move_towards(s.green, d.red, d.green, step),
                move_towards(s.blue, d.blue, d.red, step),
            ),
        };
        *pixel = moved.into();
    }
    Ok(result)
}

/// Shrinks foreground regions: an interior pixel stays `fg` only when its whole
/// `mask_size` neighborhood is `fg`.
pub fn erosion(img: &PixelBuffer, fg: Channel, bg: Channel, mask_size: usize) -> Result<PixelBuffer> {
    validate_mask_size(mask_size)?;
    let (width, height) = img.dimensions();
    let mut result = PixelBuffer::filled(width, height, Pixel::gray(bg))?;
    let radius = (mask_size / 2) as u32;

    for y in radius..height.saturating_sub(radius) {
        for x in radius..width.saturating_sub(radius) {
            let inside = (y - radius..=y + radius)
                .all(|ny| (x - radius..=x + radius).all(|nx| img.red_at(nx, ny) == fg));
            if inside {
                result.put(x, y, Pixel::gray(fg));
            }
        }
    }
    Ok(result)
}

/// Grows foreground regions: every interior `fg` pixel paints its whole
/// `mask_size` neighborhood `fg`.
pub fn dilation(img: &PixelBuffer, fg: Channel, bg: Channel, mask_size: usize) -> Result<PixelBuffer> {
    validate_mask_size(mask_size)?;
    let (width, height) = img.dimensions();
    let mut result = PixelBuffer::filled(width, height, Pixel::gray(bg))?;
    let radius = (mask_size / 2) as u32;
    let paint = Pixel::gray(fg);

    for y in radius..height.saturating_sub(radius) {
        for x in radius..width.saturating_sub(radius) {
            if img.red_at(x, y) != fg {
                continue;
            }
            for ny in y - radius..=y + radius {
                for nx in x - radius..=x + radius {
                    result.put(nx, ny, paint);
                }
            }
        }
    }
    Ok(result)
}

/// Outlines the foreground: `dilation(img, width)` minus `img`, with the ring
/// re-painted in `color`.
pub fn draw_border(
    img: &PixelBuffer,
    fg: Channel,
    bg: Channel,
    width: usize,
    color: Pixel,
) -> Result<PixelBuffer> {
    let dilated = dilation(img, fg, bg, width)?;
    let mut result = difference(&dilated, img)?;
    for pixel in result.as_rgba_image_mut().pixels_mut() {
        if pixel.0[0] == fg {
            *pixel = color.into();
        }
    }
    Ok(result)
}

/// Local-threshold binarization for unevenly lit scenes. A pixel becomes `fg`
/// when its red channel exceeds `mean + k * stddev` of the surrounding
/// `mask_size` window. The border margin stays `bg`.
pub fn local_binarize(
    img: &PixelBuffer,
    mask_size: usize,
    k: f64,
    bg: Channel,
    fg: Channel,
) -> Result<PixelBuffer> {
    validate_mask_size(mask_size)?;
    if !k.is_finite() {
        return Err(VisionError::invalid(format!("local threshold factor must be finite, got {k}")));
    }
    let (width, height) = img.dimensions();
    let mut result = PixelBuffer::filled(width, height, Pixel::gray(bg))?;
    let radius = (mask_size / 2) as u32;

    // Summed-area tables over the red channel and its square, one row/column of padding.
    let stride = width as usize + 1;
    let mut sums = vec![0u64; stride * (height as usize + 1)];
    let mut squares = vec![0u64; stride * (height as usize + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        let mut row_squares = 0u64;
        for x in 0..width {
            let value = img.red_at(x, y) as u64;
            row_sum += value;
            row_squares += value * value;
            let i = (y as usize + 1) * stride + x as usize + 1;
            sums[i] = sums[i - stride] + row_sum;
            squares[i] = squares[i - stride] + row_squares;
        }
    }
    let window = |table: &[u64], x0: usize, y0: usize, x1: usize, y1: usize| -> u64 {
        table[y1 * stride + x1] + table[y0 * stride + x0] - table[y0 * stride + x1] - table[y1 * stride + x0]
    };

    let count = (mask_size * mask_size) as f64;
    for y in radius..height.saturating_sub(radius) {
        for x in radius..width.saturating_sub(radius) {
            let (x0, y0) = ((x - radius) as usize, (y - radius) as usize);
            let (x1, y1) = ((x + radius + 1) as usize, (y + radius + 1) as usize);
            let mean = window(&sums, x0, y0, x1, y1) as f64 / count;
            let variance = window(&squares, x0, y0, x1, y1) as f64 / count - mean * mean;
            let threshold = mean + k * variance.max(0.0).sqrt();
            if img.red_at(x, y) as f64 > threshold {
                result.put(x, y, Pixel::gray(fg));
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FG: Channel = 255;
    const BG: Channel = 0;

    // Deterministic pseudo-random color image.
    fn noisy(width: u32, height: u32, seed: u32) -> PixelBuffer {
        let mut buffer = PixelBuffer::new(width, height).unwrap();
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        for y in 0..height {
            for x in 0..width {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let [r, g, b, _] = state.to_le_bytes();
                buffer.set(x, y, Pixel::rgb(r, g, b)).unwrap();
            }
        }
        buffer
    }

    fn binary_noise(width: u32, height: u32, seed: u32) -> PixelBuffer {
        binarize(&grayscale(&noisy(width, height, seed)), 110, BG, FG)
    }

    fn fg_pixels(img: &PixelBuffer) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for y in 0..img.height() {
            for x in 0..img.width() {
                if img.red_at(x, y) == FG {
                    out.push((x, y));
                }
            }
        }
        out
    }

    fn square(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(width, height, Pixel::gray(BG)).unwrap();
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                buffer.set(x, y, Pixel::gray(FG)).unwrap();
            }
        }
        buffer
    }

    #[test]
    fn grayscale_is_idempotent() {
        for seed in 0..4 {
            let once = grayscale(&noisy(17, 11, seed));
            assert_eq!(grayscale(&once), once);
        }
    }

    #[test]
    fn grayscale_uses_truncated_mean() {
        let buffer = PixelBuffer::filled(1, 1, Pixel::rgb(10, 20, 31)).unwrap();
        assert_eq!(grayscale(&buffer).get(0, 0).unwrap(), Pixel::gray(20));
    }

    #[test]
    fn difference_with_itself_is_zero() {
        let img = noisy(13, 9, 7);
        let diff = difference(&img, &img).unwrap();
        assert!(diff
            .as_rgba_image()
            .pixels()
            .all(|p| p.0[0] == 0 && p.0[1] == 0 && p.0[2] == 0));
    }

    #[test]
    fn difference_is_absolute_per_channel() {
        let a = PixelBuffer::filled(1, 1, Pixel::rgb(10, 200, 50)).unwrap();
        let b = PixelBuffer::filled(1, 1, Pixel::rgb(30, 100, 50)).unwrap();
        assert_eq!(difference(&a, &b).unwrap().get(0, 0).unwrap(), Pixel::rgb(20, 100, 0));
    }

    #[test]
    fn difference_rejects_mismatched_sizes() {
        let a = PixelBuffer::new(4, 4).unwrap();
        let b = PixelBuffer::new(5, 4).unwrap();
        assert!(matches!(difference(&a, &b), Err(VisionError::DimensionMismatch { .. })));
    }

    #[test]
    fn binarize_produces_exactly_two_values() {
        let out = binarize(&noisy(20, 20, 3), 100, 17, 201);
        assert!(out
            .as_rgba_image()
            .pixels()
            .all(|p| (p.0[0] == 17 || p.0[0] == 201) && p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn background_step_converges_without_overshoot() {
        let src = PixelBuffer::filled(1, 1, Pixel::rgb(10, 200, 90)).unwrap();
        let dst = PixelBuffer::filled(1, 1, Pixel::rgb(50, 180, 90)).unwrap();
        let mut current = src;
        for call in 1..=40u8 {
            current = adaptive_background_step(&current, &dst, 1, BackgroundChannelMode::PerChannel).unwrap();
            let red = current.red(0, 0).unwrap();
            assert_eq!(red, 10 + call);
            assert!(current.green(0, 0).unwrap() >= 180);
        }
        assert_eq!(current.get(0, 0).unwrap(), Pixel::rgb(50, 180, 90));
        let again = adaptive_background_step(&current, &dst, 1, BackgroundChannelMode::PerChannel).unwrap();
        assert_eq!(again, current);
    }

    #[test]
    fn background_step_takes_large_steps_up_to_target() {
        let src = PixelBuffer::filled(1, 1, Pixel::rgb(0, 255, 100)).unwrap();
        let dst = PixelBuffer::filled(1, 1, Pixel::rgb(255, 0, 103)).unwrap();
        let out = adaptive_background_step(&src, &dst, 10, BackgroundChannelMode::PerChannel).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), Pixel::rgb(10, 245, 103));
    }

    #[test]
    fn crossed_mode_borrows_red_channel() {
        // dst green equals src green, but |dst.red - src.green| is large: only the
        // sign comes from green, so green must not move.
        let src = PixelBuffer::filled(1, 1, Pixel::rgb(0, 100, 100)).unwrap();
        let dst = PixelBuffer::filled(1, 1, Pixel::rgb(200, 100, 50)).unwrap();
        let per_channel = adaptive_background_step(&src, &dst, 5, BackgroundChannelMode::PerChannel).unwrap();
        let crossed = adaptive_background_step(&src, &dst, 5, BackgroundChannelMode::CrossedRed).unwrap();
        assert_eq!(per_channel.get(0, 0).unwrap(), Pixel::rgb(5, 100, 95));
        // Blue moves in the direction of dst.red - src.blue (upwards).
        assert_eq!(crossed.get(0, 0).unwrap(), Pixel::rgb(5, 100, 105));
    }

    #[test]
    fn morphology_rejects_even_or_zero_masks() {
        let img = square(10, 10, 3, 3, 3);
        assert!(matches!(erosion(&img, FG, BG, 4), Err(VisionError::InvalidArgument(_))));
        assert!(matches!(dilation(&img, FG, BG, 0), Err(VisionError::InvalidArgument(_))));
        assert!(matches!(local_binarize(&img, 2, 0.5, BG, FG), Err(VisionError::InvalidArgument(_))));
    }

    #[test]
    fn erosion_is_subset_and_dilation_is_superset() {
        for seed in 0..3 {
            let img = binary_noise(30, 24, seed);
            let radius = 1;
            let eroded = erosion(&img, FG, BG, 3).unwrap();
            let dilated = dilation(&img, FG, BG, 3).unwrap();
            for (x, y) in fg_pixels(&eroded) {
                assert_eq!(img.red_at(x, y), FG);
            }
            for (x, y) in fg_pixels(&img) {
                if x >= radius && y >= radius && x < img.width() - radius && y < img.height() - radius {
                    assert_eq!(dilated.red_at(x, y), FG);
                }
            }
        }
    }

    #[test]
    fn erosion_after_dilation_never_exceeds_dilation() {
        for seed in 0..3 {
            let img = binary_noise(40, 40, seed + 11);
            for mask in [1, 3, 5] {
                let dilated = dilation(&img, FG, BG, mask).unwrap();
                let closed = erosion(&dilated, FG, BG, mask).unwrap();
                assert!(closed.count_red(FG) <= dilated.count_red(FG));
            }
        }
    }

    #[test]
    fn border_margin_is_background() {
        let img = PixelBuffer::filled(9, 9, Pixel::gray(FG)).unwrap();
        let eroded = erosion(&img, FG, BG, 5).unwrap();
        assert_eq!(eroded.red_at(0, 0), BG);
        assert_eq!(eroded.red_at(1, 4), BG);
        assert_eq!(eroded.red_at(2, 2), FG);
        assert_eq!(eroded.count_red(FG), 25);
    }

    #[test]
    fn mask_of_one_is_identity_inside() {
        let img = binary_noise(12, 12, 5);
        assert_eq!(erosion(&img, FG, BG, 1).unwrap(), img);
        assert_eq!(dilation(&img, FG, BG, 1).unwrap(), img);
    }

    #[test]
    fn dilation_grows_square_by_radius() {
        let img = square(30, 30, 10, 10, 5);
        let dilated = dilation(&img, FG, BG, 3).unwrap();
        assert_eq!(dilated.count_red(FG), 7 * 7);
        let restored = erosion(&dilated, FG, BG, 3).unwrap();
        assert_eq!(restored, img);
    }

    #[test]
    fn draw_border_paints_outer_ring() {
        let img = square(20, 20, 5, 5, 4);
        let border = draw_border(&img, FG, BG, 3, Pixel::RED).unwrap();
        let ring: Vec<_> = border
            .as_rgba_image()
            .enumerate_pixels()
            .filter(|(_, _, p)| Pixel::from(**p).same_color(&Pixel::RED))
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(ring.len(), 6 * 6 - 4 * 4);
        assert!(ring.iter().all(|&(x, y)| x == 4 || x == 9 || y == 4 || y == 9));
        assert_eq!(border.get(6, 6).unwrap(), Pixel::BLACK);
    }

    #[test]
    fn local_binarize_finds_spot_on_gradient() {
        let mut img = PixelBuffer::new(30, 30).unwrap();
        for y in 0..30 {
            for x in 0..30 {
                img.set(x, y, Pixel::gray((x * 4) as u8)).unwrap();
            }
        }
        img.set(15, 15, Pixel::gray(250)).unwrap();
        let out = local_binarize(&img, 5, 1.0, BG, FG).unwrap();
        assert_eq!(out.red_at(15, 15), FG);
        assert_eq!(out.red_at(5, 5), BG);
        assert_eq!(out.red_at(0, 15), BG);
    }
}
