use crate::foundation::core::{FRAME_BYTES, PIXELS};
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::bitmap::Frame;

/// Rec. 709 luma weights scaled by 10_000 so the 8-bit path stays in integers.
const LUMA_R: u32 = 2126;
const LUMA_G: u32 = 7152;
const LUMA_B: u32 = 722;

/// Pixel output of a backend before it is quantized to the canonical frame.
#[derive(Clone, Debug)]
pub enum NativePixels {
    /// Already in canonical packed layout.
    Packed(Box<[u8; FRAME_BYTES]>),
    /// One on/off entry per pixel, row-major.
    Mask(Vec<bool>),
    /// Premultiplied RGBA8, row-major, 4 bytes per pixel.
    Rgba8Premul(Vec<u8>),
    /// Straight RGBA in `[0, 1]`, row-major. Alpha is ignored.
    RgbaF32(Vec<[f32; 4]>),
}

/// Quantize native pixels into a [`Frame`].
///
/// A pixel is on iff its Rec. 709 luminance, composited over black, is at least half of the
/// representable range. The rule is the same for every backend.
pub fn encode(native: &NativePixels) -> RiterResult<Frame> {
    match native {
        NativePixels::Packed(bytes) => Ok(Frame::from_bytes(**bytes)),
        NativePixels::Mask(mask) => Frame::from_mask(mask),
        NativePixels::Rgba8Premul(data) => {
            if data.len() != PIXELS * 4 {
                return Err(RiterError::runtime(format!(
                    "rgba8 buffer must be {} bytes, got {}",
                    PIXELS * 4,
                    data.len()
                )));
            }
            let mut mask = Vec::with_capacity(PIXELS);
            for px in data.chunks_exact(4) {
                mask.push(rgba8_is_on(px[0], px[1], px[2]));
            }
            Frame::from_mask(&mask)
        }
        NativePixels::RgbaF32(data) => {
            if data.len() != PIXELS {
                return Err(RiterError::runtime(format!(
                    "float buffer must have {PIXELS} pixels, got {}",
                    data.len()
                )));
            }
            let mask: Vec<bool> = data
                .iter()
                .map(|&[r, g, b, _a]| luma_is_on(r, g, b))
                .collect();
            Frame::from_mask(&mask)
        }
    }
}

/// Threshold an 8-bit color (already over black). Midpoint of `0..=255` is 127.5.
pub(crate) fn rgba8_is_on(r: u8, g: u8, b: u8) -> bool {
    let weighted = LUMA_R * u32::from(r) + LUMA_G * u32::from(g) + LUMA_B * u32::from(b);
    2 * weighted >= 255 * 10_000
}

/// Threshold a normalized color. Channels are clamped to `[0, 1]`; NaN counts as 0.
pub(crate) fn luma_is_on(r: f32, g: f32, b: f32) -> bool {
    let c = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    let y = (LUMA_R as f32 * c(r) + LUMA_G as f32 * c(g) + LUMA_B as f32 * c(b)) / 10_000.0;
    y >= 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_threshold_sits_at_midpoint() {
        assert!(rgba8_is_on(255, 255, 255));
        assert!(rgba8_is_on(128, 128, 128));
        assert!(!rgba8_is_on(127, 127, 127));
        assert!(!rgba8_is_on(0, 0, 0));
        // Pure green is bright enough on its own, pure red and blue are not.
        assert!(rgba8_is_on(0, 255, 0));
        assert!(!rgba8_is_on(255, 0, 0));
        assert!(!rgba8_is_on(0, 0, 255));
    }

    #[test]
    fn float_threshold_matches_eight_bit_policy() {
        assert!(luma_is_on(0.5, 0.5, 0.5));
        assert!(!luma_is_on(0.49, 0.49, 0.49));
        assert!(luma_is_on(2.0, 2.0, 2.0));
        assert!(!luma_is_on(f32::NAN, 0.0, 0.0));
        assert!(!luma_is_on(1.0, 0.0, 0.0));
    }

    #[test]
    fn float_alpha_is_ignored() {
        let mut px = vec![[1.0, 1.0, 1.0, 0.0]; PIXELS];
        px[1] = [0.0, 0.0, 0.0, 1.0];
        let f = encode(&NativePixels::RgbaF32(px)).unwrap();
        assert!(f.get(0, 0));
        assert!(!f.get(1, 0));
        assert_eq!(f.count_on() as usize, PIXELS - 1);
    }

    #[test]
    fn packed_passes_through() {
        let mut bytes = [0u8; FRAME_BYTES];
        bytes[0] = 0xA5;
        let f = encode(&NativePixels::Packed(Box::new(bytes))).unwrap();
        assert_eq!(f.as_bytes()[0], 0xA5);
    }

    #[test]
    fn wrong_buffer_sizes_fault() {
        assert!(encode(&NativePixels::Rgba8Premul(vec![0; 12])).is_err());
        assert!(encode(&NativePixels::RgbaF32(vec![[0.0; 4]; 3])).is_err());
    }
}
