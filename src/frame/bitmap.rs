use crate::foundation::core::{FRAME_BYTES, HEIGHT, PIXELS, WIDTH};
use crate::foundation::error::{RiterError, RiterResult};

/// One canonical display frame: 96x38 pixels, 1 bit per pixel, 456 bytes.
///
/// Pixel `(x, y)` lives at linear index `i = y * 96 + x`, in byte `i / 8`, at bit `7 - i % 8`
/// (most significant bit first). A set bit is an "on" (bright) pixel.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: [u8; FRAME_BYTES],
}

impl Frame {
    /// An all-off frame.
    pub fn blank() -> Self {
        Self {
            bytes: [0; FRAME_BYTES],
        }
    }

    /// Wrap already-packed bytes.
    pub fn from_bytes(bytes: [u8; FRAME_BYTES]) -> Self {
        Self { bytes }
    }

    /// Wrap packed bytes from a slice; the slice must be exactly 456 bytes long.
    pub fn from_slice(bytes: &[u8]) -> RiterResult<Self> {
        let bytes: [u8; FRAME_BYTES] = bytes.try_into().map_err(|_| {
            RiterError::configuration(format!(
                "frame payload must be {FRAME_BYTES} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Pack a row-major on/off mask of exactly `96 * 38` pixels.
    pub fn from_mask(mask: &[bool]) -> RiterResult<Self> {
        if mask.len() != PIXELS {
            return Err(RiterError::configuration(format!(
                "pixel mask must have {PIXELS} entries, got {}",
                mask.len()
            )));
        }
        let mut out = Self::blank();
        for (i, &on) in mask.iter().enumerate() {
            if on {
                out.bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Ok(out)
    }

    /// Build a frame by asking `f(x, y)` for every pixel.
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut out = Self::blank();
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                out.set(x, y, f(x, y));
            }
        }
        out
    }

    /// Packed bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_BYTES] {
        &self.bytes
    }

    /// Consume into packed bytes.
    pub fn into_bytes(self) -> [u8; FRAME_BYTES] {
        self.bytes
    }

    /// Read pixel `(x, y)`; out-of-range coordinates read as off.
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        let i = y * WIDTH + x;
        self.bytes[i / 8] & (0x80 >> (i % 8)) != 0
    }

    /// Write pixel `(x, y)`; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let i = y * WIDTH + x;
        let bit = 0x80 >> (i % 8);
        if on {
            self.bytes[i / 8] |= bit;
        } else {
            self.bytes[i / 8] &= !bit;
        }
    }

    /// Unpack into a row-major on/off mask.
    pub fn to_mask(&self) -> Vec<bool> {
        (0..PIXELS)
            .map(|i| self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect()
    }

    /// Number of lit pixels.
    pub fn count_on(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    /// Render as text, `#` for on and `.` for off, one line per row.
    pub fn to_ascii(&self) -> String {
        let mut s = String::with_capacity((WIDTH + 1) * HEIGHT);
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                s.push(if self.get(x, y) { '#' } else { '.' });
            }
            s.push('\n');
        }
        s
    }

    /// Expand to opaque grayscale RGBA8 (on = white), e.g. for PNG snapshots.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PIXELS * 4);
        for on in self.to_mask() {
            let c = if on { 255 } else { 0 };
            out.extend_from_slice(&[c, c, c, 255]);
        }
        out
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::blank()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("on", &self.count_on())
            .finish_non_exhaustive()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pixel_is_msb_of_first_byte() {
        let mut f = Frame::blank();
        f.set(0, 0, true);
        assert_eq!(f.as_bytes()[0], 0b1000_0000);
        f.set(7, 0, true);
        assert_eq!(f.as_bytes()[0], 0b1000_0001);
    }

    #[test]
    fn second_row_starts_at_byte_twelve() {
        let mut f = Frame::blank();
        f.set(0, 1, true);
        assert_eq!(f.as_bytes()[12], 0x80);
        f.set(95, 37, true);
        assert_eq!(f.as_bytes()[455], 0x01);
        assert_eq!(f.count_on(), 2);
    }

    #[test]
    fn set_then_clear() {
        let mut f = Frame::blank();
        f.set(10, 3, true);
        assert!(f.get(10, 3));
        f.set(10, 3, false);
        assert!(!f.get(10, 3));
        assert_eq!(f, Frame::blank());
    }

    #[test]
    fn out_of_range_is_ignored() {
        let mut f = Frame::blank();
        f.set(96, 0, true);
        f.set(0, 38, true);
        assert_eq!(f.count_on(), 0);
        assert!(!f.get(200, 200));
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        assert!(Frame::from_slice(&[0; 455]).is_err());
        assert!(Frame::from_mask(&[false; 10]).is_err());
        assert!(Frame::from_slice(&[0xff; 456]).is_ok());
    }

    #[test]
    fn ascii_dump_has_one_line_per_row() {
        let f = Frame::from_fn(|x, _| x == 0);
        let txt = f.to_ascii();
        assert_eq!(txt.lines().count(), HEIGHT);
        assert!(txt.lines().all(|l| l.starts_with('#') && l.len() == WIDTH));
    }
}
