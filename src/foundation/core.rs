/// Display width in pixels.
pub const WIDTH: usize = 96;

/// Display height in pixels.
pub const HEIGHT: usize = 38;

/// Number of pixels on the display.
pub const PIXELS: usize = WIDTH * HEIGHT;

/// Size of one packed frame in bytes (1 bit per pixel).
pub const FRAME_BYTES: usize = PIXELS / 8;

const _: () = assert!(PIXELS % 8 == 0);

/// Absolute 0-based frame index within a render session.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// The following frame index.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
