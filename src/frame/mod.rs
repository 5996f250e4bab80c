//! Canonical 1-bit frame and the encoder that quantizes backend output into it.

/// The packed 96x38 bitmap.
pub mod bitmap;
/// Native pixel buffers and the luminance threshold policy.
pub mod encoder;
