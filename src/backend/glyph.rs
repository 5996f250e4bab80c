use crate::backend::glyph_atlas::{FIRST, FONT_5X7, GLYPH_COUNT, GLYPH_H, GLYPH_W, LAST};
use crate::backend::{Backend, FrameContext, FrameStep, not_initialized};
use crate::foundation::core::{FrameIndex, HEIGHT, WIDTH};
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::bitmap::Frame;
use crate::frame::encoder::NativePixels;
use crate::session::config::RenderConfig;
use crate::show::ShowKind;

/// Width of one character cell, including one column of spacing.
pub const CELL_W: usize = 6;
/// Height of one character cell, including one row of spacing.
pub const CELL_H: usize = 8;
/// Characters per line.
pub const COLUMNS: usize = WIDTH / CELL_W;
/// Lines per frame.
pub const ROWS: usize = HEIGHT / CELL_H;

/// A validated column-major glyph table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GlyphAtlas {
    table: &'static [u8],
}

impl GlyphAtlas {
    pub(crate) fn builtin() -> RiterResult<Self> {
        Self::from_table(&FONT_5X7)
    }

    pub(crate) fn from_table(table: &'static [u8]) -> RiterResult<Self> {
        if table.len() != GLYPH_COUNT * GLYPH_W {
            return Err(RiterError::glyph_set(format!(
                "expected {} bytes for {GLYPH_COUNT} glyphs, got {}",
                GLYPH_COUNT * GLYPH_W,
                table.len()
            )));
        }
        if let Some(pos) = table.iter().position(|b| b >> GLYPH_H != 0) {
            let ch = char::from(FIRST as u8 + (pos / GLYPH_W) as u8);
            return Err(RiterError::glyph_set(format!(
                "glyph {ch:?} uses rows beyond {GLYPH_H}"
            )));
        }
        Ok(Self { table })
    }

    /// Column bytes for `ch`, or `None` for characters outside the set.
    fn columns(&self, ch: char) -> Option<&'static [u8]> {
        if !(FIRST..=LAST).contains(&ch) {
            return None;
        }
        let start = (ch as usize - FIRST as usize) * GLYPH_W;
        self.table.get(start..start + GLYPH_W)
    }

    fn blit(&self, frame: &mut Frame, ch: char, col: usize, row: usize) {
        let Some(columns) = self.columns(ch) else {
            return;
        };
        let (ox, oy) = (col * CELL_W, row * CELL_H);
        for (dx, bits) in columns.iter().enumerate() {
            for dy in 0..GLYPH_H {
                if bits >> dy & 1 == 1 {
                    frame.set(ox + dx, oy + dy, true);
                }
            }
        }
    }

    pub(crate) fn rasterize(&self, text: &str) -> Frame {
        let mut frame = Frame::blank();
        for (row, line) in wrap(text, COLUMNS).iter().take(ROWS).enumerate() {
            for (col, ch) in line.chars().enumerate() {
                self.blit(&mut frame, ch, col, row);
            }
        }
        frame
    }
}

/// Greedy word wrap honoring explicit line breaks. Words longer than a line are split.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.strip_suffix('\r').unwrap_or(paragraph);
        let mut line = String::new();
        let mut len = 0usize;
        for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
            let mut chars: Vec<char> = word.chars().collect();
            if len > 0 && len + 1 + chars.len() <= width {
                line.push(' ');
                line.extend(chars.iter());
                len += 1 + chars.len();
                continue;
            }
            if len > 0 {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            while chars.len() > width {
                let rest = chars.split_off(width);
                lines.push(chars.into_iter().collect());
                chars = rest;
            }
            len = chars.len();
            line.extend(chars);
        }
        lines.push(line);
    }
    lines
}

/// Renders its source text once as a single static frame.
#[derive(Debug)]
pub struct GlyphBackend {
    atlas: GlyphAtlas,
    text: Option<String>,
}

impl GlyphBackend {
    /// Backend over the built-in atlas. Fails with [`RiterError::GlyphSet`] if it is malformed.
    pub fn new() -> RiterResult<Self> {
        Ok(Self {
            atlas: GlyphAtlas::builtin()?,
            text: None,
        })
    }
}

impl Backend for GlyphBackend {
    fn kind(&self) -> ShowKind {
        ShowKind::Glyph
    }

    fn initialize(&mut self, source: &str, _config: &RenderConfig) -> RiterResult<()> {
        self.text = Some(source.to_owned());
        Ok(())
    }

    fn produce_frame(
        &mut self,
        index: FrameIndex,
        _ctx: &FrameContext<'_>,
    ) -> RiterResult<FrameStep> {
        let text = self
            .text
            .as_deref()
            .ok_or_else(|| not_initialized(ShowKind::Glyph))?;
        if index.0 > 0 {
            return Ok(FrameStep::Finished);
        }
        let frame = self.atlas.rasterize(text);
        Ok(FrameStep::Frame(NativePixels::Packed(Box::new(
            frame.into_bytes(),
        ))))
    }

    fn frame_ceiling(&self) -> Option<u64> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_atlas_is_valid_and_grid_fits() {
        assert!(GlyphAtlas::builtin().is_ok());
        assert_eq!((COLUMNS, ROWS), (16, 4));
    }

    #[test]
    fn malformed_atlas_is_rejected() {
        static SHORT: [u8; 10] = [0; 10];
        assert!(matches!(
            GlyphAtlas::from_table(&SHORT),
            Err(RiterError::GlyphSet(_))
        ));
        static TALL: [u8; GLYPH_COUNT * GLYPH_W] = {
            let mut t = [0u8; GLYPH_COUNT * GLYPH_W];
            t[0] = 0x80;
            t
        };
        assert!(matches!(
            GlyphAtlas::from_table(&TALL),
            Err(RiterError::GlyphSet(_))
        ));
    }

    #[test]
    fn wrap_breaks_on_words_newlines_and_long_words() {
        assert_eq!(wrap("hello world", 16), vec!["hello world"]);
        assert_eq!(wrap("hello brave new world", 11), vec!["hello brave", "new world"]);
        assert_eq!(wrap("a\nb", 16), vec!["a", "b"]);
        assert_eq!(wrap("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap("", 16), vec![""]);
    }

    #[test]
    fn unknown_characters_are_blank_and_extra_lines_dropped() {
        let atlas = GlyphAtlas::builtin().unwrap();
        assert_eq!(atlas.rasterize("\u{e9}\u{2603}").count_on(), 0);
        let five = atlas.rasterize("1\n2\n3\n4\n5");
        let four = atlas.rasterize("1\n2\n3\n4");
        assert_eq!(five, four);
    }

    #[test]
    fn glyph_a_top_row() {
        let f = GlyphAtlas::builtin().unwrap().rasterize("A");
        let top: Vec<bool> = (0..5).map(|x| f.get(x, 0)).collect();
        assert_eq!(top, vec![false, true, true, true, false]);
        assert!(f.get(0, 6) && f.get(4, 6));
        assert!(!f.get(0, 7));
    }

    #[test]
    fn exactly_one_frame() {
        let mut b = GlyphBackend::new().unwrap();
        b.initialize("hi", &RenderConfig::batch()).unwrap();
        let cancel = crate::session::cancel::CancelToken::new();
        let ctx = FrameContext::unbounded(&cancel);
        assert!(matches!(b.produce_frame(FrameIndex(0), &ctx).unwrap(), FrameStep::Frame(_)));
        assert!(matches!(b.produce_frame(FrameIndex(1), &ctx).unwrap(), FrameStep::Finished));
    }
}
