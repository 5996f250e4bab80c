use vello_cpu::kurbo::{Affine, BezPath, Cap, Circle, Ellipse, Join, Line, Point, Rect, Shape, Stroke};
use vello_cpu::peniko::Color;

use crate::foundation::core::{HEIGHT, WIDTH};

/// How `rect`/`ellipse` interpret their four coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShapeMode {
    Corner,
    Corners,
    Center,
    Radius,
}

impl ShapeMode {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "corner" => Some(Self::Corner),
            "corners" => Some(Self::Corners),
            "center" => Some(Self::Center),
            "radius" => Some(Self::Radius),
            _ => None,
        }
    }

    fn bounds(self, a: f64, b: f64, c: f64, d: f64) -> Rect {
        match self {
            Self::Corner => Rect::new(a, b, a + c, b + d),
            Self::Corners => Rect::new(a.min(c), b.min(d), a.max(c), b.max(d)),
            Self::Center => Rect::new(a - c / 2.0, b - d / 2.0, a + c / 2.0, b + d / 2.0),
            Self::Radius => Rect::new(a - c, b - d, a + c, b + d),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Style {
    fill: Option<[u8; 4]>,
    stroke: Option<[u8; 4]>,
    stroke_weight: f64,
    rect_mode: ShapeMode,
    ellipse_mode: ShapeMode,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Some([255, 255, 255, 255]),
            stroke: Some([0, 0, 0, 255]),
            stroke_weight: 1.0,
            rect_mode: ShapeMode::Corner,
            ellipse_mode: ShapeMode::Center,
        }
    }
}

/// Persistent drawing surface for the imperative backend.
///
/// Draw calls are recorded into a `vello_cpu` context and composited onto an accumulated
/// premultiplied RGBA buffer when the frame is captured, so anything not painted over persists
/// across frames.
pub(crate) struct Canvas {
    ctx: vello_cpu::RenderContext,
    scratch: vello_cpu::Pixmap,
    accum: Vec<u8>,
    style: Style,
    transform: Affine,
    stack: Vec<(Style, Affine)>,
    shape: Option<Vec<Point>>,
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("style", &self.style)
            .field("transform", &self.transform)
            .field("stack_depth", &self.stack.len())
            .finish_non_exhaustive()
    }
}

impl Canvas {
    pub(crate) fn new() -> Self {
        Self {
            ctx: vello_cpu::RenderContext::new(WIDTH as u16, HEIGHT as u16),
            scratch: vello_cpu::Pixmap::new(WIDTH as u16, HEIGHT as u16),
            accum: vec![0; WIDTH * HEIGHT * 4],
            style: Style::default(),
            transform: Affine::IDENTITY,
            stack: Vec::new(),
            shape: None,
        }
    }

    /// Matrix and push/pop state reset at the start of every `draw()`; style persists.
    pub(crate) fn begin_frame(&mut self) {
        self.transform = Affine::IDENTITY;
        self.stack.clear();
        self.shape = None;
    }

    /// Composite pending draw calls and return the premultiplied canvas.
    pub(crate) fn capture(&mut self) -> Vec<u8> {
        self.commit();
        self.accum.clone()
    }

    fn commit(&mut self) {
        self.ctx.flush();
        self.scratch.data_as_u8_slice_mut().fill(0);
        self.ctx.render_to_pixmap(&mut self.scratch);
        composite_over(&mut self.accum, self.scratch.data_as_u8_slice());
        self.ctx = vello_cpu::RenderContext::new(WIDTH as u16, HEIGHT as u16);
    }

    pub(crate) fn background(&mut self, rgba: [u8; 4]) {
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(color(rgba));
        self.ctx
            .fill_rect(&Rect::new(0.0, 0.0, WIDTH as f64, HEIGHT as f64));
    }

    /// Drop everything drawn so far; the canvas becomes transparent.
    pub(crate) fn clear(&mut self) {
        self.ctx = vello_cpu::RenderContext::new(WIDTH as u16, HEIGHT as u16);
        self.accum.fill(0);
    }

    pub(crate) fn set_fill(&mut self, rgba: Option<[u8; 4]>) {
        self.style.fill = rgba;
    }

    pub(crate) fn set_stroke(&mut self, rgba: Option<[u8; 4]>) {
        self.style.stroke = rgba;
    }

    pub(crate) fn set_stroke_weight(&mut self, w: f64) {
        self.style.stroke_weight = w.max(0.0);
    }

    pub(crate) fn set_rect_mode(&mut self, mode: ShapeMode) {
        self.style.rect_mode = mode;
    }

    pub(crate) fn set_ellipse_mode(&mut self, mode: ShapeMode) {
        self.style.ellipse_mode = mode;
    }

    pub(crate) fn push(&mut self) {
        self.stack.push((self.style, self.transform));
    }

    pub(crate) fn pop(&mut self) {
        if let Some((style, transform)) = self.stack.pop() {
            self.style = style;
            self.transform = transform;
        }
    }

    pub(crate) fn translate(&mut self, x: f64, y: f64) {
        self.transform *= Affine::translate((x, y));
    }

    pub(crate) fn rotate(&mut self, radians: f64) {
        self.transform *= Affine::rotate(radians);
    }

    pub(crate) fn scale(&mut self, sx: f64, sy: f64) {
        self.transform *= Affine::scale_non_uniform(sx, sy);
    }

    pub(crate) fn rect(&mut self, a: f64, b: f64, c: f64, d: f64) {
        let r = self.style.rect_mode.bounds(a, b, c, d);
        self.draw(&r.to_path(0.1), true);
    }

    pub(crate) fn ellipse(&mut self, a: f64, b: f64, c: f64, d: f64) {
        let r = self.style.ellipse_mode.bounds(a, b, c, d);
        let e = Ellipse::from_rect(r);
        self.draw(&e.to_path(0.1), true);
    }

    pub(crate) fn circle(&mut self, x: f64, y: f64, d: f64) {
        match self.style.ellipse_mode {
            ShapeMode::Center => self.draw(&Circle::new((x, y), d / 2.0).to_path(0.1), true),
            _ => self.ellipse(x, y, d, d),
        }
    }

    pub(crate) fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let path = Line::new((x1, y1), (x2, y2)).to_path(0.1);
        self.draw(&path, false);
    }

    /// A point is a round dot the size of the stroke weight, painted with the stroke color.
    pub(crate) fn point(&mut self, x: f64, y: f64) {
        let Some(rgba) = self.style.stroke else {
            return;
        };
        let r = (self.style.stroke_weight / 2.0).max(0.5);
        self.ctx.set_transform(self.transform);
        self.ctx.set_paint(color(rgba));
        self.ctx.fill_path(&Circle::new((x, y), r).to_path(0.1));
    }

    pub(crate) fn polygon(&mut self, points: &[(f64, f64)]) {
        if let Some(path) = polyline(points, true) {
            self.draw(&path, true);
        }
    }

    pub(crate) fn begin_shape(&mut self) {
        self.shape = Some(Vec::new());
    }

    pub(crate) fn vertex(&mut self, x: f64, y: f64) {
        if let Some(shape) = &mut self.shape {
            shape.push(Point::new(x, y));
        }
    }

    pub(crate) fn end_shape(&mut self, close: bool) {
        let Some(points) = self.shape.take() else {
            return;
        };
        let pts: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
        let Some(path) = polyline(&pts, close) else {
            return;
        };
        // An open shape is still filled as if closed, but its outline stays open.
        if let Some(rgba) = self.style.fill {
            let mut filled = path.clone();
            if !close {
                filled.close_path();
            }
            self.ctx.set_transform(self.transform);
            self.ctx.set_paint(color(rgba));
            self.ctx.fill_path(&filled);
        }
        self.stroke(&path);
    }

    fn draw(&mut self, path: &BezPath, fill: bool) {
        self.ctx.set_transform(self.transform);
        if fill && let Some(rgba) = self.style.fill {
            self.ctx.set_paint(color(rgba));
            self.ctx.fill_path(path);
        }
        self.stroke(path);
    }

    fn stroke(&mut self, path: &BezPath) {
        let Some(rgba) = self.style.stroke else {
            return;
        };
        if self.style.stroke_weight <= 0.0 {
            return;
        }
        let stroke = Stroke::new(self.style.stroke_weight)
            .with_caps(Cap::Round)
            .with_join(Join::Miter);
        self.ctx.set_transform(self.transform);
        self.ctx.set_paint(color(rgba));
        self.ctx.set_stroke(stroke);
        self.ctx.stroke_path(path);
    }
}

fn color(rgba: [u8; 4]) -> Color {
    Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn polyline(points: &[(f64, f64)], close: bool) -> Option<BezPath> {
    let (first, rest) = points.split_first()?;
    let mut path = BezPath::new();
    path.move_to(*first);
    for &p in rest {
        path.line_to(p);
    }
    if close {
        path.close_path();
    }
    Some(path)
}

/// Premultiplied source-over: `dst = src + dst * (1 - src_a)`.
fn composite_over(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let inv = 255 - u16::from(s[3]);
        for i in 0..4 {
            let v = u16::from(s[i]) + (u16::from(d[i]) * inv + 127) / 255;
            d[i] = v.min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buf: &[u8], x: usize, y: usize) -> [u8; 4] {
        let i = (y * WIDTH + x) * 4;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    }

    #[test]
    fn composite_over_is_premultiplied_source_over() {
        let mut dst = vec![200, 200, 200, 255];
        composite_over(&mut dst, &[0, 0, 0, 0]);
        assert_eq!(dst, vec![200, 200, 200, 255]);
        composite_over(&mut dst, &[10, 10, 10, 255]);
        assert_eq!(dst, vec![10, 10, 10, 255]);
        composite_over(&mut dst, &[64, 64, 64, 128]);
        assert_eq!(dst, vec![69, 69, 69, 255]);
    }

    #[test]
    fn shape_modes_resolve_bounds() {
        assert_eq!(
            ShapeMode::Center.bounds(10.0, 10.0, 4.0, 2.0),
            Rect::new(8.0, 9.0, 12.0, 11.0)
        );
        assert_eq!(
            ShapeMode::Corners.bounds(5.0, 6.0, 1.0, 2.0),
            Rect::new(1.0, 2.0, 5.0, 6.0)
        );
    }

    #[test]
    fn background_then_rect_persists_across_frames() {
        let mut c = Canvas::new();
        c.begin_frame();
        c.background([0, 0, 0, 255]);
        c.set_stroke(None);
        c.rect(10.0, 10.0, 10.0, 10.0);
        let first = c.capture();
        assert_eq!(pixel(&first, 15, 15), [255, 255, 255, 255]);
        assert_eq!(pixel(&first, 2, 2), [0, 0, 0, 255]);

        // Nothing drawn: the previous frame stays.
        c.begin_frame();
        let second = c.capture();
        assert_eq!(first, second);

        c.begin_frame();
        c.clear();
        assert!(c.capture().iter().all(|&b| b == 0));
    }

    #[test]
    fn transforms_reset_each_frame_and_pop_restores() {
        let mut c = Canvas::new();
        c.begin_frame();
        c.push();
        c.translate(5.0, 5.0);
        c.set_fill(None);
        c.pop();
        assert_eq!(c.transform, Affine::IDENTITY);
        assert!(c.style.fill.is_some());

        c.translate(3.0, 0.0);
        c.begin_frame();
        assert_eq!(c.transform, Affine::IDENTITY);
    }
}
