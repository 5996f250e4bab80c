//! Injected drawing, math and time primitives of the imperative dialect.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

use crate::foundation::core::{HEIGHT, WIDTH};
use crate::sketch::canvas::{Canvas, ShapeMode};
use crate::sketch::value::Value;

/// Simulated frame rate of the draw loop.
pub(crate) const SKETCH_FPS: f64 = 60.0;

/// Coordinates beyond this are clamped before rasterization.
const COORD_LIMIT: f64 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Primitive {
    // drawing
    Background,
    Clear,
    Fill,
    NoFill,
    Stroke,
    NoStroke,
    StrokeWeight,
    Rect,
    Square,
    Ellipse,
    Circle,
    Line,
    Point,
    Triangle,
    Quad,
    BeginShape,
    Vertex,
    EndShape,
    Push,
    Pop,
    Translate,
    Rotate,
    Scale,
    RectMode,
    EllipseMode,
    CreateCanvas,
    NoLoop,
    Loop,
    FrameRate,

    // math
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sqrt,
    Pow,
    Abs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
    Min,
    Max,
    Map,
    Constrain,
    Lerp,
    Dist,
    Mag,
    Sq,
    Exp,
    Log,
    Hypot,
    Radians,
    Degrees,
    Random,
    RandomSeed,
    Noise,

    // time
    Millis,

    // diagnostics, discarded
    Print,
}

impl Primitive {
    /// Resolve a free identifier.
    pub(crate) fn global(name: &str) -> Option<Self> {
        Some(match name {
            "background" => Self::Background,
            "clear" => Self::Clear,
            "fill" => Self::Fill,
            "noFill" => Self::NoFill,
            "stroke" => Self::Stroke,
            "noStroke" => Self::NoStroke,
            "strokeWeight" => Self::StrokeWeight,
            "rect" => Self::Rect,
            "square" => Self::Square,
            "ellipse" => Self::Ellipse,
            "circle" => Self::Circle,
            "line" => Self::Line,
            "point" => Self::Point,
            "triangle" => Self::Triangle,
            "quad" => Self::Quad,
            "beginShape" => Self::BeginShape,
            "vertex" => Self::Vertex,
            "endShape" => Self::EndShape,
            "push" => Self::Push,
            "pop" => Self::Pop,
            "translate" => Self::Translate,
            "rotate" => Self::Rotate,
            "scale" => Self::Scale,
            "rectMode" => Self::RectMode,
            "ellipseMode" => Self::EllipseMode,
            "createCanvas" => Self::CreateCanvas,
            "noLoop" => Self::NoLoop,
            "loop" => Self::Loop,
            "frameRate" => Self::FrameRate,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "sqrt" => Self::Sqrt,
            "pow" => Self::Pow,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "map" => Self::Map,
            "constrain" => Self::Constrain,
            "lerp" => Self::Lerp,
            "dist" => Self::Dist,
            "mag" => Self::Mag,
            "sq" => Self::Sq,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "radians" => Self::Radians,
            "degrees" => Self::Degrees,
            "random" => Self::Random,
            "randomSeed" => Self::RandomSeed,
            "noise" => Self::Noise,
            "millis" => Self::Millis,
            "print" => Self::Print,
            _ => return None,
        })
    }

    /// Resolve `Math.<name>` to a function or constant.
    pub(crate) fn math_member(name: &str) -> Option<Value> {
        let f = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "sqrt" => Self::Sqrt,
            "pow" => Self::Pow,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "trunc" => Self::Trunc,
            "sign" => Self::Sign,
            "min" => Self::Min,
            "max" => Self::Max,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "hypot" => Self::Hypot,
            "random" => Self::Random,
            "PI" => return Some(Value::Num(PI)),
            "E" => return Some(Value::Num(std::f64::consts::E)),
            "SQRT2" => return Some(Value::Num(std::f64::consts::SQRT_2)),
            _ => return None,
        };
        Some(Value::Native(f))
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Clear => "clear",
            Self::Fill => "fill",
            Self::NoFill => "noFill",
            Self::Stroke => "stroke",
            Self::NoStroke => "noStroke",
            Self::StrokeWeight => "strokeWeight",
            Self::Rect => "rect",
            Self::Square => "square",
            Self::Ellipse => "ellipse",
            Self::Circle => "circle",
            Self::Line => "line",
            Self::Point => "point",
            Self::Triangle => "triangle",
            Self::Quad => "quad",
            Self::BeginShape => "beginShape",
            Self::Vertex => "vertex",
            Self::EndShape => "endShape",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Translate => "translate",
            Self::Rotate => "rotate",
            Self::Scale => "scale",
            Self::RectMode => "rectMode",
            Self::EllipseMode => "ellipseMode",
            Self::CreateCanvas => "createCanvas",
            Self::NoLoop => "noLoop",
            Self::Loop => "loop",
            Self::FrameRate => "frameRate",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sqrt => "sqrt",
            Self::Pow => "pow",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Trunc => "trunc",
            Self::Sign => "sign",
            Self::Min => "min",
            Self::Max => "max",
            Self::Map => "map",
            Self::Constrain => "constrain",
            Self::Lerp => "lerp",
            Self::Dist => "dist",
            Self::Mag => "mag",
            Self::Sq => "sq",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Hypot => "hypot",
            Self::Radians => "radians",
            Self::Degrees => "degrees",
            Self::Random => "random",
            Self::RandomSeed => "randomSeed",
            Self::Noise => "noise",
            Self::Millis => "millis",
            Self::Print => "print",
        }
    }
}

/// Global constants visible to every sketch.
pub(crate) fn constants() -> Vec<(&'static str, Value)> {
    vec![
        ("PI", Value::Num(PI)),
        ("TWO_PI", Value::Num(TAU)),
        ("TAU", Value::Num(TAU)),
        ("HALF_PI", Value::Num(FRAC_PI_2)),
        ("QUARTER_PI", Value::Num(FRAC_PI_4)),
        ("CLOSE", Value::str("close")),
        ("CENTER", Value::str("center")),
        ("CORNER", Value::str("corner")),
        ("CORNERS", Value::str("corners")),
        ("RADIUS", Value::str("radius")),
        ("width", Value::Num(WIDTH as f64)),
        ("height", Value::Num(HEIGHT as f64)),
        ("frameCount", Value::Num(0.0)),
        ("deltaTime", Value::Num(1000.0 / SKETCH_FPS)),
        ("mouseX", Value::Num(0.0)),
        ("mouseY", Value::Num(0.0)),
    ]
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Rng64 {
    state: u64,
}

impl Rng64 {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        // SplitMix64
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    pub(crate) fn next_f64_01(&mut self) -> f64 {
        // 53 bits of precision.
        let v = self.next_u64() >> 11;
        (v as f64) * (1.0 / ((1u64 << 53) as f64))
    }
}

fn lattice01(seed: u64, x: i64, y: i64, z: i64) -> f64 {
    let h = (x as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93)
        ^ (y as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (z as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    Rng64::new(seed ^ h).next_f64_01()
}

/// Smooth value noise in `[0, 1)`.
fn value_noise(seed: u64, x: f64, y: f64, z: f64) -> f64 {
    let fade = |t: f64| t * t * (3.0 - 2.0 * t);
    let (x0, y0, z0) = (x.floor(), y.floor(), z.floor());
    let (tx, ty, tz) = (fade(x - x0), fade(y - y0), fade(z - z0));
    let (ix, iy, iz) = (x0 as i64, y0 as i64, z0 as i64);

    let mut acc = 0.0;
    for corner in 0..8u8 {
        let dx = i64::from(corner & 1);
        let dy = i64::from((corner >> 1) & 1);
        let dz = i64::from((corner >> 2) & 1);
        let w = (if dx == 1 { tx } else { 1.0 - tx })
            * (if dy == 1 { ty } else { 1.0 - ty })
            * (if dz == 1 { tz } else { 1.0 - tz });
        acc += w * lattice01(seed, ix + dx, iy + dy, iz + dz);
    }
    acc
}

/// Per-session state the primitives act on.
pub(crate) struct Host {
    pub(crate) canvas: Canvas,
    rng: Rng64,
    noise_seed: u64,
    pub(crate) frame_count: u64,
    pub(crate) looping: bool,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("frame_count", &self.frame_count)
            .field("looping", &self.looping)
            .finish_non_exhaustive()
    }
}

fn num(args: &[Value], i: usize) -> f64 {
    args.get(i).map_or(f64::NAN, Value::to_num)
}

fn num_or(args: &[Value], i: usize, default: f64) -> f64 {
    args.get(i).map_or(default, Value::to_num)
}

/// `Some` when every listed argument is finite, clamped to a rasterizable range.
fn coords<const N: usize>(args: &[Value]) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    for (i, o) in out.iter_mut().enumerate() {
        let v = num(args, i);
        if !v.is_finite() {
            return None;
        }
        *o = v.clamp(-COORD_LIMIT, COORD_LIMIT);
    }
    Some(out)
}

fn channel(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

fn named_color(name: &str) -> Option<[u8; 4]> {
    Some(match name.to_ascii_lowercase().as_str() {
        "black" => [0, 0, 0, 255],
        "white" => [255, 255, 255, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "lime" => [0, 255, 0, 255],
        "blue" => [0, 0, 255, 255],
        "yellow" => [255, 255, 0, 255],
        "cyan" => [0, 255, 255, 255],
        "magenta" => [255, 0, 255, 255],
        "orange" => [255, 165, 0, 255],
        "purple" => [128, 0, 128, 255],
        "gray" | "grey" => [128, 128, 128, 255],
        "transparent" => [0, 0, 0, 0],
        _ => return None,
    })
}

fn hex_color(s: &str) -> Option<[u8; 4]> {
    let hex = s.strip_prefix('#')?;
    let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some([nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17, 255]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

/// Color arguments: gray, gray+alpha, rgb, rgba, a CSS name or hex string, or an array of numbers.
pub(crate) fn parse_color(args: &[Value]) -> Result<[u8; 4], String> {
    match args {
        [Value::Str(s)] => named_color(s)
            .or_else(|| hex_color(s))
            .ok_or_else(|| format!("unknown color '{s}'")),
        [Value::Array(items)] => {
            let items = items.borrow().clone();
            parse_color(&items)
        }
        [g] => {
            let g = channel(g.to_num());
            Ok([g, g, g, 255])
        }
        [g, a] => {
            let g = channel(g.to_num());
            Ok([g, g, g, channel(a.to_num())])
        }
        [r, g, b] => Ok([channel(r.to_num()), channel(g.to_num()), channel(b.to_num()), 255]),
        [r, g, b, a, ..] => Ok([
            channel(r.to_num()),
            channel(g.to_num()),
            channel(b.to_num()),
            channel(a.to_num()),
        ]),
        [] => Err("color expects at least 1 argument".to_owned()),
    }
}

fn shape_mode(args: &[Value], what: &str) -> Result<ShapeMode, String> {
    match args.first() {
        Some(Value::Str(s)) => {
            ShapeMode::from_name(s).ok_or_else(|| format!("{what}: unknown mode '{s}'"))
        }
        _ => Err(format!("{what} expects a mode constant")),
    }
}

impl Host {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            canvas: Canvas::new(),
            rng: Rng64::new(seed),
            noise_seed: seed.rotate_left(17) ^ 0x5DEE_CE66,
            frame_count: 0,
            looping: true,
        }
    }

    pub(crate) fn millis(&self) -> f64 {
        self.frame_count as f64 * 1000.0 / SKETCH_FPS
    }

    /// Invoke a primitive. Errors are fault messages.
    pub(crate) fn call(&mut self, p: Primitive, args: &[Value]) -> Result<Value, String> {
        let c = &mut self.canvas;
        match p {
            Primitive::Background => c.background(parse_color(args)?),
            Primitive::Clear => c.clear(),
            Primitive::Fill => c.set_fill(Some(parse_color(args)?)),
            Primitive::NoFill => c.set_fill(None),
            Primitive::Stroke => c.set_stroke(Some(parse_color(args)?)),
            Primitive::NoStroke => c.set_stroke(None),
            Primitive::StrokeWeight => {
                let w = num(args, 0);
                if w.is_finite() {
                    c.set_stroke_weight(w.min(1000.0));
                }
            }
            Primitive::Rect => {
                if let Some([x, y, w, h]) = coords(args) {
                    c.rect(x, y, w, h);
                }
            }
            Primitive::Square => {
                if let Some([x, y, s]) = coords(args) {
                    c.rect(x, y, s, s);
                }
            }
            Primitive::Ellipse => {
                if let Some([x, y, w]) = coords(args) {
                    let h = num_or(args, 3, w);
                    if h.is_finite() {
                        c.ellipse(x, y, w, h.clamp(-COORD_LIMIT, COORD_LIMIT));
                    }
                }
            }
            Primitive::Circle => {
                if let Some([x, y, d]) = coords(args) {
                    c.circle(x, y, d);
                }
            }
            Primitive::Line => {
                if let Some([x1, y1, x2, y2]) = coords(args) {
                    c.line(x1, y1, x2, y2);
                }
            }
            Primitive::Point => {
                if let Some([x, y]) = coords(args) {
                    c.point(x, y);
                }
            }
            Primitive::Triangle => {
                if let Some([x1, y1, x2, y2, x3, y3]) = coords(args) {
                    c.polygon(&[(x1, y1), (x2, y2), (x3, y3)]);
                }
            }
            Primitive::Quad => {
                if let Some([x1, y1, x2, y2, x3, y3, x4, y4]) = coords(args) {
                    c.polygon(&[(x1, y1), (x2, y2), (x3, y3), (x4, y4)]);
                }
            }
            Primitive::BeginShape => c.begin_shape(),
            Primitive::Vertex => {
                if let Some([x, y]) = coords(args) {
                    c.vertex(x, y);
                }
            }
            Primitive::EndShape => {
                let close = matches!(args.first(), Some(Value::Str(s)) if &**s == "close");
                c.end_shape(close);
            }
            Primitive::Push => c.push(),
            Primitive::Pop => c.pop(),
            Primitive::Translate => {
                if let Some([x, y]) = coords(args) {
                    c.translate(x, y);
                }
            }
            Primitive::Rotate => {
                if let Some([a]) = coords(args) {
                    c.rotate(a);
                }
            }
            Primitive::Scale => {
                if let Some([sx]) = coords(args) {
                    let sy = num_or(args, 1, sx);
                    if sy.is_finite() {
                        c.scale(sx, sy);
                    }
                }
            }
            Primitive::RectMode => c.set_rect_mode(shape_mode(args, "rectMode")?),
            Primitive::EllipseMode => c.set_ellipse_mode(shape_mode(args, "ellipseMode")?),
            Primitive::CreateCanvas | Primitive::Print => {}
            Primitive::NoLoop => self.looping = false,
            Primitive::Loop => self.looping = true,
            Primitive::FrameRate => return Ok(Value::Num(SKETCH_FPS)),

            Primitive::Millis => return Ok(Value::Num(self.millis())),
            Primitive::Random => return Ok(self.random(args)),
            Primitive::RandomSeed => {
                self.rng = Rng64::new(num(args, 0).to_bits());
            }
            Primitive::Noise => {
                let v = value_noise(
                    self.noise_seed,
                    num(args, 0),
                    num_or(args, 1, 0.0),
                    num_or(args, 2, 0.0),
                );
                return Ok(Value::Num(if v.is_nan() { 0.0 } else { v }));
            }
            math => return Ok(Value::Num(eval_math(math, args))),
        }
        Ok(Value::Undefined)
    }

    fn random(&mut self, args: &[Value]) -> Value {
        match args {
            [] => Value::Num(self.rng.next_f64_01()),
            [Value::Array(items)] => {
                let items = items.borrow();
                if items.is_empty() {
                    return Value::Undefined;
                }
                let i = (self.rng.next_f64_01() * items.len() as f64) as usize;
                items[i.min(items.len() - 1)].clone()
            }
            [hi] => Value::Num(self.rng.next_f64_01() * hi.to_num()),
            [lo, hi, ..] => {
                let (lo, hi) = (lo.to_num(), hi.to_num());
                Value::Num(lo + self.rng.next_f64_01() * (hi - lo))
            }
        }
    }
}

fn eval_math(p: Primitive, args: &[Value]) -> f64 {
    let a = num(args, 0);
    let b = num(args, 1);
    match p {
        Primitive::Sin => a.sin(),
        Primitive::Cos => a.cos(),
        Primitive::Tan => a.tan(),
        Primitive::Asin => a.asin(),
        Primitive::Acos => a.acos(),
        Primitive::Atan => a.atan(),
        Primitive::Atan2 => a.atan2(b),
        Primitive::Sqrt => a.sqrt(),
        Primitive::Pow => a.powf(b),
        Primitive::Abs => a.abs(),
        Primitive::Floor => a.floor(),
        Primitive::Ceil => a.ceil(),
        Primitive::Round => {
            let digits = num_or(args, 1, 0.0);
            if digits.is_finite() && digits != 0.0 {
                let k = 10f64.powi(digits as i32);
                (a * k + 0.5).floor() / k
            } else {
                (a + 0.5).floor()
            }
        }
        Primitive::Trunc => a.trunc(),
        Primitive::Sign => {
            if a > 0.0 {
                1.0
            } else if a < 0.0 {
                -1.0
            } else {
                a
            }
        }
        Primitive::Min | Primitive::Max => {
            let items: Vec<f64> = match args {
                [Value::Array(items)] => items.borrow().iter().map(Value::to_num).collect(),
                _ => args.iter().map(Value::to_num).collect(),
            };
            let is_min = p == Primitive::Min;
            let mut acc = if is_min { f64::INFINITY } else { f64::NEG_INFINITY };
            for v in items {
                if v.is_nan() {
                    return f64::NAN;
                }
                acc = if is_min { acc.min(v) } else { acc.max(v) };
            }
            acc
        }
        Primitive::Map => {
            let (v, a1, b1, a2, b2) = (a, b, num(args, 2), num(args, 3), num(args, 4));
            let out = a2 + (v - a1) / (b1 - a1) * (b2 - a2);
            if args.get(5).is_some_and(Value::truthy) {
                if a2 < b2 {
                    out.clamp(a2, b2)
                } else {
                    out.clamp(b2, a2)
                }
            } else {
                out
            }
        }
        Primitive::Constrain => a.max(b).min(num(args, 2)),
        Primitive::Lerp => a + (b - a) * num(args, 2),
        Primitive::Dist => (num(args, 2) - a).hypot(num(args, 3) - b),
        Primitive::Mag => a.hypot(b),
        Primitive::Sq => a * a,
        Primitive::Exp => a.exp(),
        Primitive::Log => a.ln(),
        Primitive::Hypot => args
            .iter()
            .map(Value::to_num)
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt(),
        Primitive::Radians => a.to_radians(),
        Primitive::Degrees => a.to_degrees(),
        _ => f64::NAN,
    }
}
