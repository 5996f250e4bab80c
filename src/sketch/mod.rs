//! The imperative draw-loop dialect: a small JavaScript-flavoured language with p5-style
//! drawing primitives, interpreted against a `vello_cpu` canvas.

pub(crate) mod ast;
pub(crate) mod canvas;
pub(crate) mod interp;
pub(crate) mod parser;
pub(crate) mod primitives;
pub(crate) mod value;
