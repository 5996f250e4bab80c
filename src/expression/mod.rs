//! Shared lexer plus the fragment-shader pipeline: parse, lower to bytecode, evaluate per pixel.

pub(crate) mod ast;
pub(crate) mod bytecode;
pub(crate) mod compile;
pub(crate) mod error;
pub(crate) mod lexer;
pub(crate) mod parser;
pub(crate) mod vm;
