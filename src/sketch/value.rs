use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::sketch::ast::FuncDecl;
use crate::sketch::primitives::Primitive;

/// A dynamically typed sketch value. Arrays are shared by reference, like JavaScript arrays.
#[derive(Clone, Debug)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Func(Rc<FuncDecl>),
    Native(Primitive),
}

impl Value {
    pub(crate) fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Func(_) | Self::Native(_) => true,
        }
    }

    /// Numeric conversion following JavaScript's `Number(v)` for the supported types.
    pub(crate) fn to_num(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Num(n) => *n,
            Self::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [only] => only.to_num(),
                    _ => f64::NAN,
                }
            }
            Self::Func(_) | Self::Native(_) => f64::NAN,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Func(_) | Self::Native(_) => "function",
        }
    }

    /// `==`/`===`: values compare by content, arrays and functions by identity.
    pub(crate) fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined | Self::Null, Self::Undefined | Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Func(a), Self::Func(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => a == b,
            (Self::Num(n), Self::Str(_) | Self::Bool(_)) => *n == other.to_num(),
            (Self::Str(_) | Self::Bool(_), Self::Num(n)) => self.to_num() == *n,
            _ => false,
        }
    }
}

fn fmt_num(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == n.trunc() && n.abs() < 1e21 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Num(n) => fmt_num(*n, f),
            Self::Str(s) => f.write_str(s),
            Self::Array(items) => {
                for (i, v) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            Self::Func(decl) => write!(f, "function {}()", decl.name),
            Self::Native(p) => write!(f, "function {}()", p.name()),
        }
    }
}
