#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(Lit),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Call {
        func: String,
        args: Vec<Expr>,
    },
    /// A bare name: a local binding or one of the fragment inputs.
    Ident(String),
    /// Component selection: `v.xy`, `color.rgb`.
    Swizzle {
        base: Box<Expr>,
        fields: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lit {
    F64(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Static type of a shader value; also the declared type of a binding (`float d = ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclType {
    Float,
    Bool,
    Vec(u8),
}

impl DeclType {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "vec2" => Some(Self::Vec(2)),
            "vec3" => Some(Self::Vec(3)),
            "vec4" => Some(Self::Vec(4)),
            _ => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Vec(2) => "vec2",
            Self::Vec(3) => "vec3",
            Self::Vec(_) => "vec4",
        }
    }
}

/// `[type] name = value;`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub(crate) name: String,
    pub(crate) ty: Option<DeclType>,
    pub(crate) value: Expr,
}

/// A parsed fragment program: local bindings evaluated in order, then the output color.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FragmentSource {
    pub(crate) bindings: Vec<Binding>,
    pub(crate) output: Expr,
}
