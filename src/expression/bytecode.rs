use crate::expression::ast::DeclType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConstIdx(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalSlot(pub(crate) u16);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConstVal {
    F64(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltinId {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Pow,
    Exp,
    Log,
    Sqrt,
    Abs,
    Sign,
    Floor,
    Ceil,
    Fract,
    Mod,
    Min,
    Max,
    Clamp,
    Mix,
    Step,
    Smoothstep,
    Length,
    Distance,
    Dot,
    Normalize,
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl BuiltinId {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "pow" => Self::Pow,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "sign" => Self::Sign,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "fract" => Self::Fract,
            "mod" => Self::Mod,
            "min" => Self::Min,
            "max" => Self::Max,
            "clamp" => Self::Clamp,
            "mix" => Self::Mix,
            "step" => Self::Step,
            "smoothstep" => Self::Smoothstep,
            "length" => Self::Length,
            "distance" => Self::Distance,
            "dot" => Self::Dot,
            "normalize" => Self::Normalize,
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive.
    pub(crate) fn arity(self) -> (u8, u8) {
        match self {
            Self::Atan => (1, 2),
            Self::Pow | Self::Mod | Self::Min | Self::Max | Self::Step | Self::Distance | Self::Dot => {
                (2, 2)
            }
            Self::Clamp | Self::Mix | Self::Smoothstep => (3, 3),
            Self::Vec2 => (1, 2),
            Self::Vec3 => (1, 3),
            Self::Vec4 => (1, 4),
            _ => (1, 1),
        }
    }
}

/// Per-pixel inputs the fragment program may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputField {
    FragCoord,
    Resolution,
    Mouse,
    Time,
}

impl InputField {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "gl_FragCoord" => Some(Self::FragCoord),
            "u_resolution" => Some(Self::Resolution),
            "u_mouse" => Some(Self::Mouse),
            "u_time" => Some(Self::Time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    PushConst(ConstIdx),

    LoadInput(InputField),
    LoadLocal(LocalSlot),
    StoreLocal {
        slot: LocalSlot,
        ty: Option<DeclType>,
    },

    Neg,
    Not,
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

    /// Pops `else`, `then`, `cond` and pushes the chosen branch.
    Select,
    /// Component indices `0..4`; only the first `len` entries are used.
    Swizzle {
        len: u8,
        idx: [u8; 4],
    },

    CallBuiltin {
        id: BuiltinId,
        argc: u8,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct BytecodeProgram {
    pub(crate) ops: Vec<Op>,
    pub(crate) consts: Vec<ConstVal>,
    pub(crate) locals: u16,
}

impl BytecodeProgram {
    pub(crate) fn new() -> Self {
        Self {
            ops: Vec::new(),
            consts: Vec::new(),
            locals: 0,
        }
    }

    pub(crate) fn push_const(&mut self, c: ConstVal) -> ConstIdx {
        let idx = ConstIdx(self.consts.len() as u32);
        self.consts.push(c);
        idx
    }
}
