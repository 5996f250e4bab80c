use std::collections::HashMap;

use crate::expression::ast::{BinaryOp, DeclType, Expr, FragmentSource, Lit, UnaryOp};
use crate::expression::bytecode::{BuiltinId, BytecodeProgram, ConstVal, InputField, LocalSlot, Op};
use crate::expression::parser::parse_fragment;

#[derive(Debug)]
pub(crate) struct ExprCompileError {
    pub(crate) message: String,
}

impl ExprCompileError {
    fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ExprCompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExprCompileError {}

/// Parse and lower a fragment program. Parse errors carry `line:col`.
pub(crate) fn compile_fragment(src: &str) -> Result<BytecodeProgram, ExprCompileError> {
    let ast = parse_fragment(src).map_err(|e| ExprCompileError::new(e.render(src)))?;
    lower_fragment(&ast)
}

fn lower_fragment(src: &FragmentSource) -> Result<BytecodeProgram, ExprCompileError> {
    let mut lower = Lower {
        program: BytecodeProgram::new(),
        locals: HashMap::new(),
    };

    for binding in &src.bindings {
        let ty = lower.expr(&binding.value)?;
        if let Some(declared) = binding.ty
            && declared != ty
        {
            return Err(ExprCompileError::new(format!(
                "cannot initialize {} '{}' with {}",
                declared.name(),
                binding.name,
                ty.name()
            )));
        }
        let slot = match lower.locals.get(&binding.name) {
            Some(&(slot, _)) => slot,
            None => {
                let slot = LocalSlot(lower.program.locals);
                lower.program.locals = lower
                    .program
                    .locals
                    .checked_add(1)
                    .ok_or_else(|| ExprCompileError::new("too many local bindings"))?;
                slot
            }
        };
        lower.locals.insert(binding.name.clone(), (slot, ty));
        lower.program.ops.push(Op::StoreLocal {
            slot,
            ty: binding.ty,
        });
    }

    match lower.expr(&src.output)? {
        DeclType::Float | DeclType::Vec(3) | DeclType::Vec(4) => Ok(lower.program),
        other => Err(ExprCompileError::new(format!(
            "fragment output must be float, vec3 or vec4, got {}",
            other.name()
        ))),
    }
}

struct Lower {
    program: BytecodeProgram,
    /// Bindings are straight-line, so a name's type is whatever it was last bound to.
    locals: HashMap<String, (LocalSlot, DeclType)>,
}

impl Lower {
    fn emit(&mut self, op: Op) {
        self.program.ops.push(op);
    }

    /// Emit code for `e` and return its static type.
    fn expr(&mut self, e: &Expr) -> Result<DeclType, ExprCompileError> {
        let ty = match e {
            Expr::Lit(Lit::F64(v)) => {
                let idx = self.program.push_const(ConstVal::F64(*v));
                self.emit(Op::PushConst(idx));
                DeclType::Float
            }
            Expr::Lit(Lit::Bool(v)) => {
                let idx = self.program.push_const(ConstVal::Bool(*v));
                self.emit(Op::PushConst(idx));
                DeclType::Bool
            }
            Expr::Ident(name) => {
                if let Some(&(slot, ty)) = self.locals.get(name) {
                    self.emit(Op::LoadLocal(slot));
                    ty
                } else if let Some(field) = InputField::from_name(name) {
                    self.emit(Op::LoadInput(field));
                    input_type(field)
                } else {
                    return Err(ExprCompileError::new(format!(
                        "unknown identifier '{name}'"
                    )));
                }
            }
            Expr::Unary { op, expr } => {
                let ty = self.expr(expr)?;
                match op {
                    UnaryOp::Neg => {
                        numeric(ty, "-")?;
                        self.emit(Op::Neg);
                        ty
                    }
                    UnaryOp::Not => {
                        expect(DeclType::Bool, ty, "!")?;
                        self.emit(Op::Not);
                        DeclType::Bool
                    }
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let (op, ty) = match op {
                    BinaryOp::Add => (Op::Add, broadcast(l, r)?),
                    BinaryOp::Sub => (Op::Sub, broadcast(l, r)?),
                    BinaryOp::Mul => (Op::Mul, broadcast(l, r)?),
                    BinaryOp::Div => (Op::Div, broadcast(l, r)?),
                    BinaryOp::Mod => (Op::Mod, broadcast(l, r)?),
                    BinaryOp::Eq | BinaryOp::Ne => {
                        if l != r {
                            return Err(ExprCompileError::new(format!(
                                "cannot compare {} with {}",
                                l.name(),
                                r.name()
                            )));
                        }
                        let op = if *op == BinaryOp::Eq { Op::Eq } else { Op::Ne };
                        (op, DeclType::Bool)
                    }
                    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                        expect(DeclType::Float, l, "comparison")?;
                        expect(DeclType::Float, r, "comparison")?;
                        let op = match op {
                            BinaryOp::Lt => Op::Lt,
                            BinaryOp::Le => Op::Le,
                            BinaryOp::Gt => Op::Gt,
                            _ => Op::Ge,
                        };
                        (op, DeclType::Bool)
                    }
                    BinaryOp::And | BinaryOp::Or => {
                        expect(DeclType::Bool, l, "logical operator")?;
                        expect(DeclType::Bool, r, "logical operator")?;
                        let op = if *op == BinaryOp::And { Op::And } else { Op::Or };
                        (op, DeclType::Bool)
                    }
                };
                self.emit(op);
                ty
            }
            Expr::Ternary { cond, then, els } => {
                let c = self.expr(cond)?;
                expect(DeclType::Bool, c, "ternary condition")?;
                let t = self.expr(then)?;
                let f = self.expr(els)?;
                if t != f {
                    return Err(ExprCompileError::new(format!(
                        "ternary branches differ: {} and {}",
                        t.name(),
                        f.name()
                    )));
                }
                self.emit(Op::Select);
                t
            }
            Expr::Swizzle { base, fields } => {
                let base_ty = self.expr(base)?;
                let DeclType::Vec(n) = base_ty else {
                    return Err(ExprCompileError::new(format!(
                        "cannot swizzle {}",
                        base_ty.name()
                    )));
                };
                let (len, idx) = swizzle_indices(fields)?;
                if idx[..len as usize].iter().any(|&k| k >= n) {
                    return Err(ExprCompileError::new(format!(
                        "swizzle '.{fields}' out of range for {}",
                        base_ty.name()
                    )));
                }
                self.emit(Op::Swizzle { len, idx });
                if len == 1 {
                    DeclType::Float
                } else {
                    DeclType::Vec(len)
                }
            }
            Expr::Call { func, args } => {
                let Some(id) = BuiltinId::from_name(func) else {
                    return Err(ExprCompileError::new(format!("unknown function '{func}'")));
                };
                let (lo, hi) = id.arity();
                let argc = u8::try_from(args.len()).unwrap_or(u8::MAX);
                if argc < lo || argc > hi {
                    let expected = if lo == hi {
                        format!("{lo}")
                    } else {
                        format!("{lo}..={hi}")
                    };
                    return Err(ExprCompileError::new(format!(
                        "{func} expects {expected} args, got {}",
                        args.len()
                    )));
                }
                let mut tys = Vec::with_capacity(args.len());
                for a in args {
                    tys.push(self.expr(a)?);
                }
                let ty = builtin_type(id, func, &tys)?;
                self.emit(Op::CallBuiltin { id, argc });
                ty
            }
        };
        Ok(ty)
    }
}

fn input_type(field: InputField) -> DeclType {
    match field {
        InputField::FragCoord => DeclType::Vec(4),
        InputField::Resolution | InputField::Mouse => DeclType::Vec(2),
        InputField::Time => DeclType::Float,
    }
}

fn expect(want: DeclType, got: DeclType, what: &str) -> Result<(), ExprCompileError> {
    if want == got {
        Ok(())
    } else {
        Err(ExprCompileError::new(format!(
            "{what} expects {}, got {}",
            want.name(),
            got.name()
        )))
    }
}

/// Component count of a float (1) or vector; `bool` is not numeric.
fn numeric(ty: DeclType, what: &str) -> Result<u8, ExprCompileError> {
    match ty {
        DeclType::Float => Ok(1),
        DeclType::Vec(n) => Ok(n),
        DeclType::Bool => Err(ExprCompileError::new(format!(
            "{what} expects float or vector, got bool"
        ))),
    }
}

fn shape(n: u8) -> DeclType {
    if n == 1 { DeclType::Float } else { DeclType::Vec(n) }
}

/// Component-wise result of two operands, with scalar broadcast on either side.
fn broadcast(a: DeclType, b: DeclType) -> Result<DeclType, ExprCompileError> {
    let na = numeric(a, "arithmetic")?;
    let nb = numeric(b, "arithmetic")?;
    match (na, nb) {
        (1, n) | (n, 1) => Ok(shape(n)),
        (x, y) if x == y => Ok(shape(x)),
        _ => Err(ExprCompileError::new(format!(
            "operand shapes differ: {} and {}",
            a.name(),
            b.name()
        ))),
    }
}

fn builtin_type(id: BuiltinId, func: &str, args: &[DeclType]) -> Result<DeclType, ExprCompileError> {
    use BuiltinId as B;
    let ty = match (id, args) {
        (B::Float, [_]) => DeclType::Float,
        (B::Vec2, _) => construct_type(2, func, args)?,
        (B::Vec3, _) => construct_type(3, func, args)?,
        (B::Vec4, _) => construct_type(4, func, args)?,
        (B::Length, [x]) => {
            numeric(*x, func)?;
            DeclType::Float
        }
        (B::Distance, [a, b]) => {
            broadcast(*a, *b)?;
            DeclType::Float
        }
        (B::Dot, [a, b]) => {
            if numeric(*a, func)? != numeric(*b, func)? {
                return Err(ExprCompileError::new(format!(
                    "dot of {} and {}",
                    a.name(),
                    b.name()
                )));
            }
            DeclType::Float
        }
        (_, [x]) => {
            numeric(*x, func)?;
            *x
        }
        (_, [a, b]) => broadcast(*a, *b)?,
        (_, [a, b, c]) => {
            let ns = [numeric(*a, func)?, numeric(*b, func)?, numeric(*c, func)?];
            let n = ns.iter().copied().max().unwrap_or(1);
            if ns.iter().any(|&k| k != 1 && k != n) {
                return Err(ExprCompileError::new(format!(
                    "operand shapes differ: {}, {} and {}",
                    a.name(),
                    b.name(),
                    c.name()
                )));
            }
            shape(n)
        }
        _ => {
            return Err(ExprCompileError::new(format!(
                "{func} called with {} args",
                args.len()
            )));
        }
    };
    Ok(ty)
}

/// `vecN(...)`: one scalar fills every component, one wider vector truncates, otherwise the
/// components must add up to exactly `n`.
fn construct_type(n: u8, func: &str, args: &[DeclType]) -> Result<DeclType, ExprCompileError> {
    match args {
        [DeclType::Float] => return Ok(DeclType::Vec(n)),
        [DeclType::Vec(k)] if *k >= n => return Ok(DeclType::Vec(n)),
        _ => {}
    }
    let mut filled = 0u8;
    for &a in args {
        filled = filled.saturating_add(numeric(a, func)?);
    }
    if filled != n {
        return Err(ExprCompileError::new(format!(
            "{func} needs {n} components, got {filled}"
        )));
    }
    Ok(DeclType::Vec(n))
}

fn swizzle_indices(fields: &str) -> Result<(u8, [u8; 4]), ExprCompileError> {
    const SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];

    if fields.is_empty() || fields.len() > 4 {
        return Err(ExprCompileError::new(format!("invalid swizzle '.{fields}'")));
    }
    let set = fields
        .chars()
        .next()
        .and_then(|c| SETS.iter().find(|s| s.contains(c)))
        .ok_or_else(|| ExprCompileError::new(format!("invalid swizzle '.{fields}'")))?;

    let mut idx = [0u8; 4];
    for (i, c) in fields.chars().enumerate() {
        let Some(pos) = set.find(c) else {
            return Err(ExprCompileError::new(format!(
                "invalid swizzle '.{fields}' (mixed component sets)"
            )));
        };
        idx[i] = pos as u8;
    }
    Ok((fields.len() as u8, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_get_slots_and_rebinding_reuses_them() {
        let p = compile_fragment("float a = 1.0; float b = a; a = 2.0; a + b").unwrap();
        assert_eq!(p.locals, 2);
        let stores = p
            .ops
            .iter()
            .filter(|op| matches!(op, Op::StoreLocal { .. }))
            .count();
        assert_eq!(stores, 3);
    }

    #[test]
    fn swizzle_sets() {
        assert_eq!(swizzle_indices("xy").unwrap(), (2, [0, 1, 0, 0]));
        assert_eq!(swizzle_indices("bgr").unwrap(), (3, [2, 1, 0, 0]));
        assert!(swizzle_indices("xg").is_err());
        assert!(swizzle_indices("xyzwx").is_err());
        assert!(swizzle_indices("q1").is_err());
    }

    #[test]
    fn unknown_names_are_compile_errors() {
        let err = compile_fragment("foo(1.0)").unwrap_err();
        assert_eq!(err.message, "unknown function 'foo'");
        let err = compile_fragment("vec4(bar)").unwrap_err();
        assert_eq!(err.message, "unknown identifier 'bar'");
        let err = compile_fragment("clamp(1.0, 2.0)").unwrap_err();
        assert!(err.message.contains("clamp expects 3 args"));
    }

    #[test]
    fn parse_errors_render_position() {
        let err = compile_fragment("float a = 1.0;\nvec4(a,").unwrap_err();
        assert!(err.message.starts_with("2:"), "{}", err.message);
    }

    #[test]
    fn type_errors_are_compile_errors() {
        let err = compile_fragment("float a = vec2(1.0); vec3(1.0)").unwrap_err();
        assert_eq!(err.message, "cannot initialize float 'a' with vec2");
        let err = compile_fragment("vec3(1.0) + vec2(1.0)").unwrap_err();
        assert_eq!(err.message, "operand shapes differ: vec3 and vec2");
        let err = compile_fragment("vec2(1.0)").unwrap_err();
        assert_eq!(err.message, "fragment output must be float, vec3 or vec4, got vec2");
        assert!(compile_fragment("true").is_err());
        assert!(compile_fragment("vec2(1.0).z").is_err());
        assert!(compile_fragment("vec3(1.0, 2.0)").is_err());
        assert!(compile_fragment("u_time > 0.5 ? vec3(1.0) : 0.0").is_err());
        assert!(compile_fragment("u_time ? 1.0 : 0.0").is_err());
        assert!(compile_fragment("dot(vec2(1.0), vec3(1.0))").is_err());
        assert!(compile_fragment("!u_time").is_err());
    }

    #[test]
    fn well_typed_programs_compile() {
        for src in [
            "vec2 st = gl_FragCoord.xy / u_resolution; vec3(st, fract(u_time))",
            "float d = distance(gl_FragCoord.xy, u_mouse); vec4(vec3(step(10.0, d)), 1.0)",
            "mix(vec3(0.0), vec3(1.0), 0.5)",
            "clamp(gl_FragCoord.xyz / 96.0, 0.0, 1.0)",
            "bool on = u_time > 1.0 && !(u_time > 2.0); on ? 1.0 : 0.0",
            "float a = 1.0; a = a * 2.0; vec3(a)",
            "vec4(u_mouse, u_resolution).w / 38.0",
        ] {
            assert!(compile_fragment(src).is_ok(), "{src}");
        }
    }
}
