use crate::expression::ast::DeclType;
use crate::expression::bytecode::{BuiltinId, BytecodeProgram, ConstVal, InputField, Op};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ValueSlot {
    F64(f64),
    Bool(bool),
    /// `vecN`, `n` in `2..=4`; unused components are zero.
    Vec { n: u8, c: [f64; 4] },
}

#[derive(Debug, Clone)]
pub(crate) struct VmError {
    pub(crate) message: String,
}

impl VmError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm error: {}", self.message)
    }
}

impl std::error::Error for VmError {}

/// Values the fragment program reads through [`InputField`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FragmentInputs {
    pub(crate) frag_coord: [f64; 4],
    pub(crate) resolution: [f64; 2],
    pub(crate) mouse: [f64; 2],
    pub(crate) time: f64,
}

/// Reusable buffers so per-pixel evaluation does not allocate.
#[derive(Debug, Default)]
pub(crate) struct VmScratch {
    stack: Vec<ValueSlot>,
    locals: Vec<ValueSlot>,
}

/// Evaluate a fragment program and return straight RGBA.
pub(crate) fn eval_fragment(
    p: &BytecodeProgram,
    scratch: &mut VmScratch,
    inputs: &FragmentInputs,
) -> Result<[f32; 4], VmError> {
    let v = eval_program_with_stack(p, scratch, inputs)?;
    match v {
        ValueSlot::F64(g) => Ok([g as f32, g as f32, g as f32, 1.0]),
        ValueSlot::Vec { n: 3, c } => Ok([c[0] as f32, c[1] as f32, c[2] as f32, 1.0]),
        ValueSlot::Vec { n: 4, c } => Ok([c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32]),
        other => Err(VmError::new(format!(
            "fragment output must be float, vec3 or vec4, got {}",
            type_name(other)
        ))),
    }
}

pub(crate) fn eval_program_with_stack(
    p: &BytecodeProgram,
    scratch: &mut VmScratch,
    inputs: &FragmentInputs,
) -> Result<ValueSlot, VmError> {
    let VmScratch { stack, locals } = scratch;
    stack.clear();
    locals.clear();
    locals.resize(p.locals as usize, ValueSlot::F64(0.0));

    for &op in &p.ops {
        match op {
            Op::PushConst(idx) => {
                let c = p
                    .consts
                    .get(idx.0 as usize)
                    .ok_or_else(|| VmError::new("const idx out of range"))?;
                stack.push(match *c {
                    ConstVal::F64(v) => ValueSlot::F64(v),
                    ConstVal::Bool(v) => ValueSlot::Bool(v),
                });
            }
            Op::LoadInput(field) => stack.push(load_input(inputs, field)),
            Op::LoadLocal(slot) => {
                let v = locals
                    .get(slot.0 as usize)
                    .copied()
                    .ok_or_else(|| VmError::new("local slot out of range"))?;
                stack.push(v);
            }
            Op::StoreLocal { slot, ty } => {
                let v = pop(stack)?;
                if let Some(ty) = ty {
                    check_decl(ty, v)?;
                }
                let dst = locals
                    .get_mut(slot.0 as usize)
                    .ok_or_else(|| VmError::new("local slot out of range"))?;
                *dst = v;
            }

            Op::Neg => {
                let v = pop(stack)?;
                stack.push(map1(v, |x| -x)?);
            }
            Op::Not => {
                let v = pop_bool(stack)?;
                stack.push(ValueSlot::Bool(!v));
            }
            Op::Add => bin_arith(stack, |a, b| a + b)?,
            Op::Sub => bin_arith(stack, |a, b| a - b)?,
            Op::Mul => bin_arith(stack, |a, b| a * b)?,
            Op::Div => bin_arith(stack, |a, b| a / b)?,
            Op::Mod => bin_arith(stack, glsl_mod)?,

            Op::Eq => bin_eq(stack, true)?,
            Op::Ne => bin_eq(stack, false)?,
            Op::Lt => bin_scalar_cmp(stack, |a, b| a < b)?,
            Op::Le => bin_scalar_cmp(stack, |a, b| a <= b)?,
            Op::Gt => bin_scalar_cmp(stack, |a, b| a > b)?,
            Op::Ge => bin_scalar_cmp(stack, |a, b| a >= b)?,

            Op::And => {
                let b = pop_bool(stack)?;
                let a = pop_bool(stack)?;
                stack.push(ValueSlot::Bool(a && b));
            }
            Op::Or => {
                let b = pop_bool(stack)?;
                let a = pop_bool(stack)?;
                stack.push(ValueSlot::Bool(a || b));
            }

            Op::Select => {
                let els = pop(stack)?;
                let then = pop(stack)?;
                let cond = pop_bool(stack)?;
                stack.push(if cond { then } else { els });
            }
            Op::Swizzle { len, idx } => {
                let v = pop(stack)?;
                stack.push(swizzle(v, len, idx)?);
            }

            Op::CallBuiltin { id, argc } => {
                call_builtin(stack, id, argc)?;
            }
        }
    }

    if stack.len() != 1 {
        return Err(VmError::new(format!(
            "stack has {} values at end of program",
            stack.len()
        )));
    }
    pop(stack)
}

impl ValueSlot {
    fn vec(n: u8, c: [f64; 4]) -> Self {
        Self::Vec { n, c }
    }

    pub(crate) fn as_f64(self) -> Result<f64, VmError> {
        match self {
            Self::F64(v) => Ok(v),
            other => Err(VmError::new(format!("expected float, got {}", type_name(other)))),
        }
    }

    /// Components as a slice-like view; scalars are one component.
    fn components(self) -> Result<(u8, [f64; 4]), VmError> {
        match self {
            Self::F64(v) => Ok((1, [v, 0.0, 0.0, 0.0])),
            Self::Vec { n, c } => Ok((n, c)),
            Self::Bool(_) => Err(VmError::new("expected float or vector, got bool")),
        }
    }
}

fn type_name(v: ValueSlot) -> &'static str {
    match v {
        ValueSlot::F64(_) => "float",
        ValueSlot::Bool(_) => "bool",
        ValueSlot::Vec { n: 2, .. } => "vec2",
        ValueSlot::Vec { n: 3, .. } => "vec3",
        ValueSlot::Vec { .. } => "vec4",
    }
}

fn check_decl(ty: DeclType, v: ValueSlot) -> Result<(), VmError> {
    let ok = match (ty, v) {
        (DeclType::Float, ValueSlot::F64(_)) => true,
        (DeclType::Bool, ValueSlot::Bool(_)) => true,
        (DeclType::Vec(want), ValueSlot::Vec { n, .. }) => want == n,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        let want = match ty {
            DeclType::Float => "float",
            DeclType::Bool => "bool",
            DeclType::Vec(2) => "vec2",
            DeclType::Vec(3) => "vec3",
            DeclType::Vec(_) => "vec4",
        };
        Err(VmError::new(format!(
            "cannot initialize {want} with {}",
            type_name(v)
        )))
    }
}

fn load_input(inputs: &FragmentInputs, field: InputField) -> ValueSlot {
    match field {
        InputField::FragCoord => ValueSlot::vec(4, inputs.frag_coord),
        InputField::Resolution => {
            ValueSlot::vec(2, [inputs.resolution[0], inputs.resolution[1], 0.0, 0.0])
        }
        InputField::Mouse => ValueSlot::vec(2, [inputs.mouse[0], inputs.mouse[1], 0.0, 0.0]),
        InputField::Time => ValueSlot::F64(inputs.time),
    }
}

fn glsl_mod(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

fn pop(stack: &mut Vec<ValueSlot>) -> Result<ValueSlot, VmError> {
    stack.pop().ok_or_else(|| VmError::new("stack underflow"))
}

fn pop_bool(stack: &mut Vec<ValueSlot>) -> Result<bool, VmError> {
    match stack.pop() {
        Some(ValueSlot::Bool(v)) => Ok(v),
        Some(other) => Err(VmError::new(format!("expected bool, got {}", type_name(other)))),
        None => Err(VmError::new("stack underflow")),
    }
}

fn map1(v: ValueSlot, f: impl Fn(f64) -> f64) -> Result<ValueSlot, VmError> {
    match v {
        ValueSlot::F64(x) => Ok(ValueSlot::F64(f(x))),
        ValueSlot::Vec { n, c } => {
            let mut out = [0.0; 4];
            for i in 0..n as usize {
                out[i] = f(c[i]);
            }
            Ok(ValueSlot::vec(n, out))
        }
        ValueSlot::Bool(_) => Err(VmError::new("expected float or vector, got bool")),
    }
}

/// Component-wise with scalar broadcast on either side.
fn map2(a: ValueSlot, b: ValueSlot, f: impl Fn(f64, f64) -> f64) -> Result<ValueSlot, VmError> {
    let (na, ca) = a.components()?;
    let (nb, cb) = b.components()?;
    let n = match (na, nb) {
        (1, 1) => return Ok(ValueSlot::F64(f(ca[0], cb[0]))),
        (1, n) | (n, 1) => n,
        (x, y) if x == y => x,
        _ => {
            return Err(VmError::new(format!(
                "operand shapes differ: {} and {}",
                type_name(a),
                type_name(b)
            )));
        }
    };
    let mut out = [0.0; 4];
    for (i, o) in out.iter_mut().enumerate().take(n as usize) {
        let x = if na == 1 { ca[0] } else { ca[i] };
        let y = if nb == 1 { cb[0] } else { cb[i] };
        *o = f(x, y);
    }
    Ok(ValueSlot::vec(n, out))
}

fn map3(
    a: ValueSlot,
    b: ValueSlot,
    c: ValueSlot,
    f: impl Fn(f64, f64, f64) -> f64,
) -> Result<ValueSlot, VmError> {
    let shapes = [a.components()?, b.components()?, c.components()?];
    let n = shapes.iter().map(|(n, _)| *n).max().unwrap_or(1);
    if shapes.iter().any(|(k, _)| *k != 1 && *k != n) {
        return Err(VmError::new(format!(
            "operand shapes differ: {}, {} and {}",
            type_name(a),
            type_name(b),
            type_name(c)
        )));
    }
    let at = |k: usize, i: usize| {
        let (len, comps) = shapes[k];
        if len == 1 { comps[0] } else { comps[i] }
    };
    if n == 1 {
        return Ok(ValueSlot::F64(f(at(0, 0), at(1, 0), at(2, 0))));
    }
    let mut out = [0.0; 4];
    for (i, o) in out.iter_mut().enumerate().take(n as usize) {
        *o = f(at(0, i), at(1, i), at(2, i));
    }
    Ok(ValueSlot::vec(n, out))
}

fn bin_arith(stack: &mut Vec<ValueSlot>, f: impl Fn(f64, f64) -> f64) -> Result<(), VmError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    stack.push(map2(a, b, f)?);
    Ok(())
}

fn bin_scalar_cmp(
    stack: &mut Vec<ValueSlot>,
    f: impl FnOnce(f64, f64) -> bool,
) -> Result<(), VmError> {
    let b = pop(stack)?.as_f64()?;
    let a = pop(stack)?.as_f64()?;
    stack.push(ValueSlot::Bool(f(a, b)));
    Ok(())
}

fn bin_eq(stack: &mut Vec<ValueSlot>, is_eq: bool) -> Result<(), VmError> {
    let b = pop(stack)?;
    let a = pop(stack)?;

    let res = match (a, b) {
        (ValueSlot::Bool(a), ValueSlot::Bool(b)) => a == b,
        (ValueSlot::F64(a), ValueSlot::F64(b)) => a == b,
        (ValueSlot::Vec { n: na, c: ca }, ValueSlot::Vec { n: nb, c: cb }) if na == nb => {
            ca == cb
        }
        (a, b) => {
            return Err(VmError::new(format!(
                "cannot compare {} with {}",
                type_name(a),
                type_name(b)
            )));
        }
    };

    stack.push(ValueSlot::Bool(if is_eq { res } else { !res }));
    Ok(())
}

fn swizzle(v: ValueSlot, len: u8, idx: [u8; 4]) -> Result<ValueSlot, VmError> {
    let (n, c) = match v {
        ValueSlot::Vec { n, c } => (n, c),
        other => {
            return Err(VmError::new(format!(
                "cannot swizzle {}",
                type_name(other)
            )));
        }
    };
    let mut out = [0.0; 4];
    for i in 0..len as usize {
        let k = idx[i];
        if k >= n {
            return Err(VmError::new(format!(
                "swizzle component {k} out of range for {}",
                type_name(v)
            )));
        }
        out[i] = c[k as usize];
    }
    if len == 1 {
        Ok(ValueSlot::F64(out[0]))
    } else {
        Ok(ValueSlot::vec(len, out))
    }
}

fn construct_vec(n: u8, args: &[ValueSlot]) -> Result<ValueSlot, VmError> {
    match args {
        [ValueSlot::F64(x)] => {
            let mut c = [0.0; 4];
            c[..n as usize].fill(*x);
            return Ok(ValueSlot::vec(n, c));
        }
        [ValueSlot::Vec { n: k, c }] if *k >= n => {
            let mut out = [0.0; 4];
            out[..n as usize].copy_from_slice(&c[..n as usize]);
            return Ok(ValueSlot::vec(n, out));
        }
        _ => {}
    }
    let mut c = [0.0; 4];
    let mut filled = 0usize;
    for &a in args {
        let (k, comps) = a.components()?;
        for &x in comps.iter().take(k as usize) {
            if filled >= n as usize {
                return Err(VmError::new(format!("too many components for vec{n}")));
            }
            c[filled] = x;
            filled += 1;
        }
    }
    if filled != n as usize {
        return Err(VmError::new(format!(
            "vec{n} needs {n} components, got {filled}"
        )));
    }
    Ok(ValueSlot::vec(n, c))
}

fn call_builtin(stack: &mut Vec<ValueSlot>, id: BuiltinId, argc: u8) -> Result<(), VmError> {
    let argc = argc as usize;
    if stack.len() < argc {
        return Err(VmError::new("stack underflow in builtin call"));
    }
    let mut args = [ValueSlot::F64(0.0); 4];
    let base = stack.len() - argc;
    args[..argc].copy_from_slice(&stack[base..]);
    stack.truncate(base);
    let args = &args[..argc];

    let out = match (id, args) {
        (BuiltinId::Sin, &[x]) => map1(x, f64::sin)?,
        (BuiltinId::Cos, &[x]) => map1(x, f64::cos)?,
        (BuiltinId::Tan, &[x]) => map1(x, f64::tan)?,
        (BuiltinId::Asin, &[x]) => map1(x, f64::asin)?,
        (BuiltinId::Acos, &[x]) => map1(x, f64::acos)?,
        (BuiltinId::Atan, &[x]) => map1(x, f64::atan)?,
        (BuiltinId::Atan, &[y, x]) => map2(y, x, f64::atan2)?,
        (BuiltinId::Pow, &[x, y]) => map2(x, y, f64::powf)?,
        (BuiltinId::Exp, &[x]) => map1(x, f64::exp)?,
        (BuiltinId::Log, &[x]) => map1(x, f64::ln)?,
        (BuiltinId::Sqrt, &[x]) => map1(x, f64::sqrt)?,
        (BuiltinId::Abs, &[x]) => map1(x, f64::abs)?,
        (BuiltinId::Sign, &[x]) => map1(x, |v| {
            if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            }
        })?,
        (BuiltinId::Floor, &[x]) => map1(x, f64::floor)?,
        (BuiltinId::Ceil, &[x]) => map1(x, f64::ceil)?,
        (BuiltinId::Fract, &[x]) => map1(x, |v| v - v.floor())?,
        (BuiltinId::Mod, &[x, y]) => map2(x, y, glsl_mod)?,
        (BuiltinId::Min, &[x, y]) => map2(x, y, f64::min)?,
        (BuiltinId::Max, &[x, y]) => map2(x, y, f64::max)?,
        (BuiltinId::Clamp, &[x, lo, hi]) => map3(x, lo, hi, |v, lo, hi| v.max(lo).min(hi))?,
        (BuiltinId::Mix, &[a, b, t]) => map3(a, b, t, |a, b, t| a + (b - a) * t)?,
        (BuiltinId::Step, &[edge, x]) => map2(edge, x, |e, v| if v < e { 0.0 } else { 1.0 })?,
        (BuiltinId::Smoothstep, &[e0, e1, x]) => map3(e0, e1, x, |e0, e1, v| {
            let t = ((v - e0) / (e1 - e0)).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        })?,
        (BuiltinId::Length, &[x]) => ValueSlot::F64(length(x)?),
        (BuiltinId::Distance, &[a, b]) => ValueSlot::F64(length(map2(a, b, |a, b| a - b)?)?),
        (BuiltinId::Dot, &[a, b]) => ValueSlot::F64(dot(a, b)?),
        (BuiltinId::Normalize, &[x]) => {
            let len = length(x)?;
            map1(x, |v| v / len)?
        }
        (BuiltinId::Float, &[x]) => match x {
            ValueSlot::F64(v) => ValueSlot::F64(v),
            ValueSlot::Bool(b) => ValueSlot::F64(if b { 1.0 } else { 0.0 }),
            ValueSlot::Vec { c, .. } => ValueSlot::F64(c[0]),
        },
        (BuiltinId::Vec2, args) => construct_vec(2, args)?,
        (BuiltinId::Vec3, args) => construct_vec(3, args)?,
        (BuiltinId::Vec4, args) => construct_vec(4, args)?,
        (id, args) => {
            return Err(VmError::new(format!(
                "{id:?} called with {} args",
                args.len()
            )));
        }
    };

    stack.push(out);
    Ok(())
}

fn dot(a: ValueSlot, b: ValueSlot) -> Result<f64, VmError> {
    let (na, ca) = a.components()?;
    let (nb, cb) = b.components()?;
    if na != nb {
        return Err(VmError::new(format!(
            "dot of {} and {}",
            type_name(a),
            type_name(b)
        )));
    }
    Ok((0..na as usize).map(|i| ca[i] * cb[i]).sum())
}

fn length(v: ValueSlot) -> Result<f64, VmError> {
    Ok(dot(v, v)?.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::compile::compile_fragment;

    fn inputs() -> FragmentInputs {
        FragmentInputs {
            frag_coord: [10.5, 20.5, 0.0, 1.0],
            resolution: [96.0, 38.0],
            mouse: [48.0, 19.0],
            time: 1.0,
        }
    }

    fn eval(src: &str) -> Result<[f32; 4], VmError> {
        let p = compile_fragment(src).unwrap();
        eval_fragment(&p, &mut VmScratch::default(), &inputs())
    }

    #[test]
    fn float_output_is_gray() {
        assert_eq!(eval("0.25").unwrap(), [0.25, 0.25, 0.25, 1.0]);
    }

    #[test]
    fn vectors_broadcast_and_swizzle() {
        let out = eval("vec4(vec2(1.0, 2.0) * 0.5, gl_FragCoord.yx / 100.0)").unwrap();
        assert_eq!(&out[..2], &[0.5, 1.0]);
        assert!((out[2] - 0.205).abs() < 1e-6);
        assert!((out[3] - 0.105).abs() < 1e-6);
        assert_eq!(eval("vec3(vec4(1.0, 0.0, 1.0, 0.0))").unwrap(), [1.0, 0.0, 1.0, 1.0]);
        let out = eval("vec3(u_resolution.x / 96.0, u_mouse / u_resolution)").unwrap();
        assert_eq!(out, [1.0, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn builtins_follow_glsl() {
        assert_eq!(eval("mod(-1.0, 3.0)").unwrap()[0], 2.0);
        assert_eq!(eval("fract(1.75)").unwrap()[0], 0.75);
        assert_eq!(eval("step(0.5, 0.4)").unwrap()[0], 0.0);
        assert_eq!(eval("smoothstep(0.0, 1.0, 0.5)").unwrap()[0], 0.5);
        assert_eq!(eval("length(vec2(3.0, 4.0)) / 10.0").unwrap()[0], 0.5);
        assert_eq!(eval("clamp(vec3(2.0, -1.0, 0.5), 0.0, 1.0)").unwrap(), [1.0, 0.0, 0.5, 1.0]);
        assert_eq!(eval("mix(0.0, 1.0, 0.25)").unwrap()[0], 0.25);
    }

    #[test]
    fn ternary_and_bindings() {
        let src = "float t = u_time; bool on = t > 0.5; on ? vec3(1.0) : vec3(0.0)";
        assert_eq!(eval(src).unwrap(), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn ill_typed_bytecode_still_faults() {
        // The compiler rejects these; the VM keeps its own checks for hand-built programs.
        let mut p = BytecodeProgram::new();
        let one = p.push_const(ConstVal::F64(1.0));
        p.locals = 1;
        p.ops = vec![
            Op::PushConst(one),
            Op::StoreLocal {
                slot: crate::expression::bytecode::LocalSlot(0),
                ty: Some(DeclType::Vec(3)),
            },
            Op::PushConst(one),
        ];
        let err = eval_fragment(&p, &mut VmScratch::default(), &inputs()).unwrap_err();
        assert_eq!(err.message, "cannot initialize vec3 with float");

        p.ops = vec![
            Op::LoadInput(InputField::Mouse),
            Op::LoadInput(InputField::FragCoord),
            Op::Add,
        ];
        assert!(eval_fragment(&p, &mut VmScratch::default(), &inputs()).is_err());

        p.ops = vec![Op::LoadInput(InputField::Mouse)];
        assert!(eval_fragment(&p, &mut VmScratch::default(), &inputs()).is_err());
    }
}
