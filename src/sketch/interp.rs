use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{FrameContext, Interrupt};
use crate::sketch::ast::{BinaryOp, Expr, FuncDecl, Stmt, Target, UnaryOp};
use crate::sketch::primitives::{Host, Primitive, constants};
use crate::sketch::value::Value;

const MAX_CALL_DEPTH: usize = 64;
/// Statements and expressions being evaluated at once, across all active calls.
const MAX_EVAL_DEPTH: usize = 512;
const MAX_ARRAY_LEN: usize = 1 << 20;
const MAX_STRING_LEN: usize = 1 << 20;
/// Steps between deadline/cancellation polls.
const POLL_EVERY: u64 = 4096;

/// Why evaluation stopped early.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Abort {
    /// Uncaught error in user code.
    Fault(String),
    Interrupted(Interrupt),
}

fn fault<T>(msg: impl Into<String>) -> Result<T, Abort> {
    Err(Abort::Fault(msg.into()))
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

struct Watchdog<'a> {
    ctx: &'a FrameContext<'a>,
    max_steps: u64,
    steps: u64,
    nesting: usize,
}

impl Watchdog<'_> {
    fn descend(&mut self) -> Result<(), Abort> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return fault("RangeError: Maximum call stack size exceeded");
        }
        self.nesting += 1;
        Ok(())
    }

    fn tick(&mut self) -> Result<(), Abort> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return fault(format!(
                "step budget of {} exceeded in a single frame",
                self.max_steps
            ));
        }
        if self.steps % POLL_EVERY == 0
            && let Some(why) = self.ctx.interrupt()
        {
            return Err(Abort::Interrupted(why));
        }
        Ok(())
    }
}

/// Tree-walking interpreter for one sketch session.
///
/// Functions see their own parameters and locals plus globals; they do not capture enclosing
/// scopes.
pub(crate) struct Interpreter {
    program: Rc<[Stmt]>,
    globals: HashMap<String, Value>,
    scopes: Vec<HashMap<String, Value>>,
    depth: usize,
    pub(crate) host: Host,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("globals", &self.globals.len())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    pub(crate) fn new(program: Vec<Stmt>, seed: u64) -> Self {
        let globals = constants()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        Self {
            program: program.into(),
            globals,
            scopes: Vec::new(),
            depth: 0,
            host: Host::new(seed),
        }
    }

    /// Execute the top-level statements once.
    pub(crate) fn run_top_level(&mut self, ctx: &FrameContext<'_>, max_steps: u64) -> Result<(), Abort> {
        let program = Rc::clone(&self.program);
        let mut dog = Watchdog {
            ctx,
            max_steps,
            steps: 0,
            nesting: 0,
        };
        self.scopes.clear();
        self.depth = 0;
        self.exec_seq(&program, &mut dog)?;
        Ok(())
    }

    /// Call a global user function with no arguments. Returns `false` if it is not defined.
    pub(crate) fn call_global(
        &mut self,
        name: &str,
        ctx: &FrameContext<'_>,
        max_steps: u64,
    ) -> Result<bool, Abort> {
        let Some(Value::Func(decl)) = self.globals.get(name).cloned() else {
            return Ok(false);
        };
        let mut dog = Watchdog {
            ctx,
            max_steps,
            steps: 0,
            nesting: 0,
        };
        self.scopes.clear();
        self.depth = 0;
        self.call_function(&decl, Vec::new(), &mut dog)?;
        Ok(true)
    }

    pub(crate) fn set_frame_count(&mut self, n: u64) {
        self.host.frame_count = n;
        self.globals
            .insert("frameCount".to_owned(), Value::Num(n as f64));
    }

    #[cfg(test)]
    pub(crate) fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    fn declare(&mut self, name: &str, v: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_owned(), v);
            }
            None => {
                self.globals.insert(name.to_owned(), v);
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, Abort> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        if let Some(p) = Primitive::global(name) {
            return Ok(Value::Native(p));
        }
        fault(format!("ReferenceError: {name} is not defined"))
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains_key(name)) || self.globals.contains_key(name)
    }

    fn assign(&mut self, name: &str, v: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = v;
                return;
            }
        }
        // Undeclared assignment creates a global.
        self.globals.insert(name.to_owned(), v);
    }

    fn hoist(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            if let Stmt::Function(decl) = s {
                self.declare(&decl.name, Value::Func(Rc::clone(decl)));
            }
        }
    }

    fn exec_seq(&mut self, stmts: &[Stmt], dog: &mut Watchdog<'_>) -> Result<Flow, Abort> {
        self.hoist(stmts);
        for s in stmts {
            match self.exec(s, dog)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_scoped(&mut self, stmts: &[Stmt], dog: &mut Watchdog<'_>) -> Result<Flow, Abort> {
        self.scopes.push(HashMap::new());
        let r = self.exec_seq(stmts, dog);
        self.scopes.pop();
        r
    }

    fn exec(&mut self, s: &Stmt, dog: &mut Watchdog<'_>) -> Result<Flow, Abort> {
        dog.descend()?;
        let flow = self.exec_stmt(s, dog);
        dog.nesting -= 1;
        flow
    }

    fn exec_stmt(&mut self, s: &Stmt, dog: &mut Watchdog<'_>) -> Result<Flow, Abort> {
        dog.tick()?;
        match s {
            Stmt::Let(decls) => {
                for (name, init) in decls {
                    let v = match init {
                        Some(e) => self.eval(e, dog)?,
                        None => Value::Undefined,
                    };
                    self.declare(name, v);
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Expr(e) => {
                self.eval(e, dog)?;
                Ok(Flow::Normal)
            }
            Stmt::If { cond, then, els } => {
                if self.eval(cond, dog)?.truthy() {
                    self.exec(then, dog)
                } else if let Some(els) = els {
                    self.exec(els, dog)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, dog)?.truthy() {
                    dog.tick()?;
                    match self.exec(body, dog)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.scopes.push(HashMap::new());
                let r = self.exec_for(init.as_deref(), cond.as_ref(), step.as_ref(), body, dog);
                self.scopes.pop();
                r
            }
            Stmt::ForOf { name, iter, body } => {
                let items: Vec<Value> = match self.eval(iter, dog)? {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect(),
                    other => {
                        return fault(format!("TypeError: {} is not iterable", other.type_name()));
                    }
                };
                for item in items {
                    dog.tick()?;
                    self.scopes.push(HashMap::from([(name.clone(), item)]));
                    let r = self.exec(body, dog);
                    self.scopes.pop();
                    match r? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(e, dog)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(v))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Block(stmts) => self.exec_scoped(stmts, dog),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        dog: &mut Watchdog<'_>,
    ) -> Result<Flow, Abort> {
        if let Some(init) = init {
            self.exec(init, dog)?;
        }
        loop {
            if let Some(cond) = cond
                && !self.eval(cond, dog)?.truthy()
            {
                break;
            }
            dog.tick()?;
            match self.exec(body, dog)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(step) = step {
                self.eval(step, dog)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn call_function(
        &mut self,
        decl: &Rc<FuncDecl>,
        args: Vec<Value>,
        dog: &mut Watchdog<'_>,
    ) -> Result<Value, Abort> {
        if self.depth >= MAX_CALL_DEPTH {
            return fault("RangeError: Maximum call stack size exceeded");
        }
        dog.tick()?;

        let mut args = args.into_iter();
        let frame: HashMap<String, Value> = decl
            .params
            .iter()
            .map(|p| (p.clone(), args.next().unwrap_or(Value::Undefined)))
            .collect();

        let saved = std::mem::replace(&mut self.scopes, vec![frame]);
        self.depth += 1;
        let r = self.exec_seq(&decl.body, dog);
        self.depth -= 1;
        self.scopes = saved;

        match r? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Undefined),
        }
    }

    fn eval(&mut self, e: &Expr, dog: &mut Watchdog<'_>) -> Result<Value, Abort> {
        dog.descend()?;
        let value = self.eval_expr(e, dog);
        dog.nesting -= 1;
        value
    }

    fn eval_expr(&mut self, e: &Expr, dog: &mut Watchdog<'_>) -> Result<Value, Abort> {
        match e {
            Expr::Num(v) => Ok(Value::Num(*v)),
            Expr::Str(s) => Ok(Value::Str(Rc::clone(s))),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, dog)?);
                }
                Ok(Value::array(out))
            }
            Expr::Ident(name) => self.lookup(name),
            Expr::Member { object, name } => self.member(object, name, dog),
            Expr::Index { object, index } => {
                let obj = self.eval(object, dog)?;
                let idx = self.eval(index, dog)?;
                index_get(&obj, &idx)
            }
            Expr::Call { callee, args, .. } => self.call(callee, args, dog),
            Expr::Unary { op, expr } => {
                let v = self.eval(expr, dog)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Num(-v.to_num()),
                    UnaryOp::Plus => Value::Num(v.to_num()),
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                })
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, dog)?;
                let r = self.eval(right, dog)?;
                binary(*op, &l, &r)
            }
            Expr::Logical { and, left, right } => {
                let l = self.eval(left, dog)?;
                if l.truthy() == *and {
                    self.eval(right, dog)
                } else {
                    Ok(l)
                }
            }
            Expr::Ternary { cond, then, els } => {
                if self.eval(cond, dog)?.truthy() {
                    self.eval(then, dog)
                } else {
                    self.eval(els, dog)
                }
            }
            Expr::Assign { target, op, value } => {
                let v = self.eval(value, dog)?;
                match target {
                    Target::Ident(name) => {
                        let v = match op {
                            Some(op) => binary(*op, &self.lookup(name)?, &v)?,
                            None => v,
                        };
                        self.assign(name, v.clone());
                        Ok(v)
                    }
                    Target::Index { object, index } => {
                        let obj = self.eval(object, dog)?;
                        let idx = self.eval(index, dog)?;
                        let v = match op {
                            Some(op) => binary(*op, &index_get(&obj, &idx)?, &v)?,
                            None => v,
                        };
                        index_set(&obj, &idx, v.clone())?;
                        Ok(v)
                    }
                }
            }
            Expr::Update {
                target,
                delta,
                prefix,
            } => {
                let (old, new) = match target {
                    Target::Ident(name) => {
                        let old = self.lookup(name)?.to_num();
                        let new = old + delta;
                        self.assign(name, Value::Num(new));
                        (old, new)
                    }
                    Target::Index { object, index } => {
                        let obj = self.eval(object, dog)?;
                        let idx = self.eval(index, dog)?;
                        let old = index_get(&obj, &idx)?.to_num();
                        let new = old + delta;
                        index_set(&obj, &idx, Value::Num(new))?;
                        (old, new)
                    }
                };
                Ok(Value::Num(if *prefix { new } else { old }))
            }
        }
    }

    fn member(&mut self, object: &Expr, name: &str, dog: &mut Watchdog<'_>) -> Result<Value, Abort> {
        if let Expr::Ident(obj) = object {
            match obj.as_str() {
                "Math" if !self.is_shadowed("Math") => {
                    return Ok(Primitive::math_member(name).unwrap_or(Value::Undefined));
                }
                "console" if !self.is_shadowed("console") => {
                    return Ok(match name {
                        "log" | "info" | "warn" | "error" | "debug" => {
                            Value::Native(Primitive::Print)
                        }
                        _ => Value::Undefined,
                    });
                }
                _ => {}
            }
        }
        let v = self.eval(object, dog)?;
        match (&v, name) {
            (Value::Array(items), "length") => Ok(Value::Num(items.borrow().len() as f64)),
            (Value::Str(s), "length") => Ok(Value::Num(s.chars().count() as f64)),
            (Value::Undefined | Value::Null, _) => fault(format!(
                "TypeError: Cannot read properties of {v} (reading '{name}')"
            )),
            _ => Ok(Value::Undefined),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], dog: &mut Watchdog<'_>) -> Result<Value, Abort> {
        if let Expr::Member { object, name } = callee
            && matches!(name.as_str(), "push" | "pop" | "indexOf" | "includes")
        {
            let target = self.eval(object, dog)?;
            if let Value::Array(items) = &target {
                let args = self.eval_args(args, dog)?;
                return array_method(items, name, args);
            }
            return fault(format!(
                "TypeError: {}.{name} is not a function",
                target.type_name()
            ));
        }

        let f = self.eval(callee, dog)?;
        let args = self.eval_args(args, dog)?;
        match f {
            Value::Func(decl) => self.call_function(&decl, args, dog),
            Value::Native(p) => {
                dog.tick()?;
                self.host.call(p, &args).map_err(Abort::Fault)
            }
            other => fault(format!(
                "TypeError: {} is not a function",
                describe_callee(callee, &other)
            )),
        }
    }

    fn eval_args(&mut self, args: &[Expr], dog: &mut Watchdog<'_>) -> Result<Vec<Value>, Abort> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.eval(a, dog)?);
        }
        Ok(out)
    }
}

fn describe_callee(callee: &Expr, v: &Value) -> String {
    match callee {
        Expr::Ident(name) => name.clone(),
        Expr::Member { name, .. } => name.clone(),
        _ => v.type_name().to_owned(),
    }
}

fn array_method(
    items: &Rc<std::cell::RefCell<Vec<Value>>>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, Abort> {
    let mut items = items.borrow_mut();
    match name {
        "push" => {
            if items.len() + args.len() > MAX_ARRAY_LEN {
                return fault("RangeError: array too large");
            }
            items.extend(args);
            Ok(Value::Num(items.len() as f64))
        }
        "pop" => Ok(items.pop().unwrap_or(Value::Undefined)),
        "indexOf" | "includes" => {
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            let pos = items.iter().position(|v| v.loose_eq(&needle));
            Ok(if name == "includes" {
                Value::Bool(pos.is_some())
            } else {
                Value::Num(pos.map_or(-1.0, |p| p as f64))
            })
        }
        _ => fault(format!("TypeError: array.{name} is not a function")),
    }
}

fn array_index(idx: &Value) -> Option<usize> {
    let n = idx.to_num();
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn index_get(obj: &Value, idx: &Value) -> Result<Value, Abort> {
    match obj {
        Value::Array(items) => Ok(array_index(idx)
            .and_then(|i| items.borrow().get(i).cloned())
            .unwrap_or(Value::Undefined)),
        Value::Str(s) => Ok(array_index(idx)
            .and_then(|i| s.chars().nth(i))
            .map_or(Value::Undefined, |c| Value::str(c.encode_utf8(&mut [0; 4])))),
        Value::Undefined | Value::Null => fault(format!(
            "TypeError: Cannot read properties of {obj} (reading '{idx}')"
        )),
        _ => Ok(Value::Undefined),
    }
}

fn index_set(obj: &Value, idx: &Value, v: Value) -> Result<(), Abort> {
    let Value::Array(items) = obj else {
        return fault(format!(
            "TypeError: Cannot set properties of {} (setting '{idx}')",
            obj.type_name()
        ));
    };
    let Some(i) = array_index(idx) else {
        return fault(format!("RangeError: invalid array index {idx}"));
    };
    if i >= MAX_ARRAY_LEN {
        return fault("RangeError: array too large");
    }
    let mut items = items.borrow_mut();
    if i >= items.len() {
        items.resize(i + 1, Value::Undefined);
    }
    items[i] = v;
    Ok(())
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, Abort> {
    let is_text = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_));
    Ok(match op {
        BinaryOp::Add if is_text(l) || is_text(r) => {
            let s = format!("{l}{r}");
            if s.len() > MAX_STRING_LEN {
                return fault("RangeError: Invalid string length");
            }
            Value::Str(Rc::from(s))
        }
        BinaryOp::Add => Value::Num(l.to_num() + r.to_num()),
        BinaryOp::Sub => Value::Num(l.to_num() - r.to_num()),
        BinaryOp::Mul => Value::Num(l.to_num() * r.to_num()),
        BinaryOp::Div => Value::Num(l.to_num() / r.to_num()),
        BinaryOp::Mod => Value::Num(l.to_num() % r.to_num()),
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = match (l, r) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => l.to_num().partial_cmp(&r.to_num()),
            };
            let Some(ord) = ord else {
                return Ok(Value::Bool(false));
            };
            Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            })
        }
    })
}
