use std::time::{SystemTime, UNIX_EPOCH};

use wasmtime::{
    Config, Engine, ExternType, Instance, Linker, Memory, MemoryType, MemoryTypeBuilder, Module,
    Store, Trap, TypedFunc, ValType,
};

use crate::backend::{Backend, FrameContext, FrameStep, not_initialized};
use crate::foundation::core::{FRAME_BYTES, FrameIndex};
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::encoder::NativePixels;
use crate::session::config::RenderConfig;
use crate::show::ShowKind;

/// The host never calls `next_frame` more often than this per session.
pub const MAX_CALLS: u64 = 100;
/// Offset of the frame window inside the host memory.
pub const WINDOW_OFFSET: usize = 0;
/// Host memory uses one-byte pages, so its size in pages is its size in bytes.
const PAGE_SIZE_LOG2: u8 = 0;

const IMPORT_MODULE: &str = "env";
const MEMORY_NAME: &str = "memory";
const UNIXTIME_NAME: &str = "unixtime";
const ENTRY_POINT: &str = "next_frame";

const WASM_MAGIC: &[u8] = b"\0asm";

/// Final-frame status returned by `next_frame`.
const STATUS_LAST: i32 = 1;

struct Session {
    store: Store<()>,
    memory: Memory,
    next_frame: TypedFunc<(i32, i32), i32>,
    fuel: u64,
}

/// Hosts a WebAssembly control module under fuel metering.
///
/// The module imports `env.memory`, a fixed 456-byte memory with one-byte pages
/// (`(memory 456 456 (pagesize 1))` in text form), and exports
/// `next_frame(frame: i32, ptr: i32) -> i32`. The memory is exactly the frame window, so any
/// access outside it traps in the engine. Each call receives the 0-based call number and the
/// window offset; the host zeroes the window before the call and reads it back after.
#[derive(Default)]
pub struct ByteProgramBackend {
    session: Option<Session>,
    finished: bool,
}

impl std::fmt::Debug for ByteProgramBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteProgramBackend")
            .field("initialized", &self.session.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

impl ByteProgramBackend {
    /// Unbound byte-program backend.
    pub fn new() -> Self {
        Self::default()
    }
}

fn engine() -> RiterResult<Engine> {
    let mut cfg = Config::new();
    cfg.consume_fuel(true)
        .wasm_multi_memory(false)
        .wasm_custom_page_sizes(true);
    Engine::new(&cfg).map_err(|e| RiterError::Other(e.context("create wasm engine")))
}

fn window_memory_type() -> RiterResult<MemoryType> {
    let size = FRAME_BYTES as u64;
    MemoryTypeBuilder::new()
        .page_size_log2(PAGE_SIZE_LOG2)
        .min(size)
        .max(Some(size))
        .build()
        .map_err(|e| RiterError::Other(e.context("frame memory type")))
}

/// The imported memory must use one-byte pages and fit inside the window.
fn check_memory_import(ty: &MemoryType) -> RiterResult<()> {
    if ty.page_size_log2() != PAGE_SIZE_LOG2
        || ty.is_64()
        || ty.is_shared()
        || ty.minimum() > FRAME_BYTES as u64
    {
        return Err(RiterError::compile(format!(
            "env.memory must be imported as (memory {FRAME_BYTES} {FRAME_BYTES} (pagesize 1))"
        )));
    }
    Ok(())
}

/// Only `env.memory` and `env.unixtime` may be imported.
fn check_imports(module: &Module) -> RiterResult<()> {
    let mut has_memory = false;
    for import in module.imports() {
        let (m, n) = (import.module(), import.name());
        match (m, n, import.ty()) {
            (IMPORT_MODULE, MEMORY_NAME, ExternType::Memory(ty)) => {
                check_memory_import(&ty)?;
                has_memory = true;
            }
            (IMPORT_MODULE, UNIXTIME_NAME, ExternType::Func(ft))
                if ft.params().len() == 0
                    && ft.results().len() == 1
                    && ft.results().all(|r| matches!(r, ValType::I64)) => {}
            (IMPORT_MODULE, UNIXTIME_NAME, _) => {
                return Err(RiterError::compile("env.unixtime must have type () -> i64"));
            }
            _ => {
                return Err(RiterError::compile(format!(
                    "unsupported import {m}.{n}; only env.memory and env.unixtime are provided"
                )));
            }
        }
    }
    if module
        .exports()
        .any(|e| matches!(e.ty(), ExternType::Memory(_)))
        || !has_memory
    {
        return Err(RiterError::compile(
            "module must import its memory as env.memory and may not define its own",
        ));
    }
    Ok(())
}

/// Source is WebAssembly text, or a binary module encoded as base64.
fn module_bytes(source: &str) -> Vec<u8> {
    use base64::Engine as _;
    let trimmed = source.trim();
    if !trimmed.starts_with('(')
        && let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(trimmed)
        && bytes.starts_with(WASM_MAGIC)
    {
        return bytes;
    }
    source.as_bytes().to_vec()
}

fn unixtime() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Map a failed call onto the error taxonomy.
fn call_error(err: wasmtime::Error, call: u64) -> RiterError {
    match err.downcast_ref::<Trap>() {
        Some(Trap::MemoryOutOfBounds) => {
            RiterError::trap(format!("call {call}: memory access outside the frame window"))
        }
        Some(Trap::OutOfFuel) => {
            RiterError::runtime(format!("call {call}: fuel exhausted in a single frame"))
        }
        Some(trap) => RiterError::runtime(format!("call {call}: {trap}")),
        None => RiterError::runtime(format!("call {call}: {err:#}")),
    }
}

impl Session {
    fn instantiate(source: &str, fuel: u64) -> RiterResult<Self> {
        let engine = engine()?;
        let module = Module::new(&engine, module_bytes(source))
            .map_err(|e| RiterError::compile(format!("invalid module: {e:#}")))?;
        check_imports(&module)?;

        let mut store = Store::new(&engine, ());
        store
            .set_fuel(fuel)
            .map_err(|e| RiterError::Other(e.context("set fuel")))?;
        let memory = Memory::new(&mut store, window_memory_type()?)
            .map_err(|e| RiterError::Other(e.context("allocate frame memory")))?;

        let mut linker: Linker<()> = Linker::new(&engine);
        linker
            .define(&store, IMPORT_MODULE, MEMORY_NAME, memory)
            .map_err(|e| RiterError::Other(e.context("define env.memory")))?;
        linker
            .func_wrap(IMPORT_MODULE, UNIXTIME_NAME, unixtime)
            .map_err(|e| RiterError::Other(e.context("define env.unixtime")))?;

        // Data segments past the window fail here.
        let instance: Instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| RiterError::compile(format!("instantiate: {e:#}")))?;
        let next_frame = instance
            .get_typed_func::<(i32, i32), i32>(&mut store, ENTRY_POINT)
            .map_err(|_| {
                RiterError::compile("missing export next_frame(frame: i32, ptr: i32) -> i32")
            })?;

        Ok(Self {
            store,
            memory,
            next_frame,
            fuel,
        })
    }

    fn call(&mut self, call: u64) -> RiterResult<(i32, Box<[u8; FRAME_BYTES]>)> {
        let window = WINDOW_OFFSET..WINDOW_OFFSET + FRAME_BYTES;
        self.memory.data_mut(&mut self.store)[window.clone()].fill(0);
        self.store
            .set_fuel(self.fuel)
            .map_err(|e| RiterError::Other(e.context("set fuel")))?;

        let frame_arg = i32::try_from(call).unwrap_or(i32::MAX);
        let ptr_arg = WINDOW_OFFSET as i32;
        let status = self
            .next_frame
            .call(&mut self.store, (frame_arg, ptr_arg))
            .map_err(|e| call_error(e, call))?;

        let data = self.memory.data(&self.store);
        let mut out = Box::new([0u8; FRAME_BYTES]);
        out.copy_from_slice(&data[window]);
        Ok((status, out))
    }
}

impl Backend for ByteProgramBackend {
    fn kind(&self) -> ShowKind {
        ShowKind::ByteProgram
    }

    #[tracing::instrument(skip_all, fields(len = source.len()))]
    fn initialize(&mut self, source: &str, config: &RenderConfig) -> RiterResult<()> {
        self.session = Some(Session::instantiate(source, config.max_steps_per_frame)?);
        self.finished = false;
        tracing::debug!("byte-program instantiated");
        Ok(())
    }

    fn produce_frame(
        &mut self,
        index: FrameIndex,
        ctx: &FrameContext<'_>,
    ) -> RiterResult<FrameStep> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| not_initialized(ShowKind::ByteProgram))?;
        if self.finished || index.0 >= MAX_CALLS {
            return Ok(FrameStep::Finished);
        }
        if let Some(why) = ctx.interrupt() {
            return Ok(FrameStep::Interrupted(why));
        }
        let (status, bytes) = session.call(index.0)?;
        if status == STATUS_LAST {
            self.finished = true;
        }
        Ok(FrameStep::Frame(NativePixels::Packed(bytes)))
    }

    fn frame_ceiling(&self) -> Option<u64> {
        Some(MAX_CALLS)
    }
}
