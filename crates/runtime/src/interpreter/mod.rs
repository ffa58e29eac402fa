//! Tree-walking interpreter
//!
//! An [`Interpreter`] loads one program and then reacts to two kinds of
//! stimulus:
//!
//! - `run_main()` executes Main in **cooperative** mode. `Wait`, `Delay`
//!   and `ProcessLogic` suspend it; while suspended the scheduler delivers
//!   queued stimulus and due timers, which run their handlers to
//!   completion before Main resumes.
//! - Input setters (`set_digital_input` and friends) dispatch matching
//!   event handlers synchronously in **immediate** mode, where nothing
//!   can suspend.
//!
//! The implementation is split by concern:
//! - `exec`: statements and user function calls
//! - `eval`: expressions, slot resolution and the built-in context
//! - `intrinsics`: scheduling, file and socket operations
//! - `tasks`: input dispatch, timers and the suspension pump

mod eval;
mod exec;
mod intrinsics;
mod tasks;

use crate::builtins::GatherBuffers;
use crate::config::RuntimeConfig;
use crate::error::{Diagnostic, Exec, RunOutcome, STEP_LIMIT_MESSAGE, Unwind};
use crate::io::IoState;
use crate::observer::{Observer, TracingObserver};
use crate::scheduler::{InterpreterHandle, Scheduler, Stimulus, TimerId};
use crate::scope::{Frame, Scope, SlotKey, SlotKind, MAX_STRING_CAPACITY};
use crate::value::Value;
use crate::vfs::{self, VirtualFileSystem};
use crate::vnet::{Protocol, SocketRole, VirtualNetwork};
use splusc::ast::{IoType, Program, Stmt, Trigger, VarType};
use splusc::{ParseError, parse_program};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receive buffer size of a socket declared without one
const DEFAULT_SOCKET_BUFFER: usize = 65534;

/// Upper bound on timer rounds one `settle()` call processes
const SETTLE_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Main: may suspend, honours the abort flag
    Cooperative,
    /// Handlers, wait bodies, spawned threads
    Immediate,
}

/// A scheduled `Wait` body and the frames it captured
#[derive(Debug, Clone)]
struct PendingWait {
    timer: TimerId,
    body: Vec<Stmt>,
    frames: Vec<Frame>,
}

/// One expanded I/O signal reported by `load`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoDeclaration {
    pub io_type: IoType,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub io_declarations: Vec<IoDeclaration>,
    pub parse_errors: Vec<ParseError>,
}

impl LoadResult {
    pub fn is_ok(&self) -> bool {
        self.parse_errors.is_empty()
    }
}

pub struct Interpreter {
    config: RuntimeConfig,
    observer: Box<dyn Observer>,
    program: Rc<Program>,
    scope: Scope,
    /// Uppercase name → value, user and system constants
    constants: HashMap<String, Value>,
    io: IoState,
    /// Socket variable → socket id
    sockets: HashMap<String, i64>,
    handlers: HashMap<(Trigger, String), Vec<usize>>,
    functions: HashMap<String, usize>,
    last_modified: HashMap<String, i64>,
    last_any: i64,
    gather: GatherBuffers,
    waits: HashMap<String, PendingWait>,
    anonymous_waits: u64,
    critical: HashSet<String>,
    scheduler: Scheduler,
    vfs: VirtualFileSystem,
    net: VirtualNetwork,
    abort: Arc<AtomicBool>,
    mode: Mode,
    steps: u64,
    depth: usize,
    /// Fault raised inside a built-in's variable write
    pending_fault: Option<Diagnostic>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("steps", &self.steps)
            .field("pending_timers", &self.scheduler.pending())
            .finish()
    }
}

impl Interpreter {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }

    pub fn with_observer(config: RuntimeConfig, observer: impl Observer + 'static) -> Self {
        let scheduler = Scheduler::new(config.clock);
        Interpreter {
            config,
            observer: Box::new(observer),
            program: Rc::new(Program::new()),
            scope: Scope::new(),
            constants: HashMap::new(),
            io: IoState::new(),
            sockets: HashMap::new(),
            handlers: HashMap::new(),
            functions: HashMap::new(),
            last_modified: HashMap::new(),
            last_any: 0,
            gather: GatherBuffers::default(),
            waits: HashMap::new(),
            anonymous_waits: 0,
            critical: HashSet::new(),
            scheduler,
            vfs: VirtualFileSystem::new(),
            net: VirtualNetwork::new(),
            abort: Arc::new(AtomicBool::new(false)),
            mode: Mode::Immediate,
            steps: 0,
            depth: 0,
            pending_fault: None,
        }
    }

    pub fn set_observer(&mut self, observer: impl Observer + 'static) {
        self.observer = Box::new(observer);
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Replace the loaded program with `source`
    ///
    /// Parse errors are reported through the observer and returned; the
    /// best-effort program is loaded regardless.
    pub fn load(&mut self, source: &str) -> LoadResult {
        self.reset();

        let parsed = parse_program(source, &self.config.defines);
        for err in &parsed.errors {
            self.observer.on_error(&Diagnostic::from(err));
        }
        for notice in &parsed.notices {
            self.emit_notice(&format!("line {}: {}", notice.line, notice.message));
        }
        let program = Rc::new(parsed.program);
        self.program = Rc::clone(&program);

        for constant in &program.constants {
            let value = match &constant.value {
                splusc::ast::Literal::Number(n) => Value::Number(*n),
                splusc::ast::Literal::Text(s) => Value::Text(s.clone()),
            };
            self.constants
                .insert(constant.name.to_ascii_uppercase(), value);
        }

        let mut io_declarations = Vec::new();
        for decl in &program.io {
            for entry in &decl.names {
                let capacity = if decl.io_type.is_serial() {
                    entry.capacity
                } else {
                    None
                };
                let names: Vec<String> = match entry.array_size {
                    Some(n) => (1..=n).map(|i| format!("{}[{}]", entry.name, i)).collect(),
                    None => vec![entry.name.clone()],
                };
                for name in names {
                    self.io.declare(decl.io_type, &name, capacity);
                    io_declarations.push(IoDeclaration {
                        io_type: decl.io_type,
                        name,
                    });
                }
            }
        }

        for decl in &program.globals {
            if decl.ty.is_socket() {
                self.declare_socket(&decl.name, &decl.ty, decl.array_size);
                continue;
            }
            if let Err(message) = self
                .scope
                .globals_mut()
                .declare_var(decl, &program.structs)
            {
                self.observer.on_error(&Diagnostic::at(message, decl.pos));
            }
        }

        for (idx, handler) in program.events.iter().enumerate() {
            self.handlers
                .entry((handler.trigger, handler.signal.to_ascii_uppercase()))
                .or_default()
                .push(idx);
        }
        for (idx, function) in program.functions.iter().enumerate() {
            self.functions
                .insert(function.name.to_ascii_uppercase(), idx);
        }

        self.seed_system_constants();

        info!(
            signals = io_declarations.len(),
            globals = program.globals.len(),
            handlers = program.events.len(),
            functions = program.functions.len(),
            has_main = program.main.is_some(),
            errors = parsed.errors.len(),
            "program loaded"
        );

        LoadResult {
            io_declarations,
            parse_errors: parsed.errors,
        }
    }

    fn declare_socket(&mut self, name: &str, ty: &VarType, buffer: Option<usize>) {
        let (protocol, role) = match ty {
            VarType::TcpServer => (Protocol::Tcp, SocketRole::Server),
            VarType::UdpSocket => (Protocol::Udp, SocketRole::Client),
            _ => (Protocol::Tcp, SocketRole::Client),
        };
        let id = self.net.create(protocol, role);
        let upper = name.to_ascii_uppercase();
        self.sockets.insert(upper.clone(), id);
        self.scope.globals_mut().declare(
            SlotKey::Field(upper, "SOCKETRXBUF".to_string()),
            SlotKind::Str {
                capacity: buffer.unwrap_or(DEFAULT_SOCKET_BUFFER),
            },
        );
    }

    fn seed_system_constants(&mut self) {
        let name = self.program.symbol_name.clone().unwrap_or_default();
        let text = [
            ("_PROGRAM_NAME", name),
            ("_HOST_NAME", "SIMULATOR".to_string()),
            ("_HOST_ADDRESS", "127.0.0.1".to_string()),
        ];
        for (key, value) in text {
            self.constants.insert(key.to_string(), Value::Text(value));
        }
        let numbers = [
            ("_O_RDONLY", vfs::O_RDONLY),
            ("_O_WRONLY", vfs::O_WRONLY),
            ("_O_RDWR", vfs::O_RDWR),
            ("_O_APPEND", vfs::O_APPEND),
            ("_O_CREAT", vfs::O_CREAT),
            ("_O_TRUNC", vfs::O_TRUNC),
            ("_O_TEXT", vfs::O_TEXT),
            ("_O_BINARY", vfs::O_BINARY),
            ("SEEK_SET", vfs::SEEK_SET),
            ("SEEK_CUR", vfs::SEEK_CUR),
            ("SEEK_END", vfs::SEEK_END),
        ];
        for (key, value) in numbers {
            self.constants.insert(key.to_string(), Value::Number(value));
        }
    }

    /// Drop the program, every table, pending timers, files and sockets
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.program = Rc::new(Program::new());
        self.scope.clear();
        self.constants.clear();
        self.io.clear();
        self.sockets.clear();
        self.handlers.clear();
        self.functions.clear();
        self.last_modified.clear();
        self.last_any = 0;
        self.gather.clear();
        self.waits.clear();
        self.anonymous_waits = 0;
        self.critical.clear();
        self.vfs.clear();
        self.net.clear();
        self.mode = Mode::Immediate;
        self.steps = 0;
        self.depth = 0;
        self.pending_fault = None;
        debug!("interpreter reset");
    }

    /// Run Main to completion, a stop request, the step limit or a fault
    pub fn run_main(&mut self) -> RunOutcome {
        self.abort.store(false, Ordering::SeqCst);
        let program = Rc::clone(&self.program);
        let Some(main) = program.main.as_ref() else {
            return RunOutcome::NoMain;
        };

        let mut frame = Frame::new();
        for local in &main.locals {
            if let Err(message) = frame.declare_var(local, &program.structs) {
                let diagnostic = Diagnostic::at(message, local.pos);
                self.observer.on_error(&diagnostic);
                return RunOutcome::Failed(diagnostic);
            }
        }

        info!("Main started");
        let saved = self.scope.replace_frames(vec![frame]);
        self.mode = Mode::Cooperative;
        self.steps = 0;
        self.depth = 0;

        let result = self.exec_block(&main.body);

        self.scope.replace_frames(saved);
        self.mode = Mode::Immediate;

        let outcome = match result {
            Ok(_) | Err(Unwind::Terminate) => RunOutcome::Completed,
            Err(Unwind::Aborted) => RunOutcome::Stopped,
            Err(Unwind::StepLimit) => {
                self.observer.on_error(&Diagnostic::new(STEP_LIMIT_MESSAGE));
                RunOutcome::StepLimitExceeded
            }
            Err(Unwind::Fault(diagnostic)) => {
                self.observer.on_error(&diagnostic);
                RunOutcome::Failed(diagnostic)
            }
        };
        info!(steps = self.steps, %outcome, "Main finished");
        outcome
    }

    /// Ask a running Main to unwind at its next step
    pub fn stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Cloneable, thread-safe control handle
    pub fn handle(&self) -> InterpreterHandle {
        InterpreterHandle::new(self.scheduler.sender(), Arc::clone(&self.abort))
    }

    // ------------------------------------------------------------------
    // Host-driven time
    // ------------------------------------------------------------------

    /// Let `duration` pass, running every timer and stimulus due in it
    pub fn advance(&mut self, duration: Duration) {
        let deadline = self.scheduler.now() + duration;
        self.drive(deadline);
    }

    /// Run timers until none are pending
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_LIMIT {
            self.drain_inbox();
            match self.scheduler.next_due() {
                Some(due) => self.drive(due),
                None => return,
            }
        }
        warn!(pending = self.scheduler.pending(), "settle gave up with timers still pending");
    }

    /// Deliver `stimulus` after `delay` of interpreter time
    pub fn schedule_stimulus(&mut self, delay: Duration, stimulus: Stimulus) -> TimerId {
        self.scheduler
            .schedule(delay, crate::scheduler::TimerTask::Stimulus(stimulus))
    }

    /// Current interpreter time
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    fn drive(&mut self, deadline: Duration) {
        // Outside Main nothing unwinds except a queued stop, which is moot
        if let Err(unwind) = self.pump_until(deadline) {
            debug!(?unwind, "host pump interrupted");
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn io(&self) -> &IoState {
        &self.io
    }

    pub fn filesystem(&self) -> &VirtualFileSystem {
        &self.vfs
    }

    pub fn filesystem_mut(&mut self) -> &mut VirtualFileSystem {
        &mut self.vfs
    }

    pub fn network(&self) -> &VirtualNetwork {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut VirtualNetwork {
        &mut self.net
    }

    /// Current value of a global, constant or signal by its display form
    /// (`level`, `vals[2]`, `preset.name`)
    pub fn value_of(&self, path: &str) -> Option<Value> {
        let key = SlotKey::parse(path)?;
        self.read_key(&key).ok()
    }

    /// Socket id bound to a socket variable
    pub fn socket_id(&self, variable: &str) -> Option<i64> {
        self.sockets.get(&variable.to_ascii_uppercase()).copied()
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn emit_notice(&mut self, message: &str) {
        debug!("notice: {}", message);
        self.observer.on_notice(message);
    }

    fn report(&mut self, diagnostic: &Diagnostic) {
        warn!("{}", diagnostic);
        self.observer.on_error(diagnostic);
    }

    /// Count one statement or expression step
    fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.steps > self.config.step_limit {
            return Err(Unwind::StepLimit);
        }
        self.check_abort()
    }

    fn check_abort(&self) -> Exec<()> {
        if self.mode == Mode::Cooperative && self.abort.load(Ordering::SeqCst) {
            return Err(Unwind::Aborted);
        }
        Ok(())
    }

    /// Run `f` on a fresh frame stack in immediate mode with its own step
    /// budget, restoring the caller's state afterwards
    fn run_isolated<T>(
        &mut self,
        frames: Vec<Frame>,
        f: impl FnOnce(&mut Self) -> Exec<T>,
    ) -> Exec<T> {
        let saved_frames = self.scope.replace_frames(frames);
        let saved_mode = std::mem::replace(&mut self.mode, Mode::Immediate);
        let saved_steps = std::mem::replace(&mut self.steps, 0);
        let saved_depth = std::mem::replace(&mut self.depth, 0);

        let result = f(self);

        self.scope.replace_frames(saved_frames);
        self.mode = saved_mode;
        self.steps = saved_steps;
        self.depth = saved_depth;
        result
    }

    /// Report how a handler, wait body or thread ended
    fn finish_background<T>(&mut self, what: &str, result: Exec<T>) {
        match result {
            Ok(_) | Err(Unwind::Terminate) | Err(Unwind::Aborted) => {}
            Err(Unwind::StepLimit) => {
                warn!("{}: {}", what, STEP_LIMIT_MESSAGE);
                self.observer.on_error(&Diagnostic::new(STEP_LIMIT_MESSAGE));
            }
            Err(Unwind::Fault(diagnostic)) => {
                warn!("{} failed", what);
                self.report(&diagnostic);
            }
        }
    }
}

/// Text slots of any width accept parameter values unchanged
fn param_kind(ty: &VarType) -> SlotKind {
    SlotKind::for_type(ty, MAX_STRING_CAPACITY)
}
