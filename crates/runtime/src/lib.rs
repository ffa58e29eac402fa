//! SIMPL+ Runtime: interpreter and simulated hardware
//!
//! Key pieces:
//! - Interpreter: loads a program, runs Main cooperatively and dispatches
//!   event handlers when inputs change
//! - Value / Scope: number-or-text values in width-typed slots
//! - Scheduler: timer heap plus stimulus inbox, on a real or virtual clock
//! - VirtualFileSystem / VirtualNetwork: sandboxed file and socket effects
//!
//! ```rust,ignore
//! use splus_runtime::{Interpreter, RuntimeConfig};
//!
//! let mut interp = Interpreter::new(RuntimeConfig::from_env());
//! interp.load(source);
//! interp.set_digital_input("power_on", 1);
//! let outcome = interp.run_main();
//! ```

pub mod builtins;
pub mod config;
pub mod devices;
pub mod error;
pub mod interpreter;
pub mod io;
pub mod observer;
pub mod scheduler;
pub mod scope;
pub mod value;
pub mod vfs;
pub mod vnet;

// Re-export key types
pub use config::{ClockMode, RuntimeConfig};
pub use error::{Diagnostic, RunOutcome};
pub use interpreter::{Interpreter, IoDeclaration, LoadResult};
pub use io::IoState;
pub use observer::{Observer, SignalKind, TracingObserver, Transcript};
pub use scheduler::{InterpreterHandle, Stimulus};
pub use value::Value;
pub use vfs::VirtualFileSystem;
pub use vnet::{SocketStatus, VirtualNetwork};
