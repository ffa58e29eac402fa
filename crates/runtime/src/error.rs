//! Runtime error and control-flow types
//!
//! Three outcomes must stay distinguishable to a host: the step ceiling
//! (an error), a user stop (informational) and `TerminateEvent` (silent).
//! Statement execution returns `Exec<Flow>`; everything that unwinds past a
//! function boundary travels in the `Err` side as an [`Unwind`].

use crate::value::Value;
use splusc::ParseError;
use splusc::ast::Position;
use std::fmt;

pub const STOPPED_MESSAGE: &str = "stopped by user";
pub const STEP_LIMIT_MESSAGE: &str = "exceeded step limit";

/// A message with an optional source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            line: None,
            col: None,
        }
    }

    pub fn at(message: impl Into<String>, pos: Position) -> Self {
        Diagnostic {
            message: message.into(),
            line: Some(pos.line),
            col: Some(pos.col),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.col) {
            (Some(line), Some(col)) => write!(f, "line {}, col {}: {}", line, col, self.message),
            (Some(line), None) => write!(f, "line {}: {}", line, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        Diagnostic {
            message: err.message.clone(),
            line: Some(err.line),
            col: Some(err.col),
        }
    }
}

/// Normal completion of a statement or block
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    /// Leaves the nearest loop or switch
    Break,
    /// Leaves the enclosing function with a value
    Return(Value),
}

/// Abnormal exits that propagate through every frame
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    /// `TerminateEvent`; swallowed at the top of the running handler
    Terminate,
    StepLimit,
    /// Stop requested by the host while Main was running
    Aborted,
    Fault(Diagnostic),
}

impl Unwind {
    pub fn fault(message: impl Into<String>) -> Self {
        Unwind::Fault(Diagnostic::new(message))
    }

    /// Attach a position to a fault that has none yet
    pub fn located(self, pos: Position) -> Self {
        match self {
            Unwind::Fault(d) if d.line.is_none() => Unwind::Fault(Diagnostic {
                line: Some(pos.line),
                col: Some(pos.col),
                ..d
            }),
            other => other,
        }
    }
}

pub type Exec<T> = Result<T, Unwind>;

/// How a `run_main` call ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    StepLimitExceeded,
    Failed(Diagnostic),
    /// The program declares no Main function
    NoMain,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::NoMain)
    }

    pub fn message(&self) -> String {
        match self {
            RunOutcome::Completed => "completed".to_string(),
            RunOutcome::Stopped => STOPPED_MESSAGE.to_string(),
            RunOutcome::StepLimitExceeded => STEP_LIMIT_MESSAGE.to_string(),
            RunOutcome::Failed(d) => d.to_string(),
            RunOutcome::NoMain => "no Main function".to_string(),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
