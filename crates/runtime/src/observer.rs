//! Host callbacks
//!
//! The interpreter reports console text, output-signal writes, errors and
//! notices through an [`Observer`]. Every method has a no-op default.

use crate::error::Diagnostic;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Digital,
    Analog,
    Serial,
}

pub trait Observer {
    fn on_console_output(&mut self, _text: &str) {}

    fn on_output_change(&mut self, _kind: SignalKind, _name: &str, _value: &Value) {}

    fn on_error(&mut self, _diagnostic: &Diagnostic) {}

    /// Informational messages (ignored waits, inert directives, ...)
    fn on_notice(&mut self, _message: &str) {}
}

/// Default observer: forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_console_output(&mut self, text: &str) {
        tracing::info!(target: "splus::console", "{}", text.trim_end_matches('\n'));
    }

    fn on_output_change(&mut self, kind: SignalKind, name: &str, value: &Value) {
        tracing::debug!(?kind, name, %value, "output changed");
    }

    fn on_error(&mut self, diagnostic: &Diagnostic) {
        tracing::error!("{}", diagnostic);
    }

    fn on_notice(&mut self, message: &str) {
        tracing::debug!("{}", message);
    }
}

#[derive(Debug, Default)]
struct TranscriptLog {
    console: String,
    outputs: Vec<(SignalKind, String, Value)>,
    errors: Vec<Diagnostic>,
    notices: Vec<String>,
}

/// Recording observer with shared interior state
///
/// Clone it before handing it to the interpreter and read the recording
/// through the kept clone.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    log: Rc<RefCell<TranscriptLog>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn console(&self) -> String {
        self.log.borrow().console.clone()
    }

    pub fn outputs(&self) -> Vec<(SignalKind, String, Value)> {
        self.log.borrow().outputs.clone()
    }

    /// Most recent value written to the named output
    pub fn last_output(&self, name: &str) -> Option<Value> {
        self.log
            .borrow()
            .outputs
            .iter()
            .rev()
            .find(|(_, n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, _, v)| v.clone())
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.log.borrow().errors.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.log.borrow().notices.clone()
    }

    pub fn clear(&self) {
        *self.log.borrow_mut() = TranscriptLog::default();
    }
}

impl Observer for Transcript {
    fn on_console_output(&mut self, text: &str) {
        self.log.borrow_mut().console.push_str(text);
    }

    fn on_output_change(&mut self, kind: SignalKind, name: &str, value: &Value) {
        self.log
            .borrow_mut()
            .outputs
            .push((kind, name.to_string(), value.clone()));
    }

    fn on_error(&mut self, diagnostic: &Diagnostic) {
        self.log.borrow_mut().errors.push(diagnostic.clone());
    }

    fn on_notice(&mut self, message: &str) {
        self.log.borrow_mut().notices.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_clones_share_state() {
        let transcript = Transcript::new();
        let mut handle: Box<dyn Observer> = Box::new(transcript.clone());

        handle.on_console_output("hello ");
        handle.on_console_output("world");
        handle.on_output_change(SignalKind::Digital, "lamp", &Value::Number(1));
        handle.on_output_change(SignalKind::Digital, "lamp", &Value::Number(0));
        handle.on_error(&Diagnostic::new("bad"));

        assert_eq!(transcript.console(), "hello world");
        assert_eq!(transcript.outputs().len(), 2);
        assert_eq!(transcript.last_output("LAMP"), Some(Value::Number(0)));
        assert_eq!(transcript.errors()[0].message, "bad");

        transcript.clear();
        assert!(transcript.console().is_empty());
    }
}
