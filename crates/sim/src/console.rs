//! Terminal observer for `splus run`

use splus_runtime::{Diagnostic, Observer, SignalKind, Value};
use std::io::{self, Write};

/// Program output on stdout, errors on stderr, notices through `tracing`
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    /// Echo output-signal writes
    pub show_outputs: bool,
}

impl ConsoleObserver {
    pub fn new(show_outputs: bool) -> Self {
        ConsoleObserver { show_outputs }
    }
}

/// `name = value`, with string values quoted and escaped
pub fn describe_output(kind: SignalKind, name: &str, value: &Value) -> String {
    match kind {
        SignalKind::Serial => format!("{} = {:?}", name, value.as_text()),
        SignalKind::Digital | SignalKind::Analog => format!("{} = {}", name, value.as_number()),
    }
}

impl Observer for ConsoleObserver {
    fn on_console_output(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn on_output_change(&mut self, kind: SignalKind, name: &str, value: &Value) {
        if self.show_outputs {
            println!("-> {}", describe_output(kind, name, value));
        }
    }

    fn on_error(&mut self, diagnostic: &Diagnostic) {
        eprintln!("error: {}", diagnostic);
    }

    fn on_notice(&mut self, message: &str) {
        tracing::info!(target: "splus::notice", "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_output() {
        assert_eq!(
            describe_output(SignalKind::Digital, "lamp", &Value::Number(1)),
            "lamp = 1"
        );
        assert_eq!(
            describe_output(SignalKind::Serial, "tx$", &Value::Text("PWR ON\r".to_string())),
            "tx$ = \"PWR ON\\r\""
        );
    }
}
