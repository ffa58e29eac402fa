//! Input dispatch, timer tasks and the suspension pump

use super::intrinsics::pulse_key;
use super::Interpreter;
use crate::error::{Exec, Unwind};
use crate::io::IoSignal;
use crate::scheduler::{Stimulus, TimerTask};
use crate::scope::{Frame, SlotKey};
use crate::value::Value;
use splusc::ast::{IoType, Trigger};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

impl Interpreter {
    // ------------------------------------------------------------------
    // Input setters
    // ------------------------------------------------------------------

    /// Drive a digital input; 0→1 fires PUSH, 1→0 fires RELEASE
    pub fn set_digital_input(&mut self, name: &str, value: i64) {
        let Some(signal) = self.input_signal(name, &[IoType::DigitalInput]) else {
            return;
        };
        let new = signal.coerce(Value::Number(value));
        if self.io.value(&signal.name) == Some(&new) {
            return;
        }
        let trigger = if new.is_truthy() {
            Trigger::Push
        } else {
            Trigger::Release
        };
        self.store_input(&signal, new);
        self.dispatch_signal(trigger, &signal);
    }

    /// Drive an analog input; fires CHANGE when the value differs
    pub fn set_analog_input(&mut self, name: &str, value: i64) {
        let Some(signal) = self.input_signal(name, &[IoType::AnalogInput]) else {
            return;
        };
        let new = signal.coerce(Value::Number(value));
        if self.io.value(&signal.name) == Some(&new) {
            return;
        }
        self.store_input(&signal, new);
        self.dispatch_signal(Trigger::Change, &signal);
    }

    /// Drive a string input (replace, CHANGE on difference) or a buffer
    /// input (append, always CHANGE)
    pub fn set_string_input(&mut self, name: &str, value: &str) {
        let Some(signal) =
            self.input_signal(name, &[IoType::StringInput, IoType::BufferInput])
        else {
            return;
        };
        let current = self
            .io
            .value(&signal.name)
            .map(Value::as_text)
            .unwrap_or_default();
        let new = if signal.io_type == IoType::BufferInput {
            signal.coerce(Value::Text(current + value))
        } else {
            let new = signal.coerce(Value::from(value));
            if new.as_text() == current {
                return;
            }
            new
        };
        self.store_input(&signal, new);
        self.dispatch_signal(Trigger::Change, &signal);
    }

    fn input_signal(&mut self, name: &str, accepted: &[IoType]) -> Option<IoSignal> {
        match self.io.signal(name) {
            Some(signal) if accepted.contains(&signal.io_type) => Some(signal.clone()),
            Some(signal) => {
                let message = format!("'{}' is not a {:?}", signal.name, accepted[0]);
                self.emit_notice(&message);
                None
            }
            None => {
                self.emit_notice(&format!("Unknown input '{}'", name));
                None
            }
        }
    }

    fn store_input(&mut self, signal: &IoSignal, value: Value) {
        self.io.store(signal, value);
        if let (Some(base), Some(index)) = (signal.base_name(), signal.index()) {
            self.track_index(&SlotKey::indexed(base, index));
        }
    }

    fn apply_stimulus(&mut self, stimulus: Stimulus) {
        match stimulus {
            Stimulus::Digital { name, value } => self.set_digital_input(&name, value),
            Stimulus::Analog { name, value } => self.set_analog_input(&name, value),
            Stimulus::Serial { name, value } => self.set_string_input(&name, &value),
            Stimulus::Stop => self.stop(),
        }
    }

    // ------------------------------------------------------------------
    // Handler dispatch
    // ------------------------------------------------------------------

    /// Handlers on the exact signal and, for array elements, on the base
    fn dispatch_signal(&mut self, trigger: Trigger, signal: &IoSignal) {
        let mut names = vec![signal.name.to_ascii_uppercase()];
        if let Some(base) = signal.base_name() {
            names.push(base.to_ascii_uppercase());
        }
        self.dispatch(trigger, &names);
    }

    /// Run every matching handler in declaration order
    fn dispatch(&mut self, trigger: Trigger, names: &[String]) {
        let mut indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.handlers.get(&(trigger, name.clone())))
            .flatten()
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();

        let program = Rc::clone(&self.program);
        for idx in indices {
            let Some(handler) = program.events.get(idx) else {
                continue;
            };
            debug!(%trigger, signal = %handler.signal, "dispatching handler");
            let result = self.run_isolated(Vec::new(), |this| {
                let mut frame = Frame::new();
                for local in &handler.locals {
                    frame
                        .declare_var(local, &program.structs)
                        .map_err(|message| Unwind::fault(message).located(local.pos))?;
                }
                this.scope.push(frame);
                this.exec_block(&handler.body)
            });
            self.finish_background(&format!("{} {}", trigger, handler.signal), result);
        }
    }

    fn dispatch_socket(&mut self, trigger: Trigger, id: i64) {
        let mut names: Vec<String> = self
            .sockets
            .iter()
            .filter(|(_, socket)| **socket == id)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        self.dispatch(trigger, &names);
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn run_task(&mut self, task: TimerTask) {
        debug!(?task, "timer fired");
        match task {
            TimerTask::WaitBody { label } => {
                let Some(pending) = self.waits.remove(&label) else {
                    return;
                };
                let body = pending.body;
                let result = self.run_isolated(pending.frames, |this| this.exec_block(&body));
                self.finish_background(&format!("Wait {}", label), result);
            }
            TimerTask::Spawn { function } => {
                let Some(&idx) = self.functions.get(&function) else {
                    return;
                };
                let result = self.run_isolated(Vec::new(), |this| this.call_user(idx, &[]));
                // Thread failures are logged only
                match result {
                    Ok(_) | Err(Unwind::Terminate) => {}
                    Err(unwind) => warn!(%function, ?unwind, "thread ended abnormally"),
                }
            }
            TimerTask::PulseEnd { output } => {
                let result = self.write_key(&pulse_key(&output), Value::zero());
                self.finish_background(&format!("Pulse {}", output), result);
            }
            TimerTask::Stimulus(stimulus) => self.apply_stimulus(stimulus),
            TimerTask::SocketConnected { id } => {
                if self.net.complete_connect(id) {
                    self.dispatch_socket(Trigger::SocketConnect, id);
                }
            }
            TimerTask::SocketDeliver { id, data } => {
                if !self.net.deliver(id, &data) {
                    return;
                }
                let owners: Vec<String> = self
                    .sockets
                    .iter()
                    .filter(|(_, socket)| **socket == id)
                    .map(|(name, _)| name.clone())
                    .collect();
                for owner in owners {
                    let key = SlotKey::Field(owner, "SOCKETRXBUF".to_string());
                    if let Some(slot) = self.scope.globals_mut().get_mut(&key) {
                        let appended = slot.value.as_text() + &data;
                        slot.set(Value::Text(appended));
                    }
                }
                self.dispatch_socket(Trigger::SocketReceive, id);
            }
            TimerTask::SocketEvent { trigger, id } => self.dispatch_socket(trigger, id),
        }
    }

    fn accept(&mut self, stimulus: Stimulus) -> Exec<()> {
        if stimulus == Stimulus::Stop {
            self.stop();
            return self.check_abort();
        }
        self.apply_stimulus(stimulus);
        Ok(())
    }

    pub(super) fn drain_inbox(&mut self) {
        while let Some(stimulus) = self.scheduler.try_recv() {
            if stimulus != Stimulus::Stop {
                self.apply_stimulus(stimulus);
            }
        }
    }

    /// Deliver stimulus and run due timers until `deadline`
    pub(super) fn pump_until(&mut self, deadline: Duration) -> Exec<()> {
        loop {
            self.check_abort()?;
            while let Some(stimulus) = self.scheduler.try_recv() {
                self.accept(stimulus)?;
            }
            if let Some((_, task)) = self.scheduler.pop_due(deadline) {
                self.run_task(task);
                continue;
            }
            if self.scheduler.now() >= deadline {
                return Ok(());
            }
            let until = self
                .scheduler
                .next_due()
                .map_or(deadline, |due| due.min(deadline));
            if let Some(stimulus) = self.scheduler.wait_until(until) {
                self.accept(stimulus)?;
            }
        }
    }
}
