//! Scheduling, file and socket operations
//!
//! These names need the interpreter itself (its timers, file system or
//! network), so they are resolved here before the built-in table is
//! consulted. Unknown names fall through with `Ok(None)`.

use super::exec::hundredths;
use super::{Interpreter, Mode};
use crate::error::{Exec, Unwind};
use crate::scheduler::{TimerId, TimerTask};
use crate::scope::SlotKey;
use crate::value::{Value, bytes_to_text, text_to_bytes};
use crate::vfs::OpenMode;
use splusc::ast::{Expr, Trigger};
use std::time::Duration;
use tracing::debug;

/// Poll interval of a contended critical section
const CRITICAL_POLL: Duration = Duration::from_millis(10);

impl Interpreter {
    pub(super) fn call_intrinsic(&mut self, name: &str, args: &[Expr]) -> Exec<Option<Value>> {
        let value = match name {
            // Scheduling
            "DELAY" => {
                let delay = hundredths(self.arg_number(args, 0)?);
                self.suspend(delay, "Delay")?;
                Value::zero()
            }
            "PROCESSLOGIC" => {
                if self.mode == Mode::Cooperative {
                    self.suspend(Duration::ZERO, "ProcessLogic")?;
                }
                Value::zero()
            }
            "PULSE" => self.pulse(args)?,
            "CANCELWAIT" => {
                let label = self.label(args.first())?;
                if let Some(pending) = self.waits.remove(&label) {
                    self.scheduler.cancel(pending.timer);
                }
                Value::zero()
            }
            "CANCELALLWAIT" => {
                for (_, pending) in self.waits.drain() {
                    self.scheduler.cancel(pending.timer);
                }
                Value::zero()
            }
            "RETIMEWAIT" => {
                let delay = hundredths(self.arg_number(args, 0)?);
                let label = self.label(args.get(1))?;
                if let Some(pending) = self.waits.get(&label) {
                    self.scheduler.retime(pending.timer, delay);
                }
                Value::zero()
            }
            "CREATETHREAD" => {
                let function = self.label(args.first())?;
                if !self.functions.contains_key(&function) {
                    return Err(Unwind::fault(format!("Unknown function '{}'", function)));
                }
                self.schedule(Duration::ZERO, TimerTask::Spawn { function })?;
                Value::zero()
            }
            "ENTERCRITICALSECTION" => self.enter_critical(args)?,
            "EXITCRITICALSECTION" => {
                let section = self.label(args.first())?;
                self.critical.remove(&section);
                Value::zero()
            }

            // Files
            "STARTFILEOPERATIONS" | "ENDFILEOPERATIONS" => Value::zero(),
            "FILEOPEN" => {
                let path = self.arg_text(args, 0)?;
                let flags = self.arg_number(args, 1)?;
                Value::Number(self.vfs.open(&path, OpenMode::from_flags(flags)))
            }
            "FILECLOSE" => {
                let handle = self.arg_number(args, 0)?;
                Value::Number(self.vfs.close(handle))
            }
            "FILEREAD" => self.file_read(args)?,
            "FILEWRITE" => {
                let handle = self.arg_number(args, 0)?;
                let mut bytes = text_to_bytes(&self.arg_text(args, 1)?);
                if args.len() > 2 {
                    let count = usize::try_from(self.arg_number(args, 2)?).unwrap_or(0);
                    bytes.truncate(count);
                }
                Value::Number(self.vfs.write(handle, &bytes))
            }
            "FILESEEK" => {
                let handle = self.arg_number(args, 0)?;
                let offset = self.arg_number(args, 1)?;
                let origin = self.arg_number(args, 2)?;
                Value::Number(self.vfs.seek(handle, offset, origin))
            }
            "FILEDELETE" => {
                let path = self.arg_text(args, 0)?;
                Value::Number(self.vfs.delete(&path))
            }
            "FILELENGTH" => {
                let handle = self.arg_number(args, 0)?;
                Value::Number(self.vfs.length(handle))
            }
            "FILEEXISTS" => {
                let path = self.arg_text(args, 0)?;
                Value::from_bool(self.vfs.exists(&path))
            }
            "ISDIRECTORY" => {
                let path = self.arg_text(args, 0)?;
                Value::from_bool(self.vfs.is_directory(&path))
            }
            "MAKEDIRECTORY" => {
                let path = self.arg_text(args, 0)?;
                Value::Number(self.vfs.make_directory(&path))
            }
            "FINDFIRST" => {
                let pattern = self.arg_text(args, 0)?;
                let found = self.vfs.find_first(&pattern);
                self.store_found(args.get(1), &found)?;
                Value::Text(found)
            }
            "FINDNEXT" => {
                let found = self.vfs.find_next();
                self.store_found(args.first(), &found)?;
                Value::Text(found)
            }
            "FINDCLOSE" => Value::Number(self.vfs.find_close()),

            // Sockets
            "SOCKETCONNECTCLIENT" => {
                let id = self.socket_arg(args)?;
                let address = self.arg_text(args, 1)?;
                let port = self.arg_number(args, 2)?;
                let status = self.net.connect(id, &address, port);
                if status == 0 {
                    let delay = self.config.connect_delay;
                    self.schedule(delay, TimerTask::SocketConnected { id })?;
                }
                Value::Number(status)
            }
            "SOCKETDISCONNECTCLIENT" | "SOCKETSERVERSTOPLISTEN" => {
                let id = self.socket_arg(args)?;
                let status = self.net.disconnect(id);
                if status == 0 {
                    self.schedule(
                        Duration::ZERO,
                        TimerTask::SocketEvent {
                            trigger: Trigger::SocketDisconnect,
                            id,
                        },
                    )?;
                }
                Value::Number(status)
            }
            "SOCKETSEND" => {
                let id = self.socket_arg(args)?;
                let data = self.arg_text(args, 1)?;
                let (sent, reply) = self.net.send(id, &data);
                if let Some(data) = reply {
                    let delay = self.config.response_delay;
                    self.schedule(delay, TimerTask::SocketDeliver { id, data })?;
                }
                Value::Number(sent)
            }
            "SOCKETGETSTATUS" => {
                let id = self.socket_arg(args)?;
                Value::Number(self.net.status(id).code())
            }
            "SOCKETGETADDRESSASREQUESTED" | "SOCKETGETREMOTEIPADDRESS" => {
                let id = self.socket_arg(args)?;
                let address = self
                    .net
                    .socket(id)
                    .map(|s| s.remote_address.clone())
                    .unwrap_or_default();
                self.store_found(args.get(1), &address)?;
                Value::Text(address)
            }
            "SOCKETGETPORTNUMBER" => {
                let id = self.socket_arg(args)?;
                let port = self.net.socket(id).map_or(-1, |s| {
                    if s.remote_port != 0 {
                        i64::from(s.remote_port)
                    } else {
                        i64::from(s.local_port)
                    }
                });
                Value::Number(port)
            }
            "SOCKETSERVERSTARTLISTEN" => {
                let id = self.socket_arg(args)?;
                // The port is the last argument; an address may precede it
                let port = self.arg_number(args, args.len().saturating_sub(1).max(1))?;
                let status = self.net.listen(id, port);
                if status == 0 {
                    self.schedule(
                        Duration::ZERO,
                        TimerTask::SocketEvent {
                            trigger: Trigger::SocketConnect,
                            id,
                        },
                    )?;
                }
                Value::Number(status)
            }
            "SOCKETUDP_ENABLE" => {
                let id = self.socket_arg(args)?;
                let address = self.arg_text(args, 1)?;
                let port = self.arg_number(args, 2)?;
                Value::Number(self.net.enable_udp(id, &address, port))
            }
            "SOCKETUDP_DISABLE" => {
                let id = self.socket_arg(args)?;
                Value::Number(self.net.disconnect(id))
            }

            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Queue a timer; Main checks for a stop request first
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> Exec<TimerId> {
        self.check_abort()?;
        Ok(self.scheduler.schedule(delay, task))
    }

    fn arg_value(&mut self, args: &[Expr], idx: usize) -> Exec<Value> {
        match args.get(idx) {
            Some(expr) => self.eval(expr),
            None => Ok(Value::zero()),
        }
    }

    fn arg_number(&mut self, args: &[Expr], idx: usize) -> Exec<i64> {
        Ok(self.arg_value(args, idx)?.as_number())
    }

    fn arg_text(&mut self, args: &[Expr], idx: usize) -> Exec<String> {
        match args.get(idx) {
            Some(expr) => Ok(self.eval(expr)?.as_text()),
            None => Ok(String::new()),
        }
    }

    /// Wait labels, thread functions and section names are bare words
    fn label(&mut self, expr: Option<&Expr>) -> Exec<String> {
        match expr {
            Some(Expr::Ident(name)) => Ok(name.to_ascii_uppercase()),
            Some(expr) => Ok(self.eval(expr)?.as_text().to_ascii_uppercase()),
            None => Err(Unwind::fault("Missing name argument")),
        }
    }

    fn socket_arg(&self, args: &[Expr]) -> Exec<i64> {
        let name = match args.first() {
            Some(Expr::Ident(name)) => name,
            _ => return Err(Unwind::fault("Expected a socket variable")),
        };
        self.sockets
            .get(&name.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| Unwind::fault(format!("'{}' is not a socket", name)))
    }

    /// Write a result into an optional output argument
    fn store_found(&mut self, expr: Option<&Expr>, text: &str) -> Exec<()> {
        if let Some(expr) = expr
            && expr.is_place()
        {
            let key = self.resolve_key(expr)?;
            self.write_key(&key, Value::Text(text.to_string()))?;
        }
        Ok(())
    }

    fn pulse(&mut self, args: &[Expr]) -> Exec<Value> {
        let delay = hundredths(self.arg_number(args, 0)?);
        let Some(target) = args.get(1) else {
            return Err(Unwind::fault("Pulse needs an output"));
        };
        let key = self.resolve_key(target)?;
        self.write_key(&key, Value::Number(1))?;
        self.schedule(
            delay,
            TimerTask::PulseEnd {
                output: key.to_string(),
            },
        )?;
        Ok(Value::zero())
    }

    fn file_read(&mut self, args: &[Expr]) -> Exec<Value> {
        let handle = self.arg_number(args, 0)?;
        let max = usize::try_from(self.arg_number(args, 2)?).unwrap_or(0);
        let Some(bytes) = self.vfs.read(handle, max) else {
            return Ok(Value::Number(-1));
        };
        let read = bytes.len() as i64;
        if let Some(target) = args.get(1)
            && target.is_place()
        {
            let key = self.resolve_key(target)?;
            self.write_key(&key, Value::Text(bytes_to_text(&bytes)))?;
        }
        Ok(Value::Number(read))
    }

    /// Named lock; Main polls until free, events get 0 when contended
    fn enter_critical(&mut self, args: &[Expr]) -> Exec<Value> {
        let section = self.label(args.first())?;
        loop {
            if self.critical.insert(section.clone()) {
                return Ok(Value::Number(1));
            }
            if self.mode == Mode::Immediate {
                self.emit_notice(&format!("Critical section '{}' is held", section));
                return Ok(Value::zero());
            }
            debug!(%section, "waiting for critical section");
            self.tick()?;
            self.suspend(CRITICAL_POLL, "EnterCriticalSection")?;
        }
    }
}

/// Slot addressed by a pulse timer
pub(super) fn pulse_key(output: &str) -> SlotKey {
    SlotKey::parse(output).unwrap_or_else(|| SlotKey::plain(output))
}
