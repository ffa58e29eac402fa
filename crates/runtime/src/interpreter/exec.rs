//! Statement execution and user function calls

use super::{Interpreter, Mode, PendingWait, param_kind};
use crate::error::{Exec, Flow, Unwind};
use crate::scheduler::TimerTask;
use crate::scope::{Frame, Slot, SlotKey};
use crate::value::{IntWidth, Value};
use splusc::ast::{Expr, ReturnKind, Stmt, StmtKind, SwitchCase, VarType};
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// `Wait` and `Delay` durations are in hundredths of a second
pub(super) fn hundredths(n: i64) -> Duration {
    Duration::from_millis(u64::try_from(n).unwrap_or(0).saturating_mul(10))
}

/// Copy-back obligation recorded while binding arguments
enum CopyBack {
    /// Scalar `BYREF` parameter → caller's place
    Scalar { param: String, target: SlotKey },
    /// Array or structure parameter → caller's variable
    Owned { param: String, owner: String },
}

impl Interpreter {
    pub(super) fn exec_block(&mut self, stmts: &[Stmt]) -> Exec<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Exec<Flow> {
        self.tick()?;
        self.exec_kind(&stmt.kind)
            .map_err(|unwind| unwind.located(stmt.pos))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Exec<Flow> {
        match kind {
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then_body)
                } else if let Some(else_body) = else_body {
                    self.exec_block(else_body)
                } else {
                    Ok(Flow::Normal)
                }
            }

            StmtKind::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }

            StmtKind::DoUntil { body, cond } => {
                loop {
                    match self.exec_block(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    if self.eval(cond)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
            } => self.exec_for(var, start, end, step.as_ref(), body),

            StmtKind::Switch {
                subject,
                cases,
                fallthrough,
            } => self.exec_switch(subject, cases, *fallthrough),

            StmtKind::Wait {
                duration,
                label,
                body,
            } => {
                let delay = hundredths(self.eval(duration)?.as_number());
                match body {
                    None => self.suspend(delay, "Wait")?,
                    Some(body) => self.schedule_wait(delay, label.as_deref(), body)?,
                }
                Ok(Flow::Normal)
            }

            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                let key = self.resolve_key(target)?;
                self.write_key(&key, value)?;
                Ok(Flow::Normal)
            }

            StmtKind::Call(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }

            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::zero(),
                };
                Ok(Flow::Return(value))
            }

            StmtKind::Break => Ok(Flow::Break),

            StmtKind::TerminateEvent => Err(Unwind::Terminate),

            StmtKind::Block(stmts) => self.exec_block(stmts),
        }
    }

    /// Bounds and step are evaluated once; the variable is re-read each
    /// iteration so the body may move it
    fn exec_for(
        &mut self,
        var: &Expr,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> Exec<Flow> {
        let key = self.resolve_key(var)?;
        let first = self.eval(start)?.as_number();
        let last = self.eval(end)?.as_number();
        let step = match step {
            Some(expr) => self.eval(expr)?.as_number(),
            None => 1,
        };
        let past_end = |n: i64| if step < 0 { n < last } else { n > last };

        self.write_key(&key, Value::Number(first))?;
        if past_end(first) {
            return Ok(Flow::Normal);
        }
        loop {
            match self.exec_block(body)? {
                Flow::Normal => {}
                Flow::Break => break,
                ret @ Flow::Return(_) => return Ok(ret),
            }
            self.tick()?;
            let Some(next) = self.read_key(&key)?.as_number().checked_add(step) else {
                break;
            };
            self.write_key(&key, Value::Number(next))?;
            if past_end(next) {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    /// `switch` runs the first matching case; `cswitch` keeps running
    /// later case bodies until a break. A default runs when nothing before
    /// it matched, or always under plain `switch`.
    fn exec_switch(
        &mut self,
        subject: &Expr,
        cases: &[SwitchCase],
        fallthrough: bool,
    ) -> Exec<Flow> {
        let subject = self.eval(subject)?;
        let mut matched = false;
        for case in cases {
            match &case.value {
                Some(value) => {
                    if !(fallthrough && matched) {
                        let value = self.eval(value)?;
                        if !subject.loosely_equals(&value) {
                            continue;
                        }
                    }
                }
                None => {
                    if matched && fallthrough {
                        continue;
                    }
                }
            }
            matched = true;
            match self.exec_block(&case.body)? {
                Flow::Break => return Ok(Flow::Normal),
                ret @ Flow::Return(_) => return Ok(ret),
                Flow::Normal => {
                    if !fallthrough {
                        return Ok(Flow::Normal);
                    }
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn schedule_wait(&mut self, delay: Duration, label: Option<&str>, body: &[Stmt]) -> Exec<()> {
        self.check_abort()?;
        let label = match label {
            Some(label) => label.to_ascii_uppercase(),
            None => {
                self.anonymous_waits += 1;
                format!("__WAIT_{}", self.anonymous_waits)
            }
        };
        if let Some(pending) = self.waits.get(&label)
            && self.scheduler.is_pending(pending.timer)
        {
            self.emit_notice(&format!("Wait '{}' is already pending", label));
            return Ok(());
        }
        let timer = self.scheduler.schedule(
            delay,
            TimerTask::WaitBody {
                label: label.clone(),
            },
        );
        debug!(%label, ?delay, "wait scheduled");
        self.waits.insert(
            label,
            PendingWait {
                timer,
                body: body.to_vec(),
                frames: self.scope.snapshot(),
            },
        );
        Ok(())
    }

    /// Block Main for `delay`, servicing timers and stimulus meanwhile
    pub(super) fn suspend(&mut self, delay: Duration, what: &str) -> Exec<()> {
        if self.mode == Mode::Immediate {
            self.emit_notice(&format!("{} has no effect inside an event", what));
            return Ok(());
        }
        self.check_abort()?;
        let deadline = self.scheduler.now() + delay;
        self.pump_until(deadline)
    }

    // ------------------------------------------------------------------
    // User functions
    // ------------------------------------------------------------------

    pub(super) fn call_user(&mut self, idx: usize, args: &[Expr]) -> Exec<Value> {
        let program = Rc::clone(&self.program);
        let Some(def) = program.functions.get(idx) else {
            return Err(Unwind::fault("Unknown function"));
        };
        if self.depth >= self.config.max_call_depth {
            return Err(Unwind::fault(format!(
                "Call depth limit of {} exceeded in '{}'",
                self.config.max_call_depth, def.name
            )));
        }

        let mut frame = Frame::new();
        let mut copy_backs = Vec::new();
        for (i, param) in def.params.iter().enumerate() {
            let param_name = param.name.to_ascii_uppercase();
            let arg = args.get(i);
            let owned = param.is_array || matches!(param.ty, VarType::Struct(_));

            if owned {
                let Some(Expr::Ident(owner)) = arg else {
                    return Err(Unwind::fault(format!(
                        "Parameter '{}' of '{}' expects an array or structure variable",
                        param.name, def.name
                    )));
                };
                for (key, slot) in self.scope.owned_by(owner) {
                    frame.insert(key.rebase(&param_name), slot);
                }
                copy_backs.push(CopyBack::Owned {
                    param: param_name,
                    owner: owner.to_ascii_uppercase(),
                });
                continue;
            }

            let kind = param_kind(&param.ty);
            let value = match arg {
                Some(expr) => self.eval(expr)?,
                None => kind.initial(),
            };
            let mut slot = Slot::new(kind);
            slot.set(value);
            frame.insert(SlotKey::Plain(param_name.clone()), slot);

            if param.by_ref
                && let Some(expr) = arg
                && expr.is_place()
            {
                copy_backs.push(CopyBack::Scalar {
                    param: param_name,
                    target: self.resolve_key(expr)?,
                });
            }
        }
        for local in &def.locals {
            frame
                .declare_var(local, &program.structs)
                .map_err(|message| Unwind::fault(message).located(local.pos))?;
        }

        self.scope.push(frame);
        self.depth += 1;
        let result = self.exec_block(&def.body);
        self.depth -= 1;
        let frame = self.scope.pop().unwrap_or_default();
        let flow = result?;

        for copy_back in copy_backs {
            match copy_back {
                CopyBack::Scalar { param, target } => {
                    if let Some(slot) = frame.get(&SlotKey::Plain(param)) {
                        self.write_key(&target, slot.value.clone())?;
                    }
                }
                CopyBack::Owned { param, owner } => {
                    for (key, slot) in frame.owned_by(&param) {
                        if let Some(dest) = self.scope.get_mut(&key.rebase(&owner)) {
                            dest.set(slot.value);
                        }
                    }
                }
            }
        }

        let returned = match flow {
            Flow::Return(value) => Some(value),
            _ => None,
        };
        Ok(match def.return_kind {
            ReturnKind::Void => Value::zero(),
            ReturnKind::String => Value::Text(returned.map(|v| v.as_text()).unwrap_or_default()),
            ReturnKind::Integer => {
                let n = returned.map_or(0, |v| v.as_number());
                let width = def
                    .return_type
                    .as_ref()
                    .and_then(IntWidth::for_type)
                    .unwrap_or(IntWidth::U16);
                Value::Number(width.wrap(n))
            }
        })
    }
}
