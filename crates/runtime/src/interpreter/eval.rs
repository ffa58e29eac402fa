//! Expression evaluation, slot resolution and the built-in context

use super::Interpreter;
use crate::builtins::{self, Arg, BuiltinContext, GatherBuffers};
use crate::error::{Exec, Unwind};
use crate::scope::SlotKey;
use crate::value::Value;
use splusc::ast::{BinaryOp, Expr, UnaryOp};
use std::cmp::Ordering;

impl Interpreter {
    pub(super) fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        self.tick()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Text(s.clone())),
            Expr::Ident(_) | Expr::Index { .. } | Expr::Field { .. } => {
                let key = self.resolve_key(expr)?;
                self.read_key(&key)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(value.as_number().wrapping_neg()),
                    UnaryOp::Not => Value::from_bool(!value.is_truthy()),
                    UnaryOp::BitNot => Value::Number(!value.as_number()),
                })
            }
            Expr::Binary { op, left, right } => {
                if *op == BinaryOp::MultiDim {
                    return Err(Unwind::fault("Two indices are only valid inside brackets"));
                }
                // Both operands are always evaluated
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Exec<Value> {
        let (a, b) = (left.as_number(), right.as_number());
        let value = match op {
            BinaryOp::Add => {
                if left.is_text() || right.is_text() {
                    Value::Text(left.as_text() + &right.as_text())
                } else {
                    Value::Number(a.wrapping_add(b))
                }
            }
            BinaryOp::Sub => Value::Number(a.wrapping_sub(b)),
            BinaryOp::Mul => Value::Number(a.wrapping_mul(b)),
            BinaryOp::Div | BinaryOp::Mod => {
                if b == 0 {
                    self.emit_notice("Division by zero evaluates to 0");
                    Value::zero()
                } else if op == BinaryOp::Div {
                    Value::Number(a.wrapping_div(b))
                } else {
                    Value::Number(a.wrapping_rem(b))
                }
            }
            BinaryOp::BitAnd => Value::Number(a & b),
            BinaryOp::BitOr => Value::Number(a | b),
            BinaryOp::BitXor => Value::Number(a ^ b),
            BinaryOp::Shl => Value::Number(a.wrapping_shl((b & 63) as u32)),
            BinaryOp::Shr => Value::Number(a.wrapping_shr((b & 63) as u32)),
            BinaryOp::And => Value::from_bool(left.is_truthy() && right.is_truthy()),
            BinaryOp::Or => Value::from_bool(left.is_truthy() || right.is_truthy()),
            BinaryOp::Eq => Value::from_bool(left.loosely_equals(&right)),
            BinaryOp::Ne => Value::from_bool(!left.loosely_equals(&right)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Text(x), Value::Text(y)) => x.cmp(y),
                    _ => a.cmp(&b),
                };
                Value::from_bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }
            BinaryOp::MultiDim => return Err(Unwind::fault("Unexpected index pair")),
        };
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    pub(super) fn resolve_key(&mut self, expr: &Expr) -> Exec<SlotKey> {
        match expr {
            Expr::Ident(name) => Ok(SlotKey::plain(name)),
            Expr::Index { name, index } => match index.as_ref() {
                Expr::Binary {
                    op: BinaryOp::MultiDim,
                    left,
                    right,
                } => {
                    let i = self.eval(left)?.as_number();
                    let j = self.eval(right)?.as_number();
                    Ok(SlotKey::Indexed2(name.to_ascii_uppercase(), i, j))
                }
                index => {
                    let i = self.eval(index)?.as_number();
                    Ok(SlotKey::indexed(name, i))
                }
            },
            Expr::Field {
                object,
                field,
                index,
            } => match index {
                None => Ok(SlotKey::field(object, field)),
                Some(index) => {
                    let i = self.eval(index)?.as_number();
                    Ok(SlotKey::IndexedField(
                        object.to_ascii_uppercase(),
                        field.to_ascii_uppercase(),
                        i,
                    ))
                }
            },
            _ => Err(Unwind::fault("Expression is not a variable")),
        }
    }

    /// Frames, globals, constants, signals, then socket fields
    pub(super) fn read_key(&self, key: &SlotKey) -> Exec<Value> {
        if let Some(slot) = self.scope.get(key) {
            return Ok(slot.value.clone());
        }
        if let SlotKey::Plain(name) = key
            && let Some(value) = self.constants.get(name)
        {
            return Ok(value.clone());
        }
        if let Some(signal) = self.io.signal_for_key(key)
            && let Some(value) = self.io.value(&signal.name)
        {
            return Ok(value.clone());
        }
        if let SlotKey::Field(object, field) = key
            && field == "SOCKETSTATUS"
            && let Some(id) = self.sockets.get(object)
        {
            return Ok(Value::Number(self.net.status(*id).code()));
        }
        Err(self.missing(key))
    }

    fn missing(&self, key: &SlotKey) -> Unwind {
        let owner = key.owner();
        let known = self.scope.get(&SlotKey::Plain(owner.to_string())).is_some()
            || !self.scope.owned_by(owner).is_empty()
            || self.io.signal(&format!("{}[1]", owner)).is_some();
        if known && key.first_index().is_some() {
            Unwind::fault(format!("Index out of range: {}", key))
        } else {
            Unwind::fault(format!("Undefined variable '{}'", key))
        }
    }

    pub(super) fn write_key(&mut self, key: &SlotKey, value: Value) -> Exec<()> {
        if let Some(slot) = self.scope.get_mut(key) {
            slot.set(value);
            self.track_index(key);
            return Ok(());
        }
        if let SlotKey::Plain(name) = key
            && self.constants.contains_key(name)
        {
            return Err(Unwind::fault(format!("Cannot assign to constant '{}'", name)));
        }
        if let Some(signal) = self.io.signal_for_key(key).cloned() {
            if signal.io_type.is_input() && signal.io_type != splusc::ast::IoType::BufferInput {
                return Err(Unwind::fault(format!(
                    "Cannot assign to input '{}'",
                    signal.name
                )));
            }
            let value = signal.coerce(value);
            self.io.store(&signal, value.clone());
            self.track_index(key);
            if !signal.io_type.is_input() {
                self.observer
                    .on_output_change(signal.kind(), &signal.name, &value);
            }
            return Ok(());
        }
        Err(self.missing(key))
    }

    pub(super) fn track_index(&mut self, key: &SlotKey) {
        if let (Some(name), Some(index)) = (key.array_name(), key.first_index()) {
            self.last_modified.insert(name, index);
            self.last_any = index;
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// User functions first, then intrinsics, then the built-in table
    pub(super) fn call(&mut self, name: &str, args: &[Expr]) -> Exec<Value> {
        let upper = name.to_ascii_uppercase();
        if let Some(&idx) = self.functions.get(&upper) {
            return self.call_user(idx, args);
        }
        if upper == "MAIN" {
            return Err(Unwind::fault("Main cannot be called"));
        }
        if let Some(value) = self.call_intrinsic(&upper, args)? {
            return Ok(value);
        }
        if let Some(builtin) = builtins::lookup(&upper) {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(self.eval_arg(arg)?);
            }
            let value = builtin(self, &evaluated);
            if let Some(diagnostic) = self.pending_fault.take() {
                return Err(Unwind::Fault(diagnostic));
            }
            return Ok(value);
        }
        Err(Unwind::fault(format!("Unknown function '{}'", name)))
    }

    /// Evaluate an argument, keeping its slot when it names a variable
    pub(super) fn eval_arg(&mut self, expr: &Expr) -> Exec<Arg> {
        match expr {
            Expr::Ident(name) => {
                let key = SlotKey::plain(name);
                match self.read_key(&key) {
                    Ok(value) => Ok(Arg::place(key, value)),
                    // Whole arrays and structures travel by name
                    Err(_) if !self.scope.owned_by(name).is_empty() => {
                        Ok(Arg::place(key, Value::zero()))
                    }
                    Err(unwind) => Err(unwind),
                }
            }
            Expr::Index { .. } | Expr::Field { .. } => {
                let key = self.resolve_key(expr)?;
                let value = self.read_key(&key)?;
                Ok(Arg::place(key, value))
            }
            other => Ok(Arg::value(self.eval(other)?)),
        }
    }
}

impl BuiltinContext for Interpreter {
    fn print(&mut self, text: &str) {
        self.observer.on_console_output(text);
    }

    fn notice(&mut self, message: &str) {
        self.emit_notice(message);
    }

    fn get_var(&self, key: &SlotKey) -> Option<Value> {
        self.read_key(key).ok()
    }

    fn set_var(&mut self, key: &SlotKey, value: Value) {
        if let Err(Unwind::Fault(diagnostic)) = self.write_key(key, value) {
            self.pending_fault.get_or_insert(diagnostic);
        }
    }

    fn last_modified_index(&self, name: Option<&str>) -> i64 {
        match name {
            Some(name) => self
                .last_modified
                .get(&name.to_ascii_uppercase())
                .copied()
                .unwrap_or(0),
            None => self.last_any,
        }
    }

    fn array_keys(&self, name: &str) -> Vec<SlotKey> {
        self.scope.array_keys(name)
    }

    fn gather_buffers(&mut self) -> &mut GatherBuffers {
        &mut self.gather
    }

    fn ticks(&self) -> i64 {
        (self.scheduler.now().as_millis() / 10) as i64
    }
}
