//! Delimiter and length framing over incoming text
//!
//! Each gather target owns a pending buffer that survives between calls,
//! so a reply split across several socket or serial deliveries is
//! reassembled before the program sees it.

use super::{Arg, BuiltinContext, BuiltinFn, Table, num, target, text};
use super::strings::find_from;
use crate::value::Value;
use std::collections::HashMap;

/// Pending text per gather target
#[derive(Debug, Default)]
pub struct GatherBuffers {
    buffers: HashMap<String, String>,
}

impl GatherBuffers {
    pub fn append(&mut self, key: &str, chunk: &str) {
        self.buffers.entry(key.to_string()).or_default().push_str(chunk);
    }

    /// Text up to and including the first `delimiter`, if complete
    pub fn take_through(&mut self, key: &str, delimiter: &str) -> Option<String> {
        let pending = self.buffers.get_mut(key)?;
        let pos = find_from(delimiter, pending, 1)?;
        let end: usize = pending
            .char_indices()
            .nth(pos - 1 + delimiter.chars().count())
            .map_or(pending.len(), |(i, _)| i);
        let rest = pending.split_off(end);
        Some(std::mem::replace(pending, rest))
    }

    /// The first `len` characters, once that many have arrived
    pub fn take_len(&mut self, key: &str, len: usize) -> Option<String> {
        let pending = self.buffers.get_mut(key)?;
        if len == 0 || pending.chars().count() < len {
            return None;
        }
        let end = pending
            .char_indices()
            .nth(len)
            .map_or(pending.len(), |(i, _)| i);
        let rest = pending.split_off(end);
        Some(std::mem::replace(pending, rest))
    }

    pub fn pending(&self, key: &str) -> &str {
        self.buffers.get(key).map_or("", String::as_str)
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

/// Feed the chunk into the target's buffer; a chunk passed as a variable
/// is consumed
fn feed(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Option<String> {
    let key = target(args, 2)?.to_string();
    let chunk = text(args, 1);
    ctx.gather_buffers().append(&key, &chunk);
    if let Some(source) = target(args, 1) {
        ctx.set_var(source, Value::empty_text());
    }
    Some(key)
}

fn finish(ctx: &mut dyn BuiltinContext, args: &[Arg], found: Option<String>) -> Value {
    match (found, target(args, 2)) {
        (Some(matched), Some(key)) => {
            ctx.set_var(key, Value::Text(matched));
            Value::Number(1)
        }
        _ => Value::zero(),
    }
}

fn gather_async(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let Some(key) = feed(ctx, args) else {
        return Value::zero();
    };
    let delimiter = text(args, 0);
    let found = ctx.gather_buffers().take_through(&key, &delimiter);
    finish(ctx, args, found)
}

fn gather_async_by_length(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let Some(key) = feed(ctx, args) else {
        return Value::zero();
    };
    let len = usize::try_from(num(args, 0)).unwrap_or(0);
    let found = ctx.gather_buffers().take_len(&key, len);
    finish(ctx, args, found)
}

pub(super) fn register(table: &mut Table) {
    table.insert("GATHERASYNC", gather_async as BuiltinFn);
    table.insert("GATHERASYNCBYLENGTH", gather_async_by_length as BuiltinFn);
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use super::*;
    use crate::scope::SlotKey;

    #[test]
    fn test_buffer_framing() {
        let mut buffers = GatherBuffers::default();
        buffers.append("RX", "PWR=");
        assert_eq!(buffers.take_through("RX", "\r\n"), None);
        buffers.append("RX", "ON\r\nLAMP");
        assert_eq!(buffers.take_through("RX", "\r\n").as_deref(), Some("PWR=ON\r\n"));
        assert_eq!(buffers.pending("RX"), "LAMP");
        assert_eq!(buffers.take_len("RX", 5), None);
        assert_eq!(buffers.take_len("RX", 2).as_deref(), Some("LA"));
        assert_eq!(buffers.pending("RX"), "MP");
        assert_eq!(buffers.take_through("MISSING", "\r"), None);
    }

    #[test]
    fn test_gather_async_completes_across_chunks() {
        let mut ctx = TestContext::default().with_var(SlotKey::plain("reply"), "");
        let reply = ctx.arg("reply");

        let first = gather_async(
            &mut ctx,
            &[Arg::value("\r"), Arg::value("PWR"), reply.clone()],
        );
        assert_eq!(first, Value::zero());
        assert_eq!(ctx.var("reply"), Value::from(""));

        let second = gather_async(
            &mut ctx,
            &[Arg::value("\r"), Arg::value("=ON\rLA"), reply],
        );
        assert_eq!(second, Value::Number(1));
        assert_eq!(ctx.var("reply"), Value::from("PWR=ON\r"));
        assert_eq!(ctx.gather.pending("REPLY"), "LA");
    }

    #[test]
    fn test_chunk_variable_is_consumed() {
        let mut ctx = TestContext::default()
            .with_var(SlotKey::plain("rx"), "AB")
            .with_var(SlotKey::plain("frame"), "");
        let rx = ctx.arg("rx");
        let frame = ctx.arg("frame");
        let done = gather_async_by_length(&mut ctx, &[Arg::value(2), rx, frame]);
        assert_eq!(done, Value::Number(1));
        assert_eq!(ctx.var("frame"), Value::from("AB"));
        assert_eq!(ctx.var("rx"), Value::from(""));
    }

    #[test]
    fn test_gather_without_target_is_inert() {
        let mut ctx = TestContext::default();
        let got = gather_async(&mut ctx, &[Arg::value("\r"), Arg::value("x\r"), Arg::value("")]);
        assert_eq!(got, Value::zero());
    }
}
