//! String and conversion built-ins
//!
//! Positions are 1-based and counted in characters. Functions that take
//! the source buffer by place (`Remove`, `RemoveByLength`, `ClearBuffer`,
//! `SetString`) write the remaining text back to that variable.

use super::{Arg, BuiltinContext, BuiltinFn, Table, num, target, text};
use crate::scope::MAX_STRING_CAPACITY;
use crate::value::Value;

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn slice(chars: &[char], from: usize, len: usize) -> String {
    chars.iter().skip(from).take(len).collect()
}

/// Count clamped to zero
fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// First run of digits in `s`, or 0
fn first_number(s: &str) -> i64 {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// 1-based character position of `needle` in `hay` at or after `start`
pub(crate) fn find_from(needle: &str, hay: &str, start: usize) -> Option<usize> {
    let hay = chars(hay);
    let needle = chars(needle);
    if needle.is_empty() || needle.len() > hay.len() {
        return None;
    }
    let first = start.max(1) - 1;
    (first..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()] == needle[..])
        .map(|i| i + 1)
}

fn itoa(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text((num(args, 0) as u16).to_string())
}

fn ltoa(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text((num(args, 0) as u32).to_string())
}

fn itohex(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text(format!("{:X}", num(args, 0) as u16))
}

fn ltohex(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text(format!("{:X}", num(args, 0) as u32))
}

fn atoi(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Number(first_number(&text(args, 0)) as u16 as i64)
}

fn atol(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Number(first_number(&text(args, 0)) as u32 as i64)
}

fn chr(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text(char::from((num(args, 0) & 0xff) as u8).to_string())
}

fn byte(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let pos = num(args, 1);
    let code = match usize::try_from(pos) {
        Ok(p) if p >= 1 => text(args, 0).chars().nth(p - 1).map_or(0, |c| u32::from(c) as i64),
        _ => 0,
    };
    Value::Number(code)
}

fn len(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Number(text(args, 0).chars().count() as i64)
}

fn left(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text(slice(&chars(&text(args, 0)), 0, count(num(args, 1))))
}

fn right(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let s = chars(&text(args, 0));
    let n = count(num(args, 1)).min(s.len());
    Value::Text(slice(&s, s.len() - n, n))
}

fn mid(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let s = chars(&text(args, 0));
    let start = count(num(args, 1)).max(1) - 1;
    Value::Text(slice(&s, start, count(num(args, 2))))
}

fn find(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let start = if args.len() > 2 { count(num(args, 2)) } else { 1 };
    let pos = find_from(&text(args, 0), &text(args, 1), start);
    Value::Number(pos.map_or(0, |p| p as i64))
}

fn reverse_find(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let needle = chars(&text(args, 0));
    let hay = chars(&text(args, 1));
    if needle.is_empty() || needle.len() > hay.len() {
        return Value::zero();
    }
    let last_start = hay.len() - needle.len();
    // An explicit start bounds where the match may begin
    let upper = if args.len() > 2 {
        (count(num(args, 2)).max(1) - 1).min(last_start)
    } else {
        last_start
    };
    let pos = (0..=upper)
        .rev()
        .find(|&i| hay[i..i + needle.len()] == needle[..])
        .map_or(0, |i| i as i64 + 1);
    Value::Number(pos)
}

fn upper(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text(text(args, 0).to_ascii_uppercase())
}

fn lower(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Text(text(args, 0).to_ascii_lowercase())
}

fn remove(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let delimiter = text(args, 0);
    let source = text(args, 1);
    let start = if args.len() > 2 { count(num(args, 2)) } else { 1 };
    let Some(pos) = find_from(&delimiter, &source, start) else {
        return Value::empty_text();
    };
    let s = chars(&source);
    let end = pos - 1 + delimiter.chars().count();
    let removed = slice(&s, 0, end);
    if let Some(key) = target(args, 1) {
        ctx.set_var(key, Value::Text(slice(&s, end, s.len())));
    }
    Value::Text(removed)
}

fn remove_by_length(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let n = count(num(args, 0));
    let s = chars(&text(args, 1));
    if n > s.len() {
        return Value::empty_text();
    }
    if let Some(key) = target(args, 1) {
        ctx.set_var(key, Value::Text(slice(&s, n, s.len())));
    }
    Value::Text(slice(&s, 0, n))
}

fn clear_buffer(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    if let Some(key) = target(args, 0) {
        ctx.set_var(key, Value::empty_text());
    }
    Value::zero()
}

/// Overwrite `dest` from `pos` with `src`, space-padding a short
/// destination; returns the new length
fn set_string(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let src = chars(&text(args, 0));
    let pos = count(num(args, 1)).max(1) - 1;
    if pos >= MAX_STRING_CAPACITY {
        ctx.notice(&format!("SetString position {} is past the longest string", pos + 1));
        return Value::Number(-1);
    }
    let mut dest = chars(&text(args, 2));
    if dest.len() < pos {
        dest.resize(pos, ' ');
    }
    for (i, c) in src.into_iter().enumerate() {
        match dest.get_mut(pos + i) {
            Some(slot) => *slot = c,
            None => dest.push(c),
        }
    }
    let len = dest.len() as i64;
    if let Some(key) = target(args, 2) {
        ctx.set_var(key, Value::Text(dest.into_iter().collect()));
    }
    Value::Number(len)
}

pub(super) fn register(table: &mut Table) {
    table.insert("ITOA", itoa as BuiltinFn);
    table.insert("LTOA", ltoa as BuiltinFn);
    table.insert("ITOHEX", itohex as BuiltinFn);
    table.insert("LTOHEX", ltohex as BuiltinFn);
    table.insert("ATOI", atoi as BuiltinFn);
    table.insert("ATOL", atol as BuiltinFn);
    table.insert("CHR", chr as BuiltinFn);
    table.insert("BYTE", byte as BuiltinFn);
    table.insert("LEN", len as BuiltinFn);
    table.insert("LEFT", left as BuiltinFn);
    table.insert("RIGHT", right as BuiltinFn);
    table.insert("MID", mid as BuiltinFn);
    table.insert("FIND", find as BuiltinFn);
    table.insert("REVERSEFIND", reverse_find as BuiltinFn);
    table.insert("UPPER", upper as BuiltinFn);
    table.insert("LOWER", lower as BuiltinFn);
    table.insert("REMOVE", remove as BuiltinFn);
    table.insert("REMOVEBYLENGTH", remove_by_length as BuiltinFn);
    table.insert("CLEARBUFFER", clear_buffer as BuiltinFn);
    table.insert("SETSTRING", set_string as BuiltinFn);
}
