//! printf-style formatting and the console built-ins

use super::{Arg, BuiltinContext, BuiltinFn, Table, target, text};
use crate::value::Value;

/// One parsed `%` conversion
#[derive(Debug, Default)]
struct Spec {
    left: bool,
    zero: bool,
    width: usize,
}

impl Spec {
    fn pad(&self, body: String) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero {
            // Zeros go after the sign
            match body.strip_prefix('-') {
                Some(digits) => format!("-{}{}", "0".repeat(fill), digits),
                None => format!("{}{}", "0".repeat(fill), body),
            }
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }
}

/// Expand `%d %i %u %x %X %c %s %%` against `args`; missing arguments read
/// as 0 or "", unknown conversions are copied through untouched
pub fn format(template: &str, args: &[Value]) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut next_arg = args.iter();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '%' {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i;
        i += 1;
        let mut spec = Spec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                _ => break,
            }
            i += 1;
        }
        while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + d as usize;
            i += 1;
        }
        while matches!(chars.get(i), Some('l' | 'h')) {
            i += 1;
        }

        let Some(&conv) = chars.get(i) else {
            out.extend(&chars[start..]);
            break;
        };
        i += 1;

        let piece = match conv {
            '%' => "%".to_string(),
            'd' | 'i' => {
                let n = next_arg.next().map_or(0, Value::as_number);
                spec.pad(n.to_string())
            }
            'u' => {
                let n = next_arg.next().map_or(0, Value::as_number);
                let n = if n < 0 { i64::from(n as u32) } else { n };
                spec.pad(n.to_string())
            }
            'x' | 'X' => {
                let n = next_arg.next().map_or(0, Value::as_number);
                let hex = if n < 0 {
                    format!("{:x}", n as u32)
                } else {
                    format!("{:x}", n)
                };
                let hex = if conv == 'X' {
                    hex.to_ascii_uppercase()
                } else {
                    hex
                };
                spec.pad(hex)
            }
            'c' => {
                let n = next_arg.next().map_or(0, Value::as_number);
                spec.pad(char::from((n & 0xff) as u8).to_string())
            }
            's' => {
                let s = next_arg.next().map(Value::as_text).unwrap_or_default();
                Spec {
                    left: true,
                    ..spec
                }
                .pad(s)
            }
            _ => chars[start..i].iter().collect(),
        };
        out.push_str(&piece);
    }

    out
}

fn rest(args: &[Arg], from: usize) -> Vec<Value> {
    args.iter().skip(from).map(|a| a.value.clone()).collect()
}

fn print(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let line = format(&text(args, 0), &rest(args, 1));
    ctx.print(&line);
    Value::zero()
}

fn make_string(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let line = format(&text(args, 1), &rest(args, 2));
    if let Some(key) = target(args, 0) {
        ctx.set_var(key, Value::Text(line));
    }
    Value::zero()
}

fn user_message(ctx: &mut dyn BuiltinContext, args: &[Arg], level: &str) -> Value {
    let message = format(&text(args, 0), &rest(args, 1));
    ctx.print(&format!("{}: {}\n", level, message));
    ctx.notice(&format!("{}: {}", level, message));
    Value::zero()
}

fn user_notice(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    user_message(ctx, args, "NOTICE")
}

fn user_warning(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    user_message(ctx, args, "WARNING")
}

fn user_error(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    user_message(ctx, args, "ERROR")
}

pub(super) fn register(table: &mut Table) {
    table.insert("PRINT", print as BuiltinFn);
    table.insert("TRACE", print as BuiltinFn);
    table.insert("MAKESTRING", make_string as BuiltinFn);
    table.insert("GENERATEUSERNOTICE", user_notice as BuiltinFn);
    table.insert("GENERATEUSERWARNING", user_warning as BuiltinFn);
    table.insert("GENERATEUSERERROR", user_error as BuiltinFn);
}
