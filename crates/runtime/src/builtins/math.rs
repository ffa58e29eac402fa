//! Integer math and array built-ins

use super::{Arg, BuiltinContext, BuiltinFn, Table, num, target};
use crate::value::Value;
use rand::Rng;

// Min/Max compare as unsigned 32-bit, the way the integer types store
fn min(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let (a, b) = (num(args, 0), num(args, 1));
    Value::Number(if (a as u32) <= (b as u32) { a } else { b })
}

fn max(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let (a, b) = (num(args, 0), num(args, 1));
    Value::Number(if (a as u32) >= (b as u32) { a } else { b })
}

fn smin(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Number(num(args, 0).min(num(args, 1)))
}

fn smax(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Number(num(args, 0).max(num(args, 1)))
}

fn abs(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    Value::Number(num(args, 0).wrapping_abs())
}

/// `a * b / c` without intermediate overflow
fn mul_div(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let divisor = i128::from(num(args, 2));
    if divisor == 0 {
        ctx.notice("MulDiv: division by zero");
        return Value::zero();
    }
    let product = i128::from(num(args, 0)) * i128::from(num(args, 1));
    Value::Number((product / divisor) as i64)
}

/// Inclusive range; reversed bounds are swapped
fn random(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let (lo, hi) = (num(args, 0), num(args, 1));
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    Value::Number(rand::thread_rng().gen_range(lo..=hi))
}

fn set_array(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let Some(array) = target(args, 0) else {
        return Value::zero();
    };
    let fill = args.get(1).map(|a| a.value.clone()).unwrap_or_default();
    for key in ctx.array_keys(array.owner()) {
        ctx.set_var(&key, fill.clone());
    }
    Value::zero()
}

fn resize_array(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let name = target(args, 0).map_or_else(|| "?".to_string(), |k| k.owner().to_string());
    ctx.notice(&format!("ResizeArray({}) has no effect in simulation", name));
    Value::zero()
}

fn last_modified_index(ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let name = target(args, 0).map(|k| k.owner().to_string());
    Value::Number(ctx.last_modified_index(name.as_deref()))
}

pub(super) fn register(table: &mut Table) {
    table.insert("MIN", min as BuiltinFn);
    table.insert("MAX", max as BuiltinFn);
    table.insert("SMIN", smin as BuiltinFn);
    table.insert("SMAX", smax as BuiltinFn);
    table.insert("ABS", abs as BuiltinFn);
    table.insert("MULDIV", mul_div as BuiltinFn);
    table.insert("RANDOM", random as BuiltinFn);
    table.insert("SETARRAY", set_array as BuiltinFn);
    table.insert("RESIZEARRAY", resize_array as BuiltinFn);
    table.insert("GETLASTMODIFIEDARRAYINDEX", last_modified_index as BuiltinFn);
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use super::*;
    use crate::scope::SlotKey;

    fn call(f: BuiltinFn, args: &[Arg]) -> Value {
        f(&mut TestContext::default(), args)
    }

    #[test]
    fn test_unsigned_and_signed_bounds() {
        assert_eq!(call(min, &[Arg::value(3), Arg::value(9)]), Value::Number(3));
        // -1 is the largest unsigned value
        assert_eq!(call(max, &[Arg::value(-1), Arg::value(9)]), Value::Number(-1));
        assert_eq!(call(min, &[Arg::value(-1), Arg::value(9)]), Value::Number(9));
        assert_eq!(call(smin, &[Arg::value(-1), Arg::value(9)]), Value::Number(-1));
        assert_eq!(call(smax, &[Arg::value(-1), Arg::value(9)]), Value::Number(9));
        assert_eq!(call(abs, &[Arg::value(-12)]), Value::Number(12));
    }

    #[test]
    fn test_mul_div() {
        let big = Arg::value(4_000_000_000i64);
        assert_eq!(
            call(mul_div, &[big.clone(), big, Arg::value(4_000_000_000i64)]),
            Value::Number(4_000_000_000)
        );
        let mut ctx = TestContext::default();
        let got = mul_div(&mut ctx, &[Arg::value(1), Arg::value(2), Arg::value(0)]);
        assert_eq!(got, Value::zero());
        assert_eq!(ctx.notices.len(), 1);
    }

    #[test]
    fn test_random_stays_in_range() {
        for _ in 0..200 {
            let n = call(random, &[Arg::value(10), Arg::value(5)]).as_number();
            assert!((5..=10).contains(&n));
        }
        assert_eq!(call(random, &[Arg::value(4), Arg::value(4)]), Value::Number(4));
    }

    #[test]
    fn test_set_array_fills_every_element() {
        let mut ctx = TestContext::default()
            .with_var(SlotKey::indexed("levels", 0), 0)
            .with_var(SlotKey::indexed("levels", 1), 5)
            .with_var(SlotKey::indexed("levels", 2), 9);
        let levels = Arg::place(SlotKey::plain("levels"), 0);
        set_array(&mut ctx, &[levels, Arg::value(7)]);
        for i in 0..=2 {
            assert_eq!(ctx.vars[&SlotKey::indexed("levels", i)], Value::Number(7));
        }
    }

    #[test]
    fn test_last_modified_index_and_resize() {
        let mut ctx = TestContext::default();
        ctx.last_index.insert("LEVELS".to_string(), 4);
        let levels = Arg::place(SlotKey::plain("levels"), 0);
        assert_eq!(last_modified_index(&mut ctx, &[levels.clone()]), Value::Number(4));
        assert_eq!(last_modified_index(&mut ctx, &[]), Value::Number(0));

        resize_array(&mut ctx, &[levels, Arg::value(20)]);
        assert!(ctx.notices[0].contains("LEVELS"));
    }
}
