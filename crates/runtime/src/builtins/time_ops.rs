//! Date and time built-ins over the host clock
//!
//! The formatting helpers take a `NaiveDateTime` so they can be checked
//! against fixed instants; the built-ins feed them `Local::now()`.

use super::{Arg, BuiltinContext, BuiltinFn, Table, num};
use crate::value::Value;
use chrono::{Datelike, Local, NaiveDateTime, Timelike};

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// `Date(fmt)`: 1 MM/DD/YYYY, 2 DD/MM/YYYY, 3 YYYY/MM/DD, 4 MM/DD/YY,
/// 5 DD/MM/YY; other codes fall back to 1
pub fn format_date(at: &NaiveDateTime, code: i64) -> String {
    let pattern = match code {
        2 => "%d/%m/%Y",
        3 => "%Y/%m/%d",
        4 => "%m/%d/%y",
        5 => "%d/%m/%y",
        _ => "%m/%d/%Y",
    };
    at.format(pattern).to_string()
}

pub fn format_time(at: &NaiveDateTime) -> String {
    at.format("%H:%M:%S").to_string()
}

fn date(_ctx: &mut dyn BuiltinContext, args: &[Arg]) -> Value {
    let code = if args.is_empty() { 1 } else { num(args, 0) };
    Value::Text(format_date(&now(), code))
}

fn time(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Text(format_time(&now()))
}

fn day(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Text(now().format("%A").to_string())
}

fn month(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Text(now().format("%B").to_string())
}

fn date_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().day()))
}

fn month_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().month()))
}

fn year_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().year()))
}

fn hour_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().hour()))
}

fn minutes_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().minute()))
}

fn seconds_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().second()))
}

/// Sunday is 0
fn day_of_week_num(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(i64::from(now().weekday().num_days_from_sunday()))
}

fn ticks(ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::Number(ctx.ticks())
}

pub(super) fn register(table: &mut Table) {
    table.insert("DATE", date as BuiltinFn);
    table.insert("TIME", time as BuiltinFn);
    table.insert("DAY", day as BuiltinFn);
    table.insert("MONTH", month as BuiltinFn);
    table.insert("GETDATENUM", date_num as BuiltinFn);
    table.insert("GETMONTHNUM", month_num as BuiltinFn);
    table.insert("GETYEARNUM", year_num as BuiltinFn);
    table.insert("GETHOURNUM", hour_num as BuiltinFn);
    table.insert("GETMINUTESNUM", minutes_num as BuiltinFn);
    table.insert("GETSECONDSNUM", seconds_num as BuiltinFn);
    table.insert("GETDAYOFWEEKNUM", day_of_week_num as BuiltinFn);
    table.insert("GETTICKS", ticks as BuiltinFn);
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use super::*;
    use chrono::NaiveDate;

    fn instant() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 30))
            .unwrap()
    }

    #[test]
    fn test_date_formats() {
        let at = instant();
        assert_eq!(format_date(&at, 1), "03/07/2024");
        assert_eq!(format_date(&at, 2), "07/03/2024");
        assert_eq!(format_date(&at, 3), "2024/03/07");
        assert_eq!(format_date(&at, 4), "03/07/24");
        assert_eq!(format_date(&at, 5), "07/03/24");
        assert_eq!(format_date(&at, 42), "03/07/2024");
        assert_eq!(format_time(&at), "09:05:30");
    }

    #[test]
    fn test_numeric_fields_are_in_range() {
        let mut ctx = TestContext::default();
        let month = month_num(&mut ctx, &[]).as_number();
        assert!((1..=12).contains(&month));
        let dow = day_of_week_num(&mut ctx, &[]).as_number();
        assert!((0..=6).contains(&dow));
        assert!(year_num(&mut ctx, &[]).as_number() >= 2024);
        assert_eq!(ticks(&mut ctx, &[]), Value::Number(1234));
        assert_eq!(time(&mut ctx, &[]).as_text().len(), 8);
    }
}
