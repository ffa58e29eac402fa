//! Whole-program tests for the interpreter
//!
//! These tests load complete programs, run Main on the virtual clock and
//! check variable state, output writes and reported errors.

use splus_runtime::observer::SignalKind;
use splus_runtime::{Interpreter, RunOutcome, RuntimeConfig, Transcript, Value};

fn interpreter(config: RuntimeConfig) -> (Interpreter, Transcript) {
    let transcript = Transcript::new();
    let interp = Interpreter::with_observer(config.with_virtual_clock(), transcript.clone());
    (interp, transcript)
}

fn run(source: &str) -> (Interpreter, Transcript, RunOutcome) {
    let (mut interp, transcript) = interpreter(RuntimeConfig::new());
    let load = interp.load(source);
    assert!(load.is_ok(), "parse errors: {:?}", load.parse_errors);
    let outcome = interp.run_main();
    (interp, transcript, outcome)
}

fn number(interp: &Interpreter, path: &str) -> i64 {
    match interp.value_of(path) {
        Some(value) => value.as_number(),
        None => panic!("No value for '{}'", path),
    }
}

#[test]
fn test_integer_widths_wrap() {
    let (interp, _, outcome) = run(r#"
INTEGER x;
SIGNED_INTEGER s;
LONG_INTEGER l;
SIGNED_LONG_INTEGER sl;
FUNCTION Main()
{
    x = 65535;
    x = x + 1;
    s = 32767;
    s = s + 1;
    l = 0;
    l = l - 1;
    sl = 2147483647;
    sl = sl + 1;
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(number(&interp, "x"), 0);
    assert_eq!(number(&interp, "s"), -32768);
    assert_eq!(number(&interp, "l"), 4294967295);
    assert_eq!(number(&interp, "sl"), -2147483648);
}

#[test]
fn test_print_formats_arguments() {
    let (_, transcript, outcome) = run(r#"
FUNCTION Main()
{
    Print("%d-%s|%5d|%-3s|%x|%%\n", 42, "ab", 7, "z", 255);
    Print("%03d", 5);
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(transcript.console(), "42-ab|    7|z  |ff|%\n005");
}

#[test]
fn test_cswitch_falls_through_and_switch_does_not() {
    let (interp, _, _) = run(r#"
INTEGER a, b;
FUNCTION Main()
{
    cswitch (2)
    {
        case (1): { a = a + 1; }
        case (2): { a = a + 10; }
        case (3): { a = a + 100; break; }
        case (4): { a = a + 1000; }
    }
    switch (2)
    {
        case (1): { b = b + 1; }
        case (2): { b = b + 10; }
        case (3): { b = b + 100; }
    }
}
"#);
    assert_eq!(number(&interp, "a"), 110);
    assert_eq!(number(&interp, "b"), 10);
}

#[test]
fn test_cswitch_default_skipped_after_a_match() {
    let (interp, _, _) = run(r#"
INTEGER a;
FUNCTION Main()
{
    cswitch (2)
    {
        case (2): { a = a + 10; }
        default: { a = a + 100; }
    }
}
"#);
    assert_eq!(number(&interp, "a"), 10);
}

#[test]
fn test_cswitch_default_runs_without_a_match() {
    let (interp, _, _) = run(r#"
INTEGER a;
FUNCTION Main()
{
    cswitch (9)
    {
        case (1): { a = a + 1; }
        default: { a = a + 100; }
    }
}
"#);
    assert_eq!(number(&interp, "a"), 100);
}

#[test]
fn test_switch_default_runs_without_a_match() {
    let (interp, _, _) = run(r#"
INTEGER b, c;
FUNCTION Main()
{
    switch (9)
    {
        case (1): { c = c + 1; }
        case (2): { c = c + 10; }
        default: { c = c + 100; }
    }
    switch (2)
    {
        case (2): { b = b + 10; }
        default: { b = b + 100; }
    }
}
"#);
    assert_eq!(number(&interp, "c"), 100);
    assert_eq!(number(&interp, "b"), 10);
}

#[test]
fn test_for_loop_step_past_the_integer_range_ends() {
    let (interp, _, outcome) = run(r#"
SIGNED_LONG_INTEGER i, runs;
FUNCTION Main()
{
    for (i = 1 to 10 step 9223372036854775807)
    {
        runs = runs + 1;
    }
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(number(&interp, "runs"), 1);
    assert_eq!(number(&interp, "i"), 1);
}

#[test]
fn test_loops_and_functions() {
    let (interp, _, outcome) = run(r#"
INTEGER total, down, first, second, tries;
STRING greeting[40];

INTEGER_FUNCTION SumTo(INTEGER n)
{
    INTEGER i, s;
    for (i = 1 to n)
    {
        s = s + i;
    }
    return (s);
}

STRING_FUNCTION Greet(STRING who)
{
    return ("hello " + who);
}

FUNCTION Swap(BYREF INTEGER p, BYREF INTEGER q)
{
    INTEGER t;
    t = p;
    p = q;
    q = t;
}

FUNCTION Main()
{
    INTEGER i;
    total = SumTo(10);
    for (i = 10 to 1 step -3)
    {
        down = down + i;
    }
    do
    {
        tries = tries + 1;
    } until (tries >= 3);
    first = 1;
    second = 2;
    Swap(first, second);
    greeting = Greet("room");
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(number(&interp, "total"), 55);
    assert_eq!(number(&interp, "down"), 10 + 7 + 4 + 1);
    assert_eq!(number(&interp, "tries"), 3);
    assert_eq!(number(&interp, "first"), 2);
    assert_eq!(number(&interp, "second"), 1);
    assert_eq!(
        interp.value_of("greeting"),
        Some(Value::Text("hello room".to_string()))
    );
}

#[test]
fn test_structures_and_arrays() {
    let (interp, _, outcome) = run(r#"
STRUCTURE Preset
{
    INTEGER level;
    STRING name[20];
};
Preset current;
INTEGER grid[2][3];
INTEGER vals[4];

FUNCTION Main()
{
    current.level = 70;
    current.name = "Lecture";
    grid[1][2] = 12;
    SetArray(vals, 9);
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(number(&interp, "current.level"), 70);
    assert_eq!(
        interp.value_of("current.name"),
        Some(Value::Text("Lecture".to_string()))
    );
    assert_eq!(number(&interp, "grid[1][2]"), 12);
    assert_eq!(number(&interp, "vals[4]"), 9);
}

#[test]
fn test_string_capacity_truncates() {
    let (interp, _, _) = run(r#"
STRING short[4];
FUNCTION Main()
{
    short = "abcdefgh";
}
"#);
    assert_eq!(
        interp.value_of("short"),
        Some(Value::Text("abcd".to_string()))
    );
}

#[test]
fn test_step_limit_stops_runaway_main() {
    let (mut interp, transcript) = interpreter(RuntimeConfig::new().with_step_limit(1000));
    interp.load(
        r#"
INTEGER x;
FUNCTION Main()
{
    while (1)
    {
        x = x + 1;
    }
}
"#,
    );
    assert_eq!(interp.run_main(), RunOutcome::StepLimitExceeded);
    assert!(number(&interp, "x") > 0);
    let errors = transcript.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("exceeded step limit"));
}

#[test]
fn test_call_depth_guard() {
    let (mut interp, transcript) = interpreter(RuntimeConfig::new().with_max_call_depth(16));
    interp.load(
        r#"
INTEGER_FUNCTION Recurse(INTEGER n)
{
    return (Recurse(n + 1));
}
FUNCTION Main()
{
    Recurse(0);
}
"#,
    );
    match interp.run_main() {
        RunOutcome::Failed(diagnostic) => {
            assert!(diagnostic.message.contains("Call depth limit of 16"));
            assert!(diagnostic.line.is_some());
        }
        other => panic!("Expected a failure, got {:?}", other),
    }
    assert_eq!(transcript.errors().len(), 1);
}

#[test]
fn test_terminate_event_ends_main() {
    let (interp, _, outcome) = run(r#"
INTEGER before, after;
FUNCTION Main()
{
    before = 1;
    TerminateEvent;
    after = 1;
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(number(&interp, "before"), 1);
    assert_eq!(number(&interp, "after"), 0);
}

#[test]
fn test_runtime_faults_report_position() {
    let (_, transcript, outcome) = run(r#"
INTEGER vals[2];
FUNCTION Main()
{
    vals[5] = 1;
}
"#);
    match outcome {
        RunOutcome::Failed(diagnostic) => {
            assert!(diagnostic.message.contains("Index out of range"));
            assert_eq!(diagnostic.line, Some(5));
        }
        other => panic!("Expected a failure, got {:?}", other),
    }
    assert_eq!(transcript.errors().len(), 1);
}

#[test]
fn test_division_by_zero_is_a_notice() {
    let (interp, transcript, outcome) = run(r#"
INTEGER q;
FUNCTION Main()
{
    q = 7;
    q = q / 0;
}
"#);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(number(&interp, "q"), 0);
    assert!(
        transcript
            .notices()
            .iter()
            .any(|n| n.contains("Division by zero"))
    );
}

#[test]
fn test_room_control_fixture_handlers() {
    let (mut interp, transcript) = interpreter(RuntimeConfig::new());
    let load = interp.load(include_str!("fixtures/room_control.usp"));
    assert!(load.is_ok());
    assert_eq!(interp.run_main(), RunOutcome::NoMain);

    interp.set_digital_input("power", 1);
    // Same level again is not an edge
    interp.set_digital_input("power", 1);
    interp.set_digital_input("power", 0);
    assert_eq!(number(&interp, "pushes"), 1);
    assert_eq!(number(&interp, "releases"), 1);

    let lamp: Vec<Value> = transcript
        .outputs()
        .into_iter()
        .filter(|(kind, name, _)| *kind == SignalKind::Digital && name.eq_ignore_ascii_case("lamp"))
        .map(|(_, _, value)| value)
        .collect();
    assert_eq!(lamp, vec![Value::Number(1), Value::Number(0)]);
    assert_eq!(
        transcript.last_output("status"),
        Some(Value::Text("OFF".to_string()))
    );

    interp.set_analog_input("level", 21);
    assert_eq!(number(&interp, "shown"), 42);

    interp.set_digital_input("source[2]", 1);
    assert_eq!(number(&interp, "selected"), 2);
    assert_eq!(
        transcript.last_output("status"),
        Some(Value::Text("SOURCE 2".to_string()))
    );
}

#[test]
fn test_analog_input_fires_only_on_change() {
    let (mut interp, _) = interpreter(RuntimeConfig::new());
    interp.load(
        r#"
ANALOG_INPUT level;
INTEGER changes;
CHANGE level
{
    changes = changes + 1;
}
"#,
    );
    interp.set_analog_input("level", 300);
    interp.set_analog_input("level", 300);
    assert_eq!(number(&interp, "changes"), 1);
    interp.set_analog_input("level", 301);
    assert_eq!(number(&interp, "changes"), 2);
}

#[test]
fn test_assigning_an_input_faults() {
    let (_, _, outcome) = run(r#"
DIGITAL_INPUT power;
FUNCTION Main()
{
    power = 1;
}
"#);
    match outcome {
        RunOutcome::Failed(diagnostic) => {
            assert!(diagnostic.message.contains("Cannot assign to input"))
        }
        other => panic!("Expected a failure, got {:?}", other),
    }
}

#[test]
fn test_define_gates_conditional_code() {
    let source = r#"
INTEGER mode;
FUNCTION Main()
{
#IF_DEFINED DEBUG
    mode = 1;
#ENDIF
#IF_NOT_DEFINED DEBUG
    mode = 2;
#ENDIF
}
"#;
    let (mut plain, _) = interpreter(RuntimeConfig::new());
    plain.load(source);
    plain.run_main();
    assert_eq!(number(&plain, "mode"), 2);

    let (mut debug, _) = interpreter(RuntimeConfig::new().with_define("DEBUG"));
    debug.load(source);
    debug.run_main();
    assert_eq!(number(&debug, "mode"), 1);
}
