//! Tests for the simulated file system and network as seen by programs
//!
//! These tests verify that file and socket functions reach the virtual
//! devices and that replies come back through the receive handlers.

use splus_runtime::{Interpreter, RunOutcome, RuntimeConfig, SocketStatus, Transcript, Value};
use std::time::Duration;

fn interpreter() -> (Interpreter, Transcript) {
    let transcript = Transcript::new();
    let interp = Interpreter::with_observer(
        RuntimeConfig::new().with_virtual_clock(),
        transcript.clone(),
    );
    (interp, transcript)
}

fn text(interp: &Interpreter, path: &str) -> String {
    interp.value_of(path).map(|v| v.as_text()).unwrap_or_default()
}

fn number(interp: &Interpreter, path: &str) -> i64 {
    interp.value_of(path).map_or(i64::MIN, |v| v.as_number())
}

#[test]
fn test_file_round_trip() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
STRING line[100];
INTEGER handle, written, readn;
SIGNED_INTEGER missing;
FUNCTION Main()
{
    StartFileOperations();
    handle = FileOpen("\\NVRAM\\Logs\\room.txt", _O_WRONLY | _O_CREAT);
    written = FileWrite(handle, "hello", 5);
    FileClose(handle);
    handle = FileOpen("\\NVRAM\\Logs\\room.txt", _O_APPEND);
    FileWrite(handle, " world");
    FileClose(handle);
    handle = FileOpen("\\NVRAM\\Logs\\room.txt", _O_RDONLY);
    readn = FileRead(handle, line, 100);
    FileClose(handle);
    missing = FileOpen("\\NVRAM\\nothing.txt", _O_RDONLY);
    EndFileOperations();
}
"#,
    );
    assert_eq!(interp.run_main(), RunOutcome::Completed);
    assert_eq!(number(&interp, "written"), 5);
    assert_eq!(number(&interp, "readn"), 11);
    assert_eq!(text(&interp, "line"), "hello world");
    assert_eq!(number(&interp, "missing"), -1);

    let fs = interp.filesystem();
    assert!(fs.is_directory("/nvram/logs"));
    assert_eq!(fs.contents("/NVRAM/Logs/room.txt"), Some(&b"hello world"[..]));
}

#[test]
fn test_seek_far_past_end_then_write_appends() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
SIGNED_INTEGER h, written;
SIGNED_LONG_INTEGER pos;
FUNCTION Main()
{
    h = FileOpen("/user/a.txt", _O_WRONLY | _O_CREAT);
    FileWrite(h, "abc", 3);
    pos = FileSeek(h, 9223372036854775807, SEEK_SET);
    written = FileWrite(h, "x", 1);
    FileClose(h);
}
"#,
    );
    assert_eq!(interp.run_main(), RunOutcome::Completed);
    assert_eq!(number(&interp, "pos"), 3);
    assert_eq!(number(&interp, "written"), 1);
    assert_eq!(interp.filesystem().contents("/user/a.txt"), Some(&b"abcx"[..]));
}

#[test]
fn test_find_first_lists_matching_files() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
STRING first[40], second[40], third[40];
FUNCTION Main()
{
    FindFirst("\\USER\\*.cfg", first);
    FindNext(second);
    FindNext(third);
    FindClose();
}
"#,
    );
    // Loading resets the file system, so fixtures go in afterwards
    interp.filesystem_mut().put_file("/user/a.cfg", b"1");
    interp.filesystem_mut().put_file("/user/b.cfg", b"2");
    interp.filesystem_mut().put_file("/user/c.txt", b"3");
    assert_eq!(interp.run_main(), RunOutcome::Completed);
    assert_eq!(text(&interp, "first"), "a.cfg");
    assert_eq!(text(&interp, "second"), "b.cfg");
    assert_eq!(text(&interp, "third"), "");
}

#[test]
fn test_projector_fixture_exchange() {
    let (mut interp, transcript) = interpreter();
    let load = interp.load(include_str!("fixtures/projector.usp"));
    assert!(load.is_ok());
    assert_eq!(interp.run_main(), RunOutcome::Completed);
    assert_eq!(number(&interp, "status"), 0);

    let id = interp.socket_id("projector").expect("socket id");
    assert_eq!(interp.network().status(id), SocketStatus::Connecting);
    assert_eq!(number(&interp, "projector.SocketStatus"), 1);

    interp.settle();
    assert_eq!(number(&interp, "connected"), 1);
    assert_eq!(text(&interp, "reply"), "PWR=ON\r\n");
    assert_eq!(number(&interp, "disconnected"), 1);
    assert_eq!(interp.network().status(id), SocketStatus::Closed);

    let socket = interp.network().socket(id).expect("socket");
    assert_eq!(socket.tx_log, vec!["PWR ON\r\n".to_string()]);
    assert_eq!(socket.rx_log, vec!["PWR=ON\r\n".to_string()]);
    // Connect takes 100ms, the reply another 50ms
    assert_eq!(interp.now(), Duration::from_millis(150));
    assert!(transcript.errors().is_empty());
}

#[test]
fn test_unknown_command_gets_error_reply() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
TCP_CLIENT link[256];
SOCKETCONNECT link
{
    SocketSend(link, "FOCUS NEAR\r\n");
}
FUNCTION Main()
{
    SocketConnectClient(link, "192.168.1.50", 4352, 0);
}
"#,
    );
    interp.run_main();
    interp.settle();
    assert_eq!(text(&interp, "link.SocketRxBuf"), "ERR:UNKNOWN_CMD FOCUS NEAR\r\n");
}

#[test]
fn test_serial_buffer_gathers_lines() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
BUFFER_INPUT rx$[200];
STRING line[100];
INTEGER lines;
CHANGE rx$
{
    if (GatherAsync("\r", rx$, line))
    {
        lines = lines + 1;
    }
}
"#,
    );
    interp.set_string_input("rx$", "VOLUME=");
    assert_eq!(number(&interp, "lines"), 0);
    assert_eq!(text(&interp, "rx$"), "");

    interp.set_string_input("rx$", "40\rOK");
    assert_eq!(number(&interp, "lines"), 1);
    assert_eq!(text(&interp, "line"), "VOLUME=40\r");
}

#[test]
fn test_sending_on_a_closed_socket_fails() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
TCP_CLIENT link[256];
SIGNED_INTEGER sent;
FUNCTION Main()
{
    sent = SocketSend(link, "hello");
}
"#,
    );
    assert_eq!(interp.run_main(), RunOutcome::Completed);
    assert_eq!(number(&interp, "sent"), -1);
    assert_eq!(interp.pending_timers(), 0);
}

#[test]
fn test_string_input_fires_only_on_change() {
    let (mut interp, _) = interpreter();
    interp.load(
        r#"
STRING_INPUT name$[20];
INTEGER changes;
STRING seen[20];
CHANGE name$
{
    changes = changes + 1;
    seen = name$;
}
"#,
    );
    interp.set_string_input("name$", "Lobby");
    interp.set_string_input("name$", "Lobby");
    interp.set_string_input("name$", "Hall");
    assert_eq!(number(&interp, "changes"), 2);
    assert_eq!(interp.value_of("seen"), Some(Value::Text("Hall".to_string())));
}
