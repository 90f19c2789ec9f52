//! Integration tests for graceful shutdown of `lf serve`.
//! Verifies that closing stdin (EOF) causes a clean exit.

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn lf_binary() -> std::path::PathBuf {
    assert_cmd::cargo::cargo_bin!("lf").into()
}

fn spawn_serve(data_dir: &TempDir) -> std::process::Child {
    Command::new(lf_binary())
        .arg("serve")
        .env("LF_DATA_DIR", data_dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn lf serve")
}

/// Wait for the database file to appear, indicating the server has opened its store.
fn wait_for_database(data_dir: &TempDir) {
    let db = data_dir.path().join("engine.db");
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if db.exists() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Send the MCP initialize handshake so the server enters its main loop.
fn mcp_handshake(child: &mut std::process::Child) {
    let stdin = child.stdin.as_mut().expect("stdin pipe");

    let init_req = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test", "version": "0.1.0" }
        }
    });
    send_jsonrpc(stdin, &init_req);

    std::thread::sleep(Duration::from_millis(300));

    let initialized = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    });
    send_jsonrpc(stdin, &initialized);

    std::thread::sleep(Duration::from_millis(200));
}

/// Send a JSON-RPC message as newline-delimited JSON (rmcp stdio format).
fn send_jsonrpc(stdin: &mut impl Write, msg: &serde_json::Value) {
    let line = serde_json::to_string(msg).unwrap();
    writeln!(stdin, "{line}").unwrap();
    stdin.flush().unwrap();
}

/// Closing stdin before MCP init should still exit cleanly (code 0).
#[test]
fn serve_exits_on_early_stdin_eof() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    wait_for_database(&dir);

    drop(child.stdin.take());

    let start = Instant::now();
    let output = child.wait_with_output().expect("wait");
    let elapsed = start.elapsed();

    assert!(
        output.status.success(),
        "early stdin EOF should exit 0, got {}",
        output.status
    );
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

/// After full MCP handshake, closing stdin should trigger clean shutdown.
#[test]
fn serve_exits_on_stdin_eof() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    wait_for_database(&dir);
    mcp_handshake(&mut child);

    drop(child.stdin.take());

    let start = Instant::now();
    let output = child.wait_with_output().expect("wait");
    let elapsed = start.elapsed();

    assert!(
        output.status.success(),
        "lf serve should exit 0 on stdin EOF, got {}",
        output.status
    );
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
}

#[test]
fn tool_call_is_answered_and_persisted() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    wait_for_database(&dir);
    mcp_handshake(&mut child);

    let stdin = child.stdin.as_mut().expect("stdin pipe");
    let learn_req = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {
            "name": "lf_learn",
            "arguments": { "prompt": "hello", "response": "hi there" }
        }
    });
    send_jsonrpc(stdin, &learn_req);

    // The initialize reply comes first; read until the tool reply.
    let stdout = child.stdout.take().expect("stdout pipe");
    let mut reader = BufReader::new(stdout);
    let mut reply = serde_json::Value::Null;
    for _ in 0..2 {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        reply = serde_json::from_str(&line).unwrap();
        if reply["id"] == 2 {
            break;
        }
    }
    assert_eq!(reply["id"], 2);
    assert!(reply["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("\"learned\": true"));

    drop(child.stdin.take());
    child.wait().expect("wait");

    // After clean exit the WAL is empty or gone (TRUNCATE checkpoint on close)
    let wal_path = dir.path().join("engine.db-wal");
    if wal_path.exists() {
        let wal_size = std::fs::metadata(&wal_path).unwrap().len();
        assert_eq!(
            wal_size, 0,
            "WAL should be empty after TRUNCATE checkpoint, was {wal_size} bytes"
        );
    }

    #[allow(deprecated)]
    assert_cmd::Command::cargo_bin("lf")
        .unwrap()
        .env("LF_DATA_DIR", dir.path())
        .args(["respond", "hello"])
        .assert()
        .success()
        .stdout("hi there\n");
}
