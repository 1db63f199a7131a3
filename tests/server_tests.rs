//! End-to-end tests for Server, Connection and Client
//!
//! These tests verify:
//! - The request/response lifecycle over real sockets
//! - Fragmented delivery
//! - Commands never run concurrently on the host
//! - Listener shutdown and port release

mod common;

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{start_host, start_host_with_config, test_config, wait_until};
use hostlink::{scheduler, Dispatcher, HandlerError, Params, Response, Server};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Default)]
struct Host {
    calls: u64,
}

fn echo_dispatcher() -> Dispatcher<Host> {
    Dispatcher::builder()
        .register("echo", |host: &mut Host, params: Params| {
            host.calls += 1;
            Ok(Value::Object(params))
        })
        .register("calls", |host: &mut Host, _params| Ok(json!(host.calls)))
        .register("fail", |_host: &mut Host, _params| {
            Err(HandlerError::msg("render failed"))
        })
        .register("explode", |_host: &mut Host, _params| -> Result<Value, HandlerError> {
            panic!("handler blew up")
        })
        .build()
}

/// Send raw bytes and read until the server closes
fn raw_exchange(addr: std::net::SocketAddr, chunks: &[&[u8]], pause: Duration) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_nodelay(true).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    for chunk in chunks {
        stream.write_all(chunk).unwrap();
        stream.flush().unwrap();
        thread::sleep(pause);
    }

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_echo_end_to_end() {
    let host = start_host(Host::default(), echo_dispatcher());
    let client = host.client();

    let mut params = Params::new();
    params.insert("value".into(), json!(42));
    let response = client.send_command("echo", params);

    assert_eq!(response, Response::success(json!({ "value": 42 })));
    let wire: Value = serde_json::to_value(&response).unwrap();
    assert_eq!(wire, json!({ "status": "success", "result": { "value": 42 } }));
}

#[test]
fn test_unknown_command_end_to_end() {
    let host = start_host(Host::default(), echo_dispatcher());

    let response = host.client().send_command("no_such_command", Params::new());

    assert!(!response.is_success());
    assert!(response.message().unwrap().contains("no_such_command"));
}

#[test]
fn test_handler_error_and_panic_leave_server_usable() {
    let host = start_host(Host::default(), echo_dispatcher());
    let client = host.client();

    assert_eq!(
        client.send_command("fail", Params::new()),
        Response::error("render failed")
    );
    let panicked = client.send_command("explode", Params::new());
    assert!(panicked.message().unwrap().contains("handler blew up"));

    let response = client.send_command("echo", Params::new());
    assert_eq!(response, Response::success(json!({})));
}

#[test]
fn test_one_request_per_connection() {
    let host = start_host(Host::default(), echo_dispatcher());

    let response = raw_exchange(host.addr, &[br#"{"type":"calls","params":{}}"#], Duration::ZERO);

    // The server closed after exactly one response
    let decoded: Response = serde_json::from_slice(&response).unwrap();
    assert!(decoded.is_success());
}

#[test]
fn test_fragmented_delivery_over_socket() {
    let host = start_host(Host::default(), echo_dispatcher());
    let request = br#"{"type": "echo", "params": {"value": 42, "text": "a } b"}}"#;

    let chunks: Vec<&[u8]> = request.chunks(1).collect();
    let response = raw_exchange(host.addr, &chunks, Duration::from_millis(1));

    let decoded: Response = serde_json::from_slice(&response).unwrap();
    assert_eq!(
        decoded,
        Response::success(json!({ "value": 42, "text": "a } b" }))
    );
}

#[test]
fn test_params_default_to_empty() {
    let host = start_host(Host::default(), echo_dispatcher());

    let response = raw_exchange(host.addr, &[br#"{"type":"echo"}"#], Duration::ZERO);

    let decoded: Response = serde_json::from_slice(&response).unwrap();
    assert_eq!(decoded, Response::success(json!({})));
}

#[test]
fn test_malformed_request_gets_error_response() {
    let host = start_host(Host::default(), echo_dispatcher());

    let response = raw_exchange(host.addr, &[b"{\"type\": oops}"], Duration::ZERO);

    let decoded: Response = serde_json::from_slice(&response).unwrap();
    assert!(decoded.message().unwrap().starts_with("Malformed request"));
}

#[test]
fn test_oversized_request_gets_error_response() {
    let config = hostlink::Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(20)
        .max_request_bytes(64)
        .build();
    let host = start_host_with_config(Host::default(), echo_dispatcher(), config);
    let big = format!(r#"{{"type":"echo","params":{{"blob":"{}"}}}}"#, "x".repeat(200));

    let response = raw_exchange(host.addr, &[big.as_bytes()], Duration::ZERO);

    let decoded: Response = serde_json::from_slice(&response).unwrap();
    assert!(decoded.message().unwrap().contains("too large"));
}

#[test]
fn test_client_closing_early_gets_no_response() {
    let host = start_host(Host::default(), echo_dispatcher());

    let mut stream = TcpStream::connect(host.addr).unwrap();
    stream.write_all(br#"{"type":"echo","par"#).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    assert!(response.is_empty());

    // Incomplete commands never reach the host
    let calls = host.scheduler.execute(|h: &mut Host| h.calls).unwrap();
    assert_eq!(calls, 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_commands_never_run_concurrently() {
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let dispatcher = {
        let active = Arc::clone(&active);
        let max_seen = Arc::clone(&max_seen);
        Dispatcher::<Host>::builder()
            .register("critical", move |host: &mut Host, _params| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                host.calls += 1;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(host.calls))
            })
            .build()
    };
    let host = start_host(Host::default(), dispatcher);

    let clients: Vec<_> = (0..16)
        .map(|_| {
            let client = host.client();
            thread::spawn(move || {
                (0..5)
                    .map(|_| client.send_command("critical", Params::new()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut responses = Vec::new();
    for client in clients {
        responses.extend(client.join().unwrap());
    }

    assert_eq!(responses.len(), 80);
    assert!(responses.iter().all(Response::is_success));
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);

    // Every call saw a distinct count, so none were lost or doubled
    let mut counts: Vec<u64> = responses
        .iter()
        .map(|r| r.result().unwrap().as_u64().unwrap())
        .collect();
    counts.sort_unstable();
    assert_eq!(counts, (1..=80).collect::<Vec<_>>());
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_stop_releases_port() {
    let (scheduler, _host_loop) = scheduler::channel::<Host>();
    let server = Server::new(test_config(), scheduler, Arc::new(echo_dispatcher()));
    let addr = server.start().unwrap();
    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(addr));

    // Idle connections that never send anything
    let idle: Vec<TcpStream> = (0..4).map(|_| TcpStream::connect(addr).unwrap()).collect();
    assert!(wait_until(Duration::from_secs(2), || server.active_connections() == 4));

    let started = Instant::now();
    server.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!server.is_running());
    assert_eq!(server.local_addr(), None);

    // The port can be bound again right away
    let rebound = TcpListener::bind(addr);
    assert!(rebound.is_ok());
    drop(rebound);

    // Idle handlers notice the stop and exit
    assert!(wait_until(Duration::from_secs(2), || server.active_connections() == 0));
    drop(idle);
}

#[test]
fn test_stop_is_idempotent() {
    let (scheduler, _host_loop) = scheduler::channel::<Host>();
    let server = Server::new(test_config(), scheduler, Arc::new(echo_dispatcher()));

    server.stop();
    server.start().unwrap();
    server.stop();
    server.stop();

    assert!(!server.is_running());
}

#[test]
fn test_restart_after_stop() {
    let (scheduler, _host_loop) = scheduler::channel::<Host>();
    let server = Server::new(test_config(), scheduler, Arc::new(echo_dispatcher()));

    let first = server.start().unwrap();
    // Second start while running keeps the same listener
    assert_eq!(server.start().unwrap(), first);
    server.stop();

    let second = server.start().unwrap();
    assert!(server.is_running());
    assert!(TcpStream::connect(second).is_ok());
}

#[test]
fn test_abandoned_accept_thread_exits_after_restart() {
    // The accept thread sleeps longer than stop() is willing to wait
    let config = hostlink::Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(300)
        .join_timeout_ms(1)
        .build();
    let (scheduler, _host_loop) = scheduler::channel::<Host>();
    let server = Server::new(config, scheduler, Arc::new(echo_dispatcher()));

    let first = server.start().unwrap();
    server.stop();
    let second = server.start().unwrap();
    assert_ne!(first, second);

    // The old thread wakes, sees its own run stopped and drops its listener
    assert!(wait_until(Duration::from_secs(3), || {
        TcpStream::connect(first).is_err()
    }));
    assert!(TcpStream::connect(second).is_ok());
}

#[test]
fn test_start_fails_on_taken_port() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();
    let config = hostlink::Config::builder()
        .listen_addr(addr.to_string())
        .accept_poll_ms(20)
        .build();
    let (scheduler, _host_loop) = scheduler::channel::<Host>();
    let server = Server::new(config, scheduler, Arc::new(echo_dispatcher()));

    assert!(matches!(
        server.start(),
        Err(hostlink::RelayError::Bind { .. })
    ));
    assert!(!server.is_running());
}

#[test]
fn test_host_loop_gone_closes_without_response() {
    let (scheduler, host_loop) = scheduler::channel::<Host>();
    let server = Server::new(test_config(), scheduler, Arc::new(echo_dispatcher()));
    let addr = server.start().unwrap();
    drop(host_loop);

    let response = raw_exchange(addr, &[br#"{"type":"echo","params":{}}"#], Duration::ZERO);

    assert!(response.is_empty());
}
