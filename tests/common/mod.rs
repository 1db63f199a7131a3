//! Shared helpers for the network tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hostlink::{scheduler, Client, ClientConfig, Config, Dispatcher, Scheduler, Server};

/// A server plus a host loop running on its own thread
pub struct TestHost<S: 'static> {
    pub server: Server<S>,
    pub scheduler: Scheduler<S>,
    pub addr: SocketAddr,
    running: Arc<AtomicBool>,
    host_thread: Option<JoinHandle<()>>,
}

pub fn test_config() -> Config {
    Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_ms(20)
        .join_timeout_ms(1000)
        .tick_interval_ms(5)
        .build()
}

pub fn start_host<S: Send + 'static>(state: S, dispatcher: Dispatcher<S>) -> TestHost<S> {
    start_host_with_config(state, dispatcher, test_config())
}

pub fn start_host_with_config<S: Send + 'static>(
    mut state: S,
    dispatcher: Dispatcher<S>,
    config: Config,
) -> TestHost<S> {
    let (scheduler, host_loop) = scheduler::channel::<S>();
    let tick = config.tick_interval();

    let server = Server::new(config, scheduler.clone(), Arc::new(dispatcher));
    let addr = server.start().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let host_running = Arc::clone(&running);
    let host_thread = thread::spawn(move || {
        host_loop.run(&mut state, tick, &host_running, |_| {});
    });

    TestHost {
        server,
        scheduler,
        addr,
        running,
        host_thread: Some(host_thread),
    }
}

impl<S: 'static> TestHost<S> {
    pub fn client(&self) -> Client {
        Client::new(
            ClientConfig::builder()
                .server_addr(self.addr.to_string())
                .default_timeout_ms(5000)
                .build(),
        )
    }
}

impl<S: 'static> Drop for TestHost<S> {
    fn drop(&mut self) {
        self.server.stop();
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.host_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Poll `condition` until it holds or `limit` passes
pub fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
