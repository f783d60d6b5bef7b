//! Spec §6 "Thread-safe" UDP operation: `SendTo` callable from any thread
//! via `UdpHandle`, not just synchronously inline from `react_datagram`.

use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use reactorcore::{Action, Connection, EventLoop, Handler, LoopConfig, UdpHandle};

struct NoopHandler;

impl Handler<()> for NoopHandler {
    fn react(&mut self, _frame: &[u8], _conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        (None, Action::None)
    }
}

fn spawn_udp_loop() -> (SocketAddr, UdpHandle) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut event_loop: EventLoop<NoopHandler, ()> =
            EventLoop::new(NoopHandler, LoopConfig::default()).expect("event loop construction");
        event_loop
            .bind_udp("127.0.0.1:0".parse().unwrap())
            .expect("bind ephemeral udp socket");
        let addr = event_loop.local_addr_udp().expect("udp socket bound");
        tx.send((addr, event_loop.udp_handle())).unwrap();
        event_loop.run().expect("event loop run");
    });
    rx.recv().expect("loop failed to start")
}

#[test]
fn send_to_from_foreign_thread_reaches_the_peer() {
    let _ = env_logger::try_init();
    let (_server_addr, handle) = spawn_udp_loop();

    let client = UdpSocket::bind("127.0.0.1:0").expect("bind client socket");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let client_addr = client.local_addr().unwrap();

    thread::spawn(move || {
        handle
            .send_to(b"hello from another thread".to_vec(), client_addr)
            .expect("submit send_to");
    });

    let mut buf = [0u8; 64];
    let (n, _) = client.recv_from(&mut buf).expect("recv datagram");
    assert_eq!(&buf[..n], b"hello from another thread");
}

#[test]
fn send_to_before_bind_is_a_silent_no_op() {
    // The handle exists independently of whether a UDP socket is bound;
    // exercising this confirms the no-socket branch in `handle_udp_send`
    // doesn't panic or error out the submission.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut event_loop: EventLoop<NoopHandler, ()> =
            EventLoop::new(NoopHandler, LoopConfig::default()).expect("event loop construction");
        tx.send(event_loop.udp_handle()).unwrap();
        event_loop.run().expect("event loop run");
    });
    let handle = rx.recv().expect("loop failed to start");

    let target: SocketAddr = "127.0.0.1:0".parse().unwrap();
    handle
        .send_to(b"nobody is listening".to_vec(), target)
        .expect("submit send_to even with no bound socket");
}
