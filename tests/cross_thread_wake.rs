//! Spec §8 end-to-end scenario 3: cross-thread wake.

mod common;

use std::io::Read;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reactorcore::{Action, ConnHandle, Connection, Handler};

struct WakeHandler {
    handle_slot: Arc<Mutex<Option<ConnHandle<()>>>>,
}

impl Handler<()> for WakeHandler {
    fn on_opened(&mut self, conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        *self.handle_slot.lock().unwrap() = Some(conn.handle());
        (None, Action::None)
    }

    fn react(&mut self, frame: &[u8], _conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        if frame.is_empty() {
            // This is the synthetic wake event, not a peer read.
            (Some(b"woken".to_vec()), Action::None)
        } else {
            (None, Action::None)
        }
    }
}

#[test]
fn foreign_thread_wake_invokes_react_promptly() {
    let handle_slot: Arc<Mutex<Option<ConnHandle<()>>>> = Arc::new(Mutex::new(None));
    let addr = common::spawn_loop(WakeHandler {
        handle_slot: handle_slot.clone(),
    });

    let mut client = TcpStream::connect(addr).expect("connect");

    let handle = loop {
        if let Some(h) = handle_slot.lock().unwrap().clone() {
            break h;
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    let started = Instant::now();
    std::thread::spawn(move || {
        handle.wake().expect("wake");
    });

    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).expect("woken reply");
    assert_eq!(&buf, b"woken");
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "wake took too long: {:?}",
        started.elapsed()
    );
}
