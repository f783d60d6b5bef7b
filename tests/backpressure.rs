//! Spec §8 end-to-end scenario 2: backpressure.
//!
//! The peer doesn't read for a while after connecting, forcing the
//! server's outbound buffer to absorb writes the kernel won't yet accept;
//! once the peer starts reading, every byte still arrives, in order.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reactorcore::{Action, ConnHandle, Connection, Handler};

const CHUNK: usize = 4 * 1024;
const CHUNKS: usize = 256; // 1 MiB total

struct BackpressureHandler {
    handle_slot: Arc<Mutex<Option<ConnHandle<()>>>>,
}

impl Handler<()> for BackpressureHandler {
    fn on_opened(&mut self, conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        *self.handle_slot.lock().unwrap() = Some(conn.handle());
        (None, Action::None)
    }

    fn react(&mut self, _frame: &[u8], _conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        (None, Action::None)
    }
}

#[test]
fn outbound_buffer_absorbs_writes_until_peer_drains_them() {
    let handle_slot = Arc::new(Mutex::new(None));
    let addr = common::spawn_loop(BackpressureHandler {
        handle_slot: handle_slot.clone(),
    });

    let mut client = TcpStream::connect(addr).expect("connect");

    // Wait for on_opened to stash the connection handle.
    let handle = loop {
        if let Some(h) = handle_slot.lock().unwrap().clone() {
            break h;
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    // Fire off 1 MiB of async writes before the client reads anything, so
    // at least some of it must land in the outbound buffer rather than
    // going straight to the kernel.
    for i in 0..CHUNKS {
        let chunk = vec![(i % 256) as u8; CHUNK];
        handle.async_write(chunk).expect("async_write");
    }

    let mut total = vec![0u8; CHUNK * CHUNKS];
    client.read_exact(&mut total).expect("drain all chunks");

    for (i, window) in total.chunks(CHUNK).enumerate() {
        assert!(
            window.iter().all(|&b| b == (i % 256) as u8),
            "chunk {i} corrupted or reordered"
        );
    }
}
