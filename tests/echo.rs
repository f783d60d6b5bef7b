//! Spec §8 end-to-end scenario 1: echo.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reactorcore::{Action, Connection, Error, Handler};

#[derive(Clone, Default)]
struct Counters {
    opens: Arc<Mutex<u32>>,
    closes: Arc<Mutex<u32>>,
    reacts: Arc<Mutex<u32>>,
}

struct EchoHandler {
    counters: Counters,
}

impl Handler<()> for EchoHandler {
    fn on_opened(&mut self, _conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        *self.counters.opens.lock().unwrap() += 1;
        (None, Action::None)
    }

    fn on_closed(&mut self, _conn: &mut Connection<()>, _err: Option<&Error>) -> Action {
        *self.counters.closes.lock().unwrap() += 1;
        Action::None
    }

    fn react(&mut self, frame: &[u8], _conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        *self.counters.reacts.lock().unwrap() += 1;
        (Some(frame.to_vec()), Action::None)
    }
}

#[test]
fn echoes_each_message_back_verbatim() {
    let counters = Counters::default();
    let addr = common::spawn_loop(EchoHandler {
        counters: counters.clone(),
    });

    let mut client = TcpStream::connect(addr).expect("connect");

    client.write_all(b"hello").unwrap();
    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    client.write_all(b"world\n").unwrap();
    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"world\n");

    drop(client);
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(*counters.opens.lock().unwrap(), 1);
    assert!(*counters.reacts.lock().unwrap() >= 2);
    assert_eq!(*counters.closes.lock().unwrap(), 1);
}
