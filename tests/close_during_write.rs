//! Spec §8 end-to-end scenario 5: close during write.
//!
//! The handler returns `Action::Close` alongside a 64 KiB response; the
//! full response must still reach the peer before the socket goes away.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;

use reactorcore::{Action, Connection, Handler};

const RESPONSE_LEN: usize = 64 * 1024;

struct CloseWithResponseHandler;

impl Handler<()> for CloseWithResponseHandler {
    fn react(&mut self, _frame: &[u8], _conn: &mut Connection<()>) -> (Option<Vec<u8>>, Action) {
        let body = vec![0xABu8; RESPONSE_LEN];
        (Some(body), Action::Close)
    }
}

#[test]
fn full_response_arrives_before_close() {
    let addr = common::spawn_loop(CloseWithResponseHandler);

    let mut client = TcpStream::connect(addr).expect("connect");
    client.write_all(b"go").unwrap();

    let mut received = Vec::new();
    client
        .read_to_end(&mut received)
        .expect("read full response before EOF");

    assert_eq!(received.len(), RESPONSE_LEN);
    assert!(received.iter().all(|&b| b == 0xAB));
}
