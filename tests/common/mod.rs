// Not every test binary exercises every helper here.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{mpsc, Once};
use std::thread;

use reactorcore::{EventLoop, Handler, LoopConfig};

static INIT: Once = Once::new();

/// Initializes the test logger exactly once across the whole test binary.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}

/// Spawns `handler` on a background loop thread bound to an ephemeral
/// loopback port, returning the address once the listener is live.
pub fn spawn_loop<H>(handler: H) -> SocketAddr
where
    H: Handler<()> + 'static,
{
    spawn_loop_with_config(handler, LoopConfig::default())
}

pub fn spawn_loop_with_config<H>(handler: H, config: LoopConfig) -> SocketAddr
where
    H: Handler<()> + 'static,
{
    init();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut event_loop: EventLoop<H, ()> =
            EventLoop::new(handler, config).expect("event loop construction");
        event_loop
            .listen_tcp("127.0.0.1:0".parse().unwrap())
            .expect("bind ephemeral listener");
        let addr = event_loop.local_addr().expect("listener bound");
        tx.send(addr).expect("send bound addr");
        event_loop.run().expect("event loop run");
    });
    rx.recv().expect("loop failed to start")
}
