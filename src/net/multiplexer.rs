//! UDP multiplexer: one socket, many claimants.
//!
//! A single receive task drains the socket and offers each datagram to
//! every registered handler, in registration order, until one claims
//! it. Handlers are called synchronously from the receive loop and must
//! return quickly — anything that needs to suspend (reassembly
//! bookkeeping, a discovery reply round-trip) spawns its own task
//! before returning, so the receive loop is never blocked on handler
//! work. This realizes the single-threaded cooperative-concurrency
//! model: one task owns the socket end to end.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MultiplexerConfig;
use crate::error::{Error, Result};

/// Whether a handler consumed a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    NotClaimed,
}

/// Something that can inspect inbound datagrams and optionally claim
/// them. Implementations must not block or suspend inside `handle` —
/// spawn a task for any work that does.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, datagram: &[u8], from: SocketAddr) -> Claim;
}

/// Opaque handle returned by `add_handler`, used to `remove_handler` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    handler: Arc<dyn PacketHandler>,
}

fn bind_broadcast_socket(port: u16) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(not(target_os = "windows"))]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Owns the listen socket and dispatches inbound datagrams to registered
/// handlers. Cloning is cheap; clones share the same socket and
/// handler registry.
#[derive(Clone)]
pub struct UdpMultiplexer {
    socket: Arc<UdpSocket>,
    handlers: Arc<RwLock<Vec<Registration>>>,
    next_id: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl UdpMultiplexer {
    /// Bind the listen socket. Does not start the receive loop yet.
    pub fn bind(config: &MultiplexerConfig) -> Result<Self> {
        let std_socket = bind_broadcast_socket(config.listen_port).map_err(Error::Bind)?;
        let socket = UdpSocket::from_std(std_socket).map_err(Error::Bind)?;
        Ok(UdpMultiplexer {
            socket: Arc::new(socket),
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
        })
    }

    /// Spawn the single receive task. Returns its join handle; dropping
    /// or awaiting it is optional, `stop()` cancels it cleanly.
    pub fn start(&self) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let handlers = self.handlers.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 65535];
            loop {
                let (len, from) = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok(v) => v,
                        Err(err) => {
                            log::warn!("multiplexer recv_from failed: {err}");
                            continue;
                        }
                    },
                };

                let datagram = &buf[..len];
                let snapshot = handlers.read().await;
                let mut claimed = false;
                for registration in snapshot.iter() {
                    if registration.handler.handle(datagram, from) == Claim::Claimed {
                        claimed = true;
                        break;
                    }
                }
                if !claimed {
                    log::trace!("unclaimed datagram from {from} ({len} bytes)");
                }
            }
        })
    }

    /// Cancel the receive task. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Register a handler. Handlers are offered datagrams in the order
    /// they were registered.
    pub async fn add_handler(&self, handler: Arc<dyn PacketHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().await.push(Registration { id, handler });
        id
    }

    pub async fn remove_handler(&self, id: HandlerId) {
        self.handlers.write().await.retain(|r| r.id != id);
    }

    pub async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket.send_to(buf, addr).await.map_err(Error::Send)?;
        Ok(())
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHandler {
        claim_prefix: u8,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl PacketHandler for RecordingHandler {
        fn handle(&self, datagram: &[u8], _from: SocketAddr) -> Claim {
            if datagram.first() == Some(&self.claim_prefix) {
                self.seen.lock().unwrap().push(datagram.to_vec());
                Claim::Claimed
            } else {
                Claim::NotClaimed
            }
        }
    }

    #[tokio::test]
    async fn dispatches_in_registration_order_until_claimed() {
        let config = MultiplexerConfig {
            listen_port: 0,
            ..Default::default()
        };
        let mux = UdpMultiplexer::bind(&config).unwrap();
        let _task = mux.start();

        let first = Arc::new(RecordingHandler {
            claim_prefix: b'A',
            seen: Mutex::new(Vec::new()),
        });
        let second = Arc::new(RecordingHandler {
            claim_prefix: b'B',
            seen: Mutex::new(Vec::new()),
        });
        mux.add_handler(first.clone()).await;
        mux.add_handler(second.clone()).await;

        let addr = mux.local_addr().unwrap();
        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"Bxyz", addr).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(first.seen.lock().unwrap().is_empty());
        assert_eq!(second.seen.lock().unwrap().len(), 1);

        mux.stop();
    }

    #[tokio::test]
    async fn remove_handler_stops_future_dispatch() {
        let config = MultiplexerConfig {
            listen_port: 0,
            ..Default::default()
        };
        let mux = UdpMultiplexer::bind(&config).unwrap();
        let _task = mux.start();

        let handler = Arc::new(RecordingHandler {
            claim_prefix: b'A',
            seen: Mutex::new(Vec::new()),
        });
        let id = mux.add_handler(handler.clone()).await;
        mux.remove_handler(id).await;

        let addr = mux.local_addr().unwrap();
        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"Axyz", addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(handler.seen.lock().unwrap().is_empty());
        mux.stop();
    }
}
