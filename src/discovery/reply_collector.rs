//! A short-lived `PacketHandler` that claims discovery reply datagrams
//! for the duration of one discovery window.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::net::{Claim, PacketHandler};
use crate::wire::discovery::{parse_reply, DiscoveryReply};

pub struct ReplyCollector {
    sender: mpsc::UnboundedSender<(SocketAddr, DiscoveryReply)>,
}

impl ReplyCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SocketAddr, DiscoveryReply)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ReplyCollector { sender }, receiver)
    }
}

impl PacketHandler for ReplyCollector {
    fn handle(&self, datagram: &[u8], from: SocketAddr) -> Claim {
        match parse_reply(datagram) {
            Some(reply) => {
                let _ = self.sender.send((from, reply));
                Claim::Claimed
            }
            None => Claim::NotClaimed,
        }
    }
}
