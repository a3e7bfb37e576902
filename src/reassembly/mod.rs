//! Reassembles fragmented state datagrams back into whole payloads.

mod group;

pub use group::{ConflictingTotal, FragmentGroup, GroupState};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::net::{Claim, PacketHandler};
use crate::wire::fragment::{Packet as FragmentPacket, Repr as FragmentRepr};

/// A fully reassembled state payload from one peer.
#[derive(Debug, Clone)]
pub struct AssembledPayload {
    pub from: SocketAddr,
    pub bytes: Vec<u8>,
}

/// Reassembles fragment groups and emits completed payloads on an
/// internal channel. Registers as a `PacketHandler` that claims every
/// datagram recognizable as a fragment header.
pub struct PacketReassembler {
    groups: Mutex<HashMap<(SocketAddr, u8), FragmentGroup>>,
    deadline: Duration,
    sender: mpsc::UnboundedSender<AssembledPayload>,
    cancel: CancellationToken,
}

impl PacketReassembler {
    /// Build a reassembler and the receiver its completed payloads are
    /// delivered on.
    pub fn new(deadline: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<AssembledPayload>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let reassembler = Arc::new(PacketReassembler {
            groups: Mutex::new(HashMap::new()),
            deadline,
            sender,
            cancel: CancellationToken::new(),
        });
        (reassembler, receiver)
    }

    /// Spawn the periodic sweep that drops fragment groups past their
    /// reassembly deadline. Safe to call at most once per instance.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.deadline);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => this.sweep_expired(Instant::now()),
                }
            }
        })
    }

    pub fn stop_sweeper(&self) {
        self.cancel.cancel();
    }

    fn sweep_expired(&self, now: Instant) {
        let mut groups = self.groups.lock().unwrap();
        groups.retain(|_, group| group.state(now, self.deadline) != GroupState::Expired);
    }

    fn process(&self, repr: FragmentRepr, from: SocketAddr) {
        let now = Instant::now();
        let key = (from, repr.group_id);
        let mut groups = self.groups.lock().unwrap();

        let conflicted = match groups.get_mut(&key) {
            Some(group) => group.add(&repr).is_err(),
            None => {
                groups.insert(key, FragmentGroup::new(&repr, now));
                false
            }
        };
        if conflicted {
            // A fragment's total_fragments disagreed with the group already
            // in progress for this key. The whole group is invalid; drop it
            // and let the next fragment for this key start a fresh one.
            log::debug!("conflicting total_fragments for group {:?}; discarding", key);
            groups.remove(&key);
            return;
        }

        let group = groups.get_mut(&key).expect("just inserted or updated");
        if group.state(now, self.deadline) == GroupState::Complete && !group.already_emitted() {
            let assembled = group.assemble();
            group.mark_emitted();
            let _ = self.sender.send(AssembledPayload { from, bytes: assembled });
        }
    }
}

impl PacketHandler for PacketReassembler {
    fn handle(&self, datagram: &[u8], from: SocketAddr) -> Claim {
        let packet = match FragmentPacket::new_checked(datagram) {
            Ok(p) => p,
            Err(_) => return Claim::NotClaimed,
        };
        let repr = match FragmentRepr::parse(&packet) {
            Ok(r) => r,
            Err(_) => return Claim::NotClaimed,
        };
        self.process(repr, from);
        Claim::Claimed
    }
}
