//! Single fragment group state machine.

use std::time::{Duration, Instant};

use crate::wire::fragment::Repr as FragmentRepr;

/// Lifecycle of one fragment group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No fragments received yet (not actually observable externally;
    /// a group is always created with its first fragment).
    Empty,
    /// Some but not all fragments received, and not yet past its
    /// reassembly deadline.
    Partial,
    /// Every fragment for `total_fragments` has arrived.
    Complete,
    /// Past its reassembly deadline without completing.
    Expired,
}

/// Accumulates fragments sharing one `group_id` from one peer.
#[derive(Debug)]
pub struct FragmentGroup {
    total_fragments: u8,
    received: Vec<Option<Vec<u8>>>,
    received_count: usize,
    created_at: Instant,
    emitted: bool,
}

/// A fragment's total_fragments disagreed with the group's established
/// value — the group is invalidated rather than reassembled from a
/// mixed set of fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictingTotal;

impl FragmentGroup {
    pub fn new(fragment: &FragmentRepr, now: Instant) -> Self {
        let mut received = vec![None; fragment.total_fragments as usize];
        received[fragment.fragment_index as usize] = Some(fragment.payload.clone());
        FragmentGroup {
            total_fragments: fragment.total_fragments,
            received_count: 1,
            received,
            created_at: now,
            emitted: false,
        }
    }

    /// Add a fragment to this group. Duplicate fragments (same index,
    /// same or different bytes) are tolerated and overwrite the stored
    /// copy without affecting the received count. A fragment whose
    /// `total_fragments` disagrees with this group's invalidates it.
    pub fn add(&mut self, fragment: &FragmentRepr) -> Result<(), ConflictingTotal> {
        if fragment.total_fragments != self.total_fragments {
            return Err(ConflictingTotal);
        }
        let index = fragment.fragment_index as usize;
        if index >= self.received.len() {
            return Err(ConflictingTotal);
        }
        if self.received[index].is_none() {
            self.received_count += 1;
        }
        self.received[index] = Some(fragment.payload.clone());
        Ok(())
    }

    pub fn state(&self, now: Instant, deadline: Duration) -> GroupState {
        if self.received_count == self.total_fragments as usize {
            GroupState::Complete
        } else if now.duration_since(self.created_at) > deadline {
            GroupState::Expired
        } else {
            GroupState::Partial
        }
    }

    /// Concatenate fragment payloads in index order. Only meaningful
    /// once `state` reports `Complete`.
    pub fn assemble(&self) -> Vec<u8> {
        self.received.iter().flatten().flat_map(|p| p.iter().copied()).collect()
    }

    /// Whether this group's assembled payload has already been handed
    /// to a caller — groups are emitted at most once even if a
    /// duplicate late fragment arrives after completion.
    pub fn already_emitted(&self) -> bool {
        self.emitted
    }

    pub fn mark_emitted(&mut self) {
        self.emitted = true;
    }
}
