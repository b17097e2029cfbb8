//! Governance events: the persisted log and in-process subscribers.

use crate::proposal::ProposalStatus;
use dgov_types::{Address, ProposalId, Timestamp, TokenAmount};
use serde::{Deserialize, Serialize};

/// State transitions observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceEvent {
    Delegate {
        delegator: Address,
        delegatee: Address,
        amount: TokenAmount,
        timestamp: Timestamp,
    },
    Undelegate {
        delegator: Address,
        delegatee: Address,
        amount: TokenAmount,
        timestamp: Timestamp,
    },
    Propose {
        id: ProposalId,
        proposer: Address,
        amount: TokenAmount,
        recipient: Address,
    },
    UpVote {
        id: ProposalId,
        voter: Address,
    },
    DownVote {
        id: ProposalId,
        voter: Address,
    },
    Finalize {
        id: ProposalId,
        recipient: Address,
        status: ProposalStatus,
    },
}

impl GovernanceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GovernanceEvent::Delegate { .. } => "Delegate",
            GovernanceEvent::Undelegate { .. } => "Undelegate",
            GovernanceEvent::Propose { .. } => "Propose",
            GovernanceEvent::UpVote { .. } => "UpVote",
            GovernanceEvent::DownVote { .. } => "DownVote",
            GovernanceEvent::Finalize { .. } => "Finalize",
        }
    }
}

/// An event with its position in the append-only log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub seq: u64,
    pub event: GovernanceEvent,
}

/// Synchronous fan-out event bus.
///
/// Listeners are invoked inline on the committing thread, after the operation
/// is durable; keep handlers fast.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&RecordedEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&RecordedEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &RecordedEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    fn up_vote(seq: u64) -> RecordedEvent {
        RecordedEvent {
            seq,
            event: GovernanceEvent::UpVote {
                id: ProposalId::new(1),
                voter: Address::new([3; 20]),
            },
        }
    }

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&up_vote(1));
        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn emit_with_no_listeners_is_noop() {
        EventBus::new().emit(&up_vote(1));
    }

    #[test]
    fn listener_sees_sequence_and_variant() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let s = Arc::clone(&seen);
        bus.subscribe(Box::new(move |recorded| {
            s.lock().unwrap().push((recorded.seq, recorded.event.name()));
        }));

        bus.emit(&up_vote(4));
        bus.emit(&RecordedEvent {
            seq: 5,
            event: GovernanceEvent::Finalize {
                id: ProposalId::new(1),
                recipient: Address::new([7; 20]),
                status: ProposalStatus::Passed,
            },
        });
        assert_eq!(*seen.lock().unwrap(), vec![(4, "UpVote"), (5, "Finalize")]);
    }

    #[test]
    fn events_survive_bincode() {
        let event = GovernanceEvent::Delegate {
            delegator: Address::new([1; 20]),
            delegatee: Address::new([2; 20]),
            amount: TokenAmount::new(100_000),
            timestamp: Timestamp::new(42),
        };
        let bytes = bincode::serialize(&event).unwrap();
        assert_eq!(bincode::deserialize::<GovernanceEvent>(&bytes).unwrap(), event);
    }
}
