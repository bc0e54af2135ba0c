//! Ledger event buses.

use neo3_core::{Block, Transaction, UInt256};
use neo3_smart_contract::AppExecResult;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Why a transaction left the mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Evicted to make room for a better-paying transaction.
    LowPriority,
    /// Included in a persisted block.
    IncludedInBlock,
    /// `valid_until_block` passed the chain height.
    Expired,
    /// A conflicting transaction was accepted or persisted.
    Conflict,
    /// Re-verification against a new snapshot failed.
    NoLongerValid,
}

/// Events published to external subscribers (RPC, metrics, tests).
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    TransactionAdded(Arc<Transaction>),
    TransactionRemoved {
        hash: UInt256,
        reason: RemovalReason,
    },
    /// Fired before the commit batch is written.
    BlockCommitting {
        block: Arc<Block>,
        execution_results: Arc<Vec<AppExecResult>>,
    },
    /// Fired after the commit batch is durable.
    BlockCommitted(Arc<Block>),
}

/// A broadcast bus for [`LedgerEvent`]s; owned by the node context, never
/// a process global.
#[derive(Clone)]
pub struct LedgerEventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl Default for LedgerEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl LedgerEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event; having no subscribers is not an error.
    pub fn publish(&self, event: LedgerEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = LedgerEventBus::default();
        let mut receiver = bus.subscribe();
        bus.publish(LedgerEvent::TransactionRemoved {
            hash: UInt256::zero(),
            reason: RemovalReason::Expired,
        });
        match receiver.try_recv().unwrap() {
            LedgerEvent::TransactionRemoved { reason, .. } => {
                assert_eq!(reason, RemovalReason::Expired);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = LedgerEventBus::default();
        bus.publish(LedgerEvent::TransactionRemoved {
            hash: UInt256::zero(),
            reason: RemovalReason::Conflict,
        });
    }
}
