//! Transfer descriptors and per-session transfer id counters

use core::sync::atomic::{AtomicU8, Ordering};

use crate::core::{DataSpecifier, NodeId, Priority, TransferId, TransferKind};
use crate::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferMeta {
    pub data_spec: DataSpecifier,
    pub priority: Priority,
    /// Source of a received transfer or destination of a sent one.
    /// `None` for broadcast messages and anonymous sources.
    pub remote: Option<NodeId>,
    pub transfer_id: TransferId,
    /// Reception time of the first frame, or submission time of a sent transfer.
    pub timestamp: Instant,
}

impl TransferMeta {
    pub fn kind(&self) -> TransferKind {
        self.data_spec.kind()
    }

    pub fn port(&self) -> u16 {
        self.data_spec.port()
    }
}

/// Transfer with a borrowed payload
///
/// Received payloads borrow the allocator block, which the runner frees
/// as soon as the handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer<'a> {
    pub meta: TransferMeta,
    pub payload: &'a [u8],
}

/// Transfer id source for one output session
///
/// The bridge reads and advances the counter while holding its guard, so transfers
/// issued through one counter get consecutive ids even when several tasks share it.
/// A response session should start from the id of the request being answered.
#[derive(Debug)]
pub struct TransferCounter(AtomicU8);

impl TransferCounter {
    pub const fn new() -> Self {
        Self::starting_at(TransferId::SESSION_START)
    }

    pub const fn starting_at(id: TransferId) -> Self {
        Self(AtomicU8::new(id.into_u8()))
    }

    /// Id the next transfer will get
    pub fn peek(&self) -> TransferId {
        TransferId::from_u8_truncating(self.0.load(Ordering::Relaxed))
    }

    // Callers hold the bridge guard. Targets without atomic read-modify-write are supported.
    pub(crate) fn advance(&self) -> TransferId {
        let id = self.peek();
        self.0.store(id.next().into_u8(), Ordering::Relaxed);
        id
    }
}

impl Default for TransferCounter {
    fn default() -> Self {
        Self::new()
    }
}
