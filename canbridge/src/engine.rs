//! Protocol engine interface
//!
//! An [`Engine`] implements the Cyphal/CAN transport algorithms: CAN ID layout, tail bytes,
//! multi-frame reassembly and CRC. It is not reentrant. The bridge calls it only with the guard
//! held and lends it the shared [`Allocator`] for reassembly buffers and session state.

use crate::arena::{AllocError, Allocator, Block};
use crate::core::{DataSpecifier, NodeId};
use crate::frame::{Frame, Mtu};
use crate::time::{Duration, Instant};
use crate::transfer::{Transfer, TransferMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    OutOfMemory,
    InvalidArgument,
}

impl From<AllocError> for EngineError {
    fn from(_: AllocError) -> Self {
        EngineError::OutOfMemory
    }
}

/// Local node identity, owned by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identity {
    pub node_id: Option<NodeId>,
    pub mtu: Mtu,
}

/// Reassembled transfer whose payload lives in an allocator block
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxTransfer {
    pub meta: TransferMeta,
    pub payload: Block,
}

/// Outcome of feeding one frame to the engine
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Acceptance {
    /// Frame consumed, the transfer needs more frames.
    Incomplete,
    Complete(RxTransfer),
    /// Not subscribed, not addressed to this node, malformed or duplicate.
    Rejected,
}

pub trait Engine {
    /// Runs one reassembly step.
    ///
    /// A completed transfer hands its payload block over to the caller, who frees it.
    fn accept_frame(
        &mut self,
        alloc: &mut dyn Allocator,
        identity: &Identity,
        frame: &Frame,
        timestamp: Instant,
        redundant_index: u8,
    ) -> Result<Acceptance, EngineError>;

    /// Splits a transfer into frames and passes them to `emit` in transmission order.
    ///
    /// Stops at the first `emit` error and returns it. Frames already emitted are
    /// rolled back by the caller.
    fn serialize(
        &mut self,
        identity: &Identity,
        transfer: &Transfer<'_>,
        emit: &mut dyn FnMut(Frame) -> Result<(), EngineError>,
    ) -> Result<(), EngineError>;

    /// Starts accepting transfers for `data_spec`.
    ///
    /// Returns `false` if an existing subscription was replaced.
    fn subscribe(
        &mut self,
        alloc: &mut dyn Allocator,
        data_spec: DataSpecifier,
        extent: usize,
        transfer_id_timeout: Duration,
    ) -> Result<bool, EngineError>;

    /// Returns `false` if there was no such subscription.
    fn unsubscribe(
        &mut self,
        alloc: &mut dyn Allocator,
        data_spec: DataSpecifier,
    ) -> Result<bool, EngineError>;
}
