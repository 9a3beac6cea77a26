#![allow(dead_code)]

use canbridge::arena::{Allocator, Arena, Block};
use canbridge::core::{DataSpecifier, NodeId, Priority, TransferId, TransferKind};
use canbridge::engine::{Acceptance, Engine, EngineError, Identity, RxTransfer};
use canbridge::frame::{CanId, Data, DataLength, Frame};
use canbridge::time::{Duration, Instant};
use canbridge::transfer::{Transfer, TransferMeta};
use canbridge::transmit::{Busy, Transmitter};
use canbridge::{Bridge, Config, Runner};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use std::boxed::Box;
use std::cell::{Cell, RefCell};
use std::vec::Vec;

pub const BLOCK_SIZE: usize = 64;
pub const TX_QUEUE: usize = 16;

pub type TestBridge<const BLOCKS: usize, const RXN: usize> = Bridge<
    CriticalSectionRawMutex,
    MockEngine,
    Arena<BLOCKS, BLOCK_SIZE>,
    BusPort,
    (),
    RXN,
    TX_QUEUE,
>;

pub type TestRunner<const BLOCKS: usize, const RXN: usize> = Runner<
    'static,
    CriticalSectionRawMutex,
    MockEngine,
    Arena<BLOCKS, BLOCK_SIZE>,
    BusPort,
    (),
    RXN,
    TX_QUEUE,
>;

pub fn make_bridge<const BLOCKS: usize, const RXN: usize>(
    bus: &'static Bus,
    config: Config,
) -> &'static mut TestBridge<BLOCKS, RXN> {
    let bridge = Bridge::new(config, MockEngine::default(), Arena::new(), BusPort(bus), ());
    Box::leak(Box::new(bridge))
}

pub async fn run_bridge<const BLOCKS: usize, const RXN: usize>(
    mut runner: TestRunner<BLOCKS, RXN>,
    handler: impl FnMut(&Transfer<'_>),
) {
    runner.run(handler).await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub meta: TransferMeta,
    pub payload: Vec<u8>,
}

/// Handler that copies every delivered transfer into a shared log
pub fn recorder() -> (
    &'static RefCell<Vec<Received>>,
    impl FnMut(&Transfer<'_>) + 'static,
) {
    let log: &'static RefCell<Vec<Received>> = Box::leak(Box::new(RefCell::new(Vec::new())));
    let handler = move |transfer: &Transfer<'_>| {
        log.borrow_mut().push(Received {
            meta: transfer.meta,
            payload: transfer.payload.to_vec(),
        })
    };
    (log, handler)
}

/// Bus mock recording sent frames
///
/// With a budget set, the bus accepts that many frames and then reports busy.
#[derive(Default)]
pub struct Bus {
    sent: RefCell<Vec<Frame>>,
    budget: Cell<Option<usize>>,
    attempts: Cell<usize>,
    last_fd: Cell<Option<bool>>,
}

impl Bus {
    pub fn leak() -> &'static Bus {
        Box::leak(Box::new(Bus::default()))
    }

    pub fn set_budget(&self, budget: Option<usize>) {
        self.budget.set(budget);
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.borrow().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }

    pub fn last_fd(&self) -> Option<bool> {
        self.last_fd.get()
    }
}

pub struct BusPort(pub &'static Bus);

impl Transmitter for BusPort {
    fn try_transmit(&mut self, frame: &Frame, fd: bool) -> Result<(), Busy> {
        let bus = self.0;
        bus.attempts.set(bus.attempts.get() + 1);
        bus.last_fd.set(Some(fd));
        match bus.budget.get() {
            Some(0) => return Err(Busy),
            Some(n) => bus.budget.set(Some(n - 1)),
            None => {}
        }
        bus.sent.borrow_mut().push(*frame);
        Ok(())
    }
}

// Test-only wire layout:
// bits 26..29 priority, 24..26 kind, 8..24 port, 0..8 source (0x80 = anonymous)
// Last data byte is the tail: start-of-transfer, end-of-transfer, 5-bit transfer id.
pub const SOT: u8 = 0x80;
pub const EOT: u8 = 0x40;

pub fn can_id(data_spec: DataSpecifier, priority: Priority, source: Option<NodeId>) -> CanId {
    let kind = match data_spec.kind() {
        TransferKind::Message => 0,
        TransferKind::Request => 1,
        TransferKind::Response => 2,
    };
    let source = source.map_or(0x80, |id| u32::from(id.into_u8()));
    CanId::from_u32_truncating(
        (u32::from(priority.into_u8()) << 26)
            | (kind << 24)
            | (u32::from(data_spec.port()) << 8)
            | source,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub data_spec: DataSpecifier,
    pub priority: Priority,
    pub source: Option<NodeId>,
}

pub fn parse_id(id: CanId) -> Option<Header> {
    let raw = id.into_u32();
    let kind = match (raw >> 24) & 0x3 {
        0 => TransferKind::Message,
        1 => TransferKind::Request,
        2 => TransferKind::Response,
        _ => return None,
    };
    Some(Header {
        data_spec: DataSpecifier::new(kind, ((raw >> 8) & 0xffff) as u16)?,
        priority: Priority::from_u8_truncating((raw >> 26) as u8),
        source: NodeId::new((raw & 0xff) as u8),
    })
}

pub fn tail(frame: &Frame) -> u8 {
    *frame.data.last().unwrap()
}

pub fn single_frame(
    data_spec: DataSpecifier,
    source: Option<NodeId>,
    transfer_id: u8,
    payload: &[u8],
) -> Frame {
    assert!(payload.len() < 8);
    let mut bytes = payload.to_vec();
    bytes.push(SOT | EOT | transfer_id);
    Frame::new(can_id(data_spec, Priority::Nominal, source), &bytes).unwrap()
}

struct Subscription {
    data_spec: DataSpecifier,
    extent: usize,
}

struct Session {
    meta: TransferMeta,
    block: Block,
    filled: usize,
}

/// Minimal protocol engine for exercising the bridge
///
/// Keeps one reassembly session per (port, source) pair, each holding an extent-sized block.
#[derive(Default)]
pub struct MockEngine {
    subscriptions: heapless::Vec<Subscription, 8>,
    sessions: heapless::Vec<Session, 4>,
}

impl MockEngine {
    fn extent(&self, data_spec: DataSpecifier) -> Option<usize> {
        self.subscriptions
            .iter()
            .find(|sub| sub.data_spec == data_spec)
            .map(|sub| sub.extent)
    }

    fn drop_session(
        &mut self,
        alloc: &mut dyn Allocator,
        data_spec: DataSpecifier,
        source: Option<NodeId>,
    ) {
        let index = self
            .sessions
            .iter()
            .position(|s| s.meta.data_spec == data_spec && s.meta.remote == source);
        if let Some(index) = index {
            alloc.free(self.sessions.swap_remove(index).block);
        }
    }
}

impl Engine for MockEngine {
    fn accept_frame(
        &mut self,
        alloc: &mut dyn Allocator,
        _identity: &Identity,
        frame: &Frame,
        timestamp: Instant,
        _redundant_index: u8,
    ) -> Result<Acceptance, EngineError> {
        let Some(header) = parse_id(frame.id) else {
            return Ok(Acceptance::Rejected);
        };
        let Some(extent) = self.extent(header.data_spec) else {
            return Ok(Acceptance::Rejected);
        };
        let Some((&tail, chunk)) = frame.data.split_last() else {
            return Ok(Acceptance::Rejected);
        };
        let meta = TransferMeta {
            data_spec: header.data_spec,
            priority: header.priority,
            remote: header.source,
            transfer_id: TransferId::from_u8_truncating(tail),
            timestamp,
        };

        if tail & SOT != 0 {
            self.drop_session(alloc, header.data_spec, header.source);
            let mut block = alloc.allocate(extent)?;
            let filled = chunk.len().min(extent);
            alloc.bytes_mut(&mut block)[..filled].copy_from_slice(&chunk[..filled]);
            if tail & EOT != 0 {
                block.truncate(filled);
                return Ok(Acceptance::Complete(RxTransfer {
                    meta,
                    payload: block,
                }));
            }
            if let Err(session) = self.sessions.push(Session {
                meta,
                block,
                filled,
            }) {
                alloc.free(session.block);
                return Err(EngineError::OutOfMemory);
            }
            return Ok(Acceptance::Incomplete);
        }

        let Some(index) = self.sessions.iter().position(|s| {
            s.meta.data_spec == meta.data_spec
                && s.meta.remote == meta.remote
                && s.meta.transfer_id == meta.transfer_id
        }) else {
            return Ok(Acceptance::Rejected);
        };
        let session = &mut self.sessions[index];
        let take = chunk.len().min(extent - session.filled);
        let end = session.filled + take;
        alloc.bytes_mut(&mut session.block)[session.filled..end].copy_from_slice(&chunk[..take]);
        session.filled = end;

        if tail & EOT == 0 {
            return Ok(Acceptance::Incomplete);
        }
        let Session {
            meta, mut block, filled,
        } = self.sessions.swap_remove(index);
        block.truncate(filled);
        Ok(Acceptance::Complete(RxTransfer {
            meta,
            payload: block,
        }))
    }

    fn serialize(
        &mut self,
        identity: &Identity,
        transfer: &Transfer<'_>,
        emit: &mut dyn FnMut(Frame) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let chunk_size = identity.mtu.bytes() - 1;
        let id = can_id(
            transfer.meta.data_spec,
            transfer.meta.priority,
            identity.node_id,
        );
        let payload = transfer.payload;
        let count = payload.len().div_ceil(chunk_size).max(1);

        for index in 0..count {
            let start = (index * chunk_size).min(payload.len());
            let end = (start + chunk_size).min(payload.len());
            let chunk = &payload[start..end];

            let mut tail = transfer.meta.transfer_id.into_u8();
            if index == 0 {
                tail |= SOT;
            }
            if index + 1 == count {
                tail |= EOT;
            }
            let length =
                DataLength::new_ceil(chunk.len() + 1).ok_or(EngineError::InvalidArgument)?;
            let mut data = Data::new_zeros(length);
            data[..chunk.len()].copy_from_slice(chunk);
            data[length.as_usize() - 1] = tail;
            emit(Frame { id, data })?;
        }
        Ok(())
    }

    fn subscribe(
        &mut self,
        _alloc: &mut dyn Allocator,
        data_spec: DataSpecifier,
        extent: usize,
        _transfer_id_timeout: Duration,
    ) -> Result<bool, EngineError> {
        if let Some(sub) = self
            .subscriptions
            .iter_mut()
            .find(|sub| sub.data_spec == data_spec)
        {
            sub.extent = extent;
            return Ok(false);
        }
        self.subscriptions
            .push(Subscription { data_spec, extent })
            .map_err(|_| EngineError::OutOfMemory)?;
        Ok(true)
    }

    fn unsubscribe(
        &mut self,
        alloc: &mut dyn Allocator,
        data_spec: DataSpecifier,
    ) -> Result<bool, EngineError> {
        let Some(index) = self
            .subscriptions
            .iter()
            .position(|sub| sub.data_spec == data_spec)
        else {
            return Ok(false);
        };
        self.subscriptions.swap_remove(index);
        while let Some(index) = self
            .sessions
            .iter()
            .position(|s| s.meta.data_spec == data_spec)
        {
            alloc.free(self.sessions.swap_remove(index).block);
        }
        Ok(true)
    }
}
