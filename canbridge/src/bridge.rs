use core::cell::Cell;

use embassy_sync::blocking_mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::mutex::Mutex;
use embassy_time::with_timeout;

use crate::arena::{Allocator, ArenaStats, Block};
use crate::config::{Config, DEFAULT_RX_QUEUE_CAPACITY, DEFAULT_TX_QUEUE_CAPACITY};
use crate::core::{DataSpecifier, NodeId, Priority, ServiceId, SubjectId};
use crate::engine::{Acceptance, Engine, EngineError, Identity};
use crate::frame::{CanId, Data, DataLength, Frame, Mtu};
use crate::time::{Duration, Instant};
use crate::transfer::{Transfer, TransferCounter, TransferMeta};
use crate::transmit::Transmitter;
use crate::tx_queue::TxQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Allocator or outbound queue exhausted. Nothing of the transfer stays queued.
    OutOfMemory,
    InvalidArgument,
}

impl From<EngineError> for Error {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::OutOfMemory => Error::OutOfMemory,
            EngineError::InvalidArgument => Error::InvalidArgument,
        }
    }
}

/// The inbound frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayError {
    QueueFull,
    Timeout,
}

/// Received frame on its way to the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueItem {
    pub frame: Frame,
    pub timestamp: Instant,
    /// Index of the redundant interface the frame arrived on
    pub redundant_index: u8,
}

impl QueueItem {
    /// Stamps the frame with the current time.
    pub fn new(frame: Frame, redundant_index: u8) -> Self {
        Self::with_timestamp(frame, Instant::now(), redundant_index)
    }

    pub const fn with_timestamp(frame: Frame, timestamp: Instant, redundant_index: u8) -> Self {
        Self {
            frame,
            timestamp,
            redundant_index,
        }
    }
}

/// Inbound path counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayStats {
    /// Frames taken from the queue and fed to the engine
    pub processed_frames: u32,
    /// Transfers delivered to the handler
    pub completed_transfers: u32,
    pub isr_drops: u32,
    pub relay_timeouts: u32,
    /// Frames lost because reassembly ran out of memory
    pub rx_oom_drops: u32,
}

struct PendingFrame {
    id: CanId,
    length: DataLength,
    block: Block,
}

/// Everything the guard protects
struct Shared<E, A, T, const TXN: usize> {
    engine: E,
    arena: A,
    tx_queue: TxQueue<PendingFrame, TXN>,
    transmitter: T,
    identity: Identity,
}

impl<E: Engine, A: Allocator, T: Transmitter, const TXN: usize> Shared<E, A, T, TXN> {
    /// Serializes a transfer into the outbound queue, all frames or none.
    fn enqueue(&mut self, transfer: &Transfer<'_>) -> Result<(), Error> {
        let Self {
            engine,
            arena,
            tx_queue,
            identity,
            ..
        } = self;
        let priority = transfer.meta.priority;
        let mut emitted = 0usize;

        let result = engine.serialize(
            identity,
            transfer,
            &mut |frame: Frame| -> Result<(), EngineError> {
                let mut block = arena.allocate(frame.data.len())?;
                arena.bytes_mut(&mut block).copy_from_slice(&frame.data);
                let pending = PendingFrame {
                    id: frame.id,
                    length: frame.data.length(),
                    block,
                };
                match tx_queue.push(priority, pending) {
                    Ok(()) => {
                        emitted += 1;
                        Ok(())
                    }
                    Err(pending) => {
                        arena.free(pending.block);
                        Err(EngineError::OutOfMemory)
                    }
                }
            },
        );

        if let Err(err) = result {
            for _ in 0..emitted {
                let pending = unwrap!(tx_queue.pop_back(priority));
                arena.free(pending.block);
            }
            warn!(
                "transfer {:?} dropped after {} frames: {:?}",
                transfer.meta.data_spec, emitted, err
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Hands queued frames to the transmitter until it reports busy.
    ///
    /// A busy frame stays at the queue front and is offered first next time.
    fn drain(&mut self) -> usize {
        let fd = self.identity.mtu.is_fd();
        let mut sent = 0;
        while let Some((_, pending)) = self.tx_queue.peek() {
            let mut data = Data::new_zeros(pending.length);
            data.copy_from_slice(self.arena.bytes(&pending.block));
            let frame = Frame {
                id: pending.id,
                data,
            };
            if self.transmitter.try_transmit(&frame, fd).is_err() {
                trace!("transmitter busy, {} frames pending", self.tx_queue.len());
                break;
            }
            let (_, pending) = unwrap!(self.tx_queue.pop());
            self.arena.free(pending.block);
            sent += 1;
        }
        sent
    }
}

/// Concurrency bridge around one non-reentrant protocol engine
///
/// Type parameters:
/// * `M` selects the mutex flavor for the guard, the relay queue and the counters.
///   Use `CriticalSectionRawMutex` when frames are relayed from interrupt handlers.
/// * `E`, `A`, `T` are the engine, its allocator and the bus send primitive.
/// * `U` is an application value reachable through [`Bridge::user`].
/// * `RXN` is the relay queue capacity, `TXN` the outbound frame queue capacity.
pub struct Bridge<
    M: RawMutex,
    E,
    A,
    T,
    U = (),
    const RXN: usize = DEFAULT_RX_QUEUE_CAPACITY,
    const TXN: usize = DEFAULT_TX_QUEUE_CAPACITY,
> {
    shared: Mutex<M, Shared<E, A, T, TXN>>,
    inbound: Channel<M, QueueItem, RXN>,
    stats: blocking_mutex::Mutex<M, Cell<RelayStats>>,
    user: U,
}

impl<M, E, A, T, U, const RXN: usize, const TXN: usize> Bridge<M, E, A, T, U, RXN, TXN>
where
    M: RawMutex,
    E: Engine,
    A: Allocator,
    T: Transmitter,
{
    pub fn new(config: Config, engine: E, arena: A, transmitter: T, user: U) -> Self {
        Self {
            shared: Mutex::new(Shared {
                engine,
                arena,
                tx_queue: TxQueue::new(),
                transmitter,
                identity: Identity {
                    node_id: config.node_id,
                    mtu: config.mtu,
                },
            }),
            inbound: Channel::new(),
            stats: blocking_mutex::Mutex::new(Cell::new(RelayStats::default())),
            user,
        }
    }

    /// Splits off the single runner. The shared handle serves all other contexts.
    pub fn split(&mut self) -> (&Self, Runner<'_, M, E, A, T, U, RXN, TXN>) {
        let bridge = &*self;
        (
            bridge,
            Runner {
                bridge,
                pending: None,
            },
        )
    }

    pub fn user(&self) -> &U {
        &self.user
    }

    /// Enqueues a received frame without waiting. Safe to call from an interrupt handler.
    ///
    /// A full queue drops the frame and counts it in [`RelayStats::isr_drops`].
    pub fn relay_from_isr(&self, item: QueueItem) -> Result<(), RelayError> {
        match self.inbound.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.update_stats(|stats| stats.isr_drops = stats.isr_drops.wrapping_add(1));
                Err(RelayError::QueueFull)
            }
        }
    }

    /// Enqueues a received frame, waiting up to `timeout` for queue space.
    ///
    /// On timeout the frame is dropped and counted in [`RelayStats::relay_timeouts`].
    /// The timeout needs an embassy-time timer queue: the Embassy executor's integrated one
    /// or a `generic-queue-*` feature.
    pub async fn relay(&self, item: QueueItem, timeout: Duration) -> Result<(), RelayError> {
        match with_timeout(timeout, self.inbound.send(item)).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.update_stats(|stats| {
                    stats.relay_timeouts = stats.relay_timeouts.wrapping_add(1)
                });
                warn!("relay timed out, frame {:?} dropped", item.frame.id);
                Err(RelayError::Timeout)
            }
        }
    }

    /// Returns `false` if an existing subscription on the same port was replaced.
    pub async fn subscribe(
        &self,
        data_spec: DataSpecifier,
        extent: usize,
        transfer_id_timeout: Duration,
    ) -> Result<bool, Error> {
        let mut shared = self.shared.lock().await;
        let Shared { engine, arena, .. } = &mut *shared;
        let created = engine.subscribe(arena, data_spec, extent, transfer_id_timeout)?;
        debug!("subscribed to {:?}, new: {}", data_spec, created);
        Ok(created)
    }

    /// Returns `false` if there was no such subscription.
    pub async fn unsubscribe(&self, data_spec: DataSpecifier) -> Result<bool, Error> {
        let mut shared = self.shared.lock().await;
        let Shared { engine, arena, .. } = &mut *shared;
        Ok(engine.unsubscribe(arena, data_spec)?)
    }

    /// Queues a transfer and drains the outbound queue.
    ///
    /// The transfer id comes from `counter`, which advances even if the transfer is refused.
    /// Messages take no `remote`, requests and responses require one.
    ///
    /// The drain runs on every call. Frames refused by a busy transmitter stay queued
    /// in priority order for the next transmit or [`Bridge::drain`].
    pub async fn transmit(
        &self,
        data_spec: DataSpecifier,
        remote: Option<NodeId>,
        priority: Priority,
        payload: &[u8],
        counter: &TransferCounter,
    ) -> Result<(), Error> {
        let addressed = !matches!(data_spec, DataSpecifier::Message(_));
        if addressed != remote.is_some() {
            return Err(Error::InvalidArgument);
        }

        let mut shared = self.shared.lock().await;
        let transfer = Transfer {
            meta: TransferMeta {
                data_spec,
                priority,
                remote,
                transfer_id: counter.advance(),
                timestamp: Instant::now(),
            },
            payload,
        };
        let result = shared.enqueue(&transfer);
        shared.drain();
        result
    }

    pub async fn transmit_message(
        &self,
        subject: SubjectId,
        priority: Priority,
        payload: &[u8],
        counter: &TransferCounter,
    ) -> Result<(), Error> {
        let data_spec = DataSpecifier::Message(subject);
        self.transmit(data_spec, None, priority, payload, counter)
            .await
    }

    pub async fn transmit_request(
        &self,
        destination: NodeId,
        service: ServiceId,
        priority: Priority,
        payload: &[u8],
        counter: &TransferCounter,
    ) -> Result<(), Error> {
        let data_spec = DataSpecifier::Request(service);
        self.transmit(data_spec, Some(destination), priority, payload, counter)
            .await
    }

    pub async fn transmit_response(
        &self,
        destination: NodeId,
        service: ServiceId,
        priority: Priority,
        payload: &[u8],
        counter: &TransferCounter,
    ) -> Result<(), Error> {
        let data_spec = DataSpecifier::Response(service);
        self.transmit(data_spec, Some(destination), priority, payload, counter)
            .await
    }

    /// Retries queued frames, e.g. from a transmit-complete notification. Returns the sent count.
    pub async fn drain(&self) -> usize {
        self.shared.lock().await.drain()
    }

    pub async fn pending_frames(&self) -> usize {
        self.shared.lock().await.tx_queue.len()
    }

    pub async fn node_id(&self) -> Option<NodeId> {
        self.shared.lock().await.identity.node_id
    }

    pub async fn set_node_id(&self, node_id: Option<NodeId>) {
        self.shared.lock().await.identity.node_id = node_id;
    }

    pub async fn mtu(&self) -> Mtu {
        self.shared.lock().await.identity.mtu
    }

    /// Frames queued before the change keep their original size.
    pub async fn set_mtu(&self, mtu: Mtu) {
        self.shared.lock().await.identity.mtu = mtu;
    }

    pub async fn arena_stats(&self) -> ArenaStats {
        self.shared.lock().await.arena.stats()
    }

    /// Returns `None` while the guard is held elsewhere.
    pub fn try_arena_stats(&self) -> Option<ArenaStats> {
        self.shared.try_lock().ok().map(|shared| shared.arena.stats())
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.lock(|cell| cell.get())
    }

    fn update_stats(&self, f: impl FnOnce(&mut RelayStats)) {
        self.stats.lock(|cell| {
            let mut stats = cell.get();
            f(&mut stats);
            cell.set(stats);
        })
    }
}

/// The single consumer of relayed frames
///
/// The handler runs synchronously with the guard held, once per completed transfer.
/// It must not block and must not await any guarded [`Bridge`] method. Non-guarded calls
/// such as [`Bridge::relay_from_isr`] and [`Bridge::stats`] are fine. The payload slice is
/// released when the handler returns, copy out what must outlive the call.
pub struct Runner<'a, M: RawMutex, E, A, T, U, const RXN: usize, const TXN: usize> {
    bridge: &'a Bridge<M, E, A, T, U, RXN, TXN>,
    /// Frame taken from the queue but not yet fed to the engine
    pending: Option<QueueItem>,
}

impl<'a, M, E, A, T, U, const RXN: usize, const TXN: usize> Runner<'a, M, E, A, T, U, RXN, TXN>
where
    M: RawMutex,
    E: Engine,
    A: Allocator,
    T: Transmitter,
{
    pub async fn run<F: FnMut(&Transfer<'_>)>(&mut self, mut handler: F) -> ! {
        loop {
            self.process_next(&mut handler).await;
        }
    }

    /// Waits for one relayed frame and runs one reassembly step on it.
    ///
    /// Cancel-safe: a frame received before the future is dropped is kept
    /// and processed by the next call.
    pub async fn process_next<F: FnMut(&Transfer<'_>)>(&mut self, handler: &mut F) {
        let item = match self.pending {
            Some(item) => item,
            None => {
                let item = self.bridge.inbound.receive().await;
                self.pending = Some(item);
                item
            }
        };

        let mut shared = self.bridge.shared.lock().await;
        self.pending = None;
        let Shared {
            engine,
            arena,
            identity,
            ..
        } = &mut *shared;

        let outcome = engine.accept_frame(
            arena,
            identity,
            &item.frame,
            item.timestamp,
            item.redundant_index,
        );
        let completed = match outcome {
            Ok(Acceptance::Complete(rx)) => {
                let transfer = Transfer {
                    meta: rx.meta,
                    payload: arena.bytes(&rx.payload),
                };
                handler(&transfer);
                arena.free(rx.payload);
                true
            }
            Ok(Acceptance::Incomplete) => false,
            Ok(Acceptance::Rejected) => {
                trace!("frame {:?} rejected", item.frame.id);
                false
            }
            Err(EngineError::OutOfMemory) => {
                warn!("out of memory, frame {:?} dropped", item.frame.id);
                self.bridge.update_stats(|stats| {
                    stats.rx_oom_drops = stats.rx_oom_drops.wrapping_add(1)
                });
                false
            }
            Err(EngineError::InvalidArgument) => {
                warn!("engine refused frame {:?}", item.frame.id);
                false
            }
        };
        drop(shared);

        self.bridge.update_stats(|stats| {
            stats.processed_frames = stats.processed_frames.wrapping_add(1);
            if completed {
                stats.completed_transfers = stats.completed_transfers.wrapping_add(1);
            }
        });
    }
}
