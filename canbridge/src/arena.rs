//! Bounded memory for reassembly buffers and pending frames
//!
//! The engine and the outbound queue draw all their storage from one [`Allocator`],
//! so its capacity is a hard ceiling for in-flight reassemblies and queued frames combined.
//! Exhaustion is reported to the caller and never retried.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AllocError;

/// Ownership token of an allocated region
///
/// The token is neither `Clone` nor `Copy`. Moving it is the only way to pass
/// the region on, and [`Allocator::free`] consumes it.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub struct Block {
    index: u16,
    len: u16,
}

impl Block {
    /// Reserved for [`Allocator`] implementations, `index` identifies the region within
    /// the allocator. Engines obtain blocks only from [`Allocator::allocate`]: a token
    /// built here for a live region aliases it, and [`Arena`] panics on one for a free region.
    pub const fn new(index: u16, len: u16) -> Self {
        Self { index, len }
    }

    pub const fn index(&self) -> u16 {
        self.index
    }

    /// Requested size in bytes
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shortens the visible region, e.g. after reassembly filled less than the extent.
    /// Has no effect if `len` is not shorter.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            // len < self.len <= u16::MAX
            self.len = len as u16;
        }
    }
}

/// Allocation diagnostics, counted in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArenaStats {
    pub capacity: usize,
    pub in_use: usize,
    pub peak: usize,
    pub allocations: u32,
    pub frees: u32,
    pub oom_count: u32,
}

/// Constant-time allocator interface
///
/// Called only with the bridge guard held, never from interrupt context.
pub trait Allocator {
    fn allocate(&mut self, size: usize) -> Result<Block, AllocError>;
    fn free(&mut self, block: Block);
    fn bytes(&self, block: &Block) -> &[u8];
    fn bytes_mut(&mut self, block: &mut Block) -> &mut [u8];
    fn stats(&self) -> ArenaStats;
}

/// Fixed-block pool of `BLOCKS` regions, `BLOCK_SIZE` bytes each
///
/// Both operations are O(1): free regions sit on a stack of indices.
pub struct Arena<const BLOCKS: usize, const BLOCK_SIZE: usize> {
    storage: [[u8; BLOCK_SIZE]; BLOCKS],
    in_use: [bool; BLOCKS],
    free: heapless::Vec<u16, BLOCKS>,
    stats: ArenaStats,
}

impl<const BLOCKS: usize, const BLOCK_SIZE: usize> Arena<BLOCKS, BLOCK_SIZE> {
    const _ASSERT_BLOCKS: usize = u16::MAX as usize + 1 - BLOCKS;
    const _ASSERT_BLOCK_SIZE: usize = u16::MAX as usize - BLOCK_SIZE;

    pub fn new() -> Self {
        let _ = (Self::_ASSERT_BLOCKS, Self::_ASSERT_BLOCK_SIZE);

        let mut free = heapless::Vec::new();
        for i in (0..BLOCKS).rev() {
            unwrap!(free.push(unwrap!(u16::try_from(i))));
        }
        Self {
            storage: [[0; BLOCK_SIZE]; BLOCKS],
            in_use: [false; BLOCKS],
            free,
            stats: ArenaStats {
                capacity: BLOCKS,
                ..Default::default()
            },
        }
    }

    fn count_oom(&mut self, size: usize) -> AllocError {
        self.stats.oom_count = self.stats.oom_count.wrapping_add(1);
        debug!(
            "arena: cannot allocate {} bytes, {} of {} blocks in use",
            size, self.stats.in_use, BLOCKS
        );
        AllocError
    }
}

impl<const BLOCKS: usize, const BLOCK_SIZE: usize> Default for Arena<BLOCKS, BLOCK_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BLOCKS: usize, const BLOCK_SIZE: usize> Allocator for Arena<BLOCKS, BLOCK_SIZE> {
    fn allocate(&mut self, size: usize) -> Result<Block, AllocError> {
        if size > BLOCK_SIZE {
            return Err(self.count_oom(size));
        }
        let Some(index) = self.free.pop() else {
            return Err(self.count_oom(size));
        };
        self.in_use[usize::from(index)] = true;

        let stats = &mut self.stats;
        stats.in_use += 1;
        stats.peak = stats.peak.max(stats.in_use);
        stats.allocations = stats.allocations.wrapping_add(1);
        // size <= BLOCK_SIZE <= u16::MAX
        Ok(Block::new(index, size as u16))
    }

    fn free(&mut self, block: Block) {
        let index = usize::from(block.index);
        assert!(index < BLOCKS && self.in_use[index]);
        self.in_use[index] = false;
        unwrap!(self.free.push(block.index));

        self.stats.in_use -= 1;
        self.stats.frees = self.stats.frees.wrapping_add(1);
    }

    fn bytes(&self, block: &Block) -> &[u8] {
        &self.storage[usize::from(block.index)][..block.len()]
    }

    fn bytes_mut(&mut self, block: &mut Block) -> &mut [u8] {
        &mut self.storage[usize::from(block.index)][..block.len()]
    }

    fn stats(&self) -> ArenaStats {
        self.stats
    }
}
