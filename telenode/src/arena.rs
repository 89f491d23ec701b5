//! Fixed block pool for inbound transfer payloads
//!
//! All blocks have the same size, so a pool with at least one block per reassembly session
//! plus one in-flight transfer can never run dry. `Block` handles are not `Clone`; each one
//! must be returned with [`Arena::free`].

/// Allocation counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArenaStats {
    pub allocations: u32,
    pub frees: u32,
    pub in_use: usize,
    pub peak: usize,
    pub failures: u32,
}

/// Handle of an allocated block
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub struct Block {
    index: u8,
    len: usize,
}

impl Block {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shrinks the visible length, e.g. to the number of stored payload bytes.
    pub fn truncate(&mut self, len: usize) {
        self.len = core::cmp::min(self.len, len);
    }
}

pub struct Arena<const COUNT: usize, const SIZE: usize> {
    blocks: [[u8; SIZE]; COUNT],
    used: [bool; COUNT],
    stats: ArenaStats,
}

impl<const COUNT: usize, const SIZE: usize> Default for Arena<COUNT, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const COUNT: usize, const SIZE: usize> Arena<COUNT, SIZE> {
    const _ASSERT: () = core::assert!(COUNT <= u8::MAX as usize + 1);

    pub const fn new() -> Self {
        let _ = Self::_ASSERT;
        Self {
            blocks: [[0; SIZE]; COUNT],
            used: [false; COUNT],
            stats: ArenaStats {
                allocations: 0,
                frees: 0,
                in_use: 0,
                peak: 0,
                failures: 0,
            },
        }
    }

    /// Allocates a block of `len` bytes. Returns `None` if `len` exceeds the block size or the
    /// pool is exhausted.
    pub fn allocate(&mut self, len: usize) -> Option<Block> {
        let slot = self.used.iter().position(|used| !used);
        let Some(index) = slot.filter(|_| len <= SIZE) else {
            self.stats.failures = self.stats.failures.wrapping_add(1);
            return None;
        };

        self.used[index] = true;
        self.blocks[index][..len].fill(0);
        self.stats.allocations = self.stats.allocations.wrapping_add(1);
        self.stats.in_use += 1;
        self.stats.peak = core::cmp::max(self.stats.peak, self.stats.in_use);
        Some(Block {
            index: unwrap!(u8::try_from(index)),
            len,
        })
    }

    pub fn free(&mut self, block: Block) {
        let index = usize::from(block.index);
        assert!(self.used[index], "double free of arena block");
        self.used[index] = false;
        self.stats.frees = self.stats.frees.wrapping_add(1);
        self.stats.in_use -= 1;
    }

    pub fn bytes(&self, block: &Block) -> &[u8] {
        &self.blocks[usize::from(block.index)][..block.len]
    }

    pub fn bytes_mut(&mut self, block: &mut Block) -> &mut [u8] {
        &mut self.blocks[usize::from(block.index)][..block.len]
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }
}
