//! Deterministic index splitters.
//!
//! A splitter partitions the global index range `[0, global)` over the ranks
//! of a process group as a pure function of `(global, size, rank)`: every
//! rank computes the same partition without communication, which is what
//! makes the count/offset tables of the collective exchanges agree across
//! the group by construction.
//!
//! Two schemes: [`BlockSplit`] assigns balanced contiguous ranges (lower
//! ranks at most one element larger), [`CyclicSplit`] deals fixed-size
//! blocks round-robin, the standard distribution for scalable dense linear
//! algebra.

/// Balanced contiguous partition of `[0, global)` over `size` ranks.
///
/// Rank `r` owns `global / size` elements, plus one if `r < global % size`;
/// the union of all local ranges, in rank order, covers `[0, global)`
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSplit {
    global: usize,
    size: usize,
    rank: usize,
}

impl BlockSplit {
    pub fn new(global: usize, size: usize, rank: usize) -> Self {
        assert!(size > 0, "empty process group");
        assert!(rank < size, "rank {rank} out of range for group of {size}");
        Self { global, size, rank }
    }

    pub fn global_size(&self) -> usize {
        self.global
    }

    /// Number of elements owned by this rank.
    pub fn local_size(&self) -> usize {
        self.local_size_of(self.rank)
    }

    /// Number of elements owned by an arbitrary rank.
    pub fn local_size_of(&self, rank: usize) -> usize {
        debug_assert!(rank < self.size);
        self.global / self.size + usize::from(rank < self.global % self.size)
    }

    /// Global index of this rank's first element.
    pub fn global_offset(&self) -> usize {
        self.global_offset_of(self.rank)
    }

    /// Global index of an arbitrary rank's first element.
    pub fn global_offset_of(&self, rank: usize) -> usize {
        debug_assert!(rank < self.size);
        rank * (self.global / self.size) + rank.min(self.global % self.size)
    }

    /// Map a global index to `(owning rank, local index)`.
    pub fn location(&self, global: usize) -> (usize, usize) {
        debug_assert!(global < self.global);
        let chunk = self.global / self.size;
        let rem = self.global % self.size;
        // The first `rem` ranks hold `chunk + 1` elements each.
        let split = rem * (chunk + 1);
        if global < split {
            (global / (chunk + 1), global % (chunk + 1))
        } else {
            let g = global - split;
            (rem + g / chunk, g % chunk)
        }
    }

    /// Inverse of [`location`](Self::location).
    pub fn global_index(&self, rank: usize, local: usize) -> usize {
        debug_assert!(local < self.local_size_of(rank));
        self.global_offset_of(rank) + local
    }
}

/// Block-cyclic partition of `[0, global)` over `size` ranks.
///
/// Indices are grouped into blocks of `block` consecutive elements; block
/// `b` is owned by rank `b % size`. Matches the standard ownership rule
/// `rank = (i / block) mod size` used by 2D block-cyclic matrix layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicSplit {
    global: usize,
    size: usize,
    rank: usize,
    block: usize,
}

impl CyclicSplit {
    pub fn new(global: usize, size: usize, rank: usize, block: usize) -> Self {
        assert!(size > 0, "empty process group");
        assert!(rank < size, "rank {rank} out of range for group of {size}");
        assert!(block > 0, "cyclic block size must be positive");
        Self {
            global,
            size,
            rank,
            block,
        }
    }

    pub fn global_size(&self) -> usize {
        self.global
    }

    pub fn block_size(&self) -> usize {
        self.block
    }

    /// Number of elements owned by this rank.
    pub fn local_size(&self) -> usize {
        self.local_size_of(self.rank)
    }

    /// Number of elements owned by an arbitrary rank.
    pub fn local_size_of(&self, rank: usize) -> usize {
        debug_assert!(rank < self.size);
        let full_blocks = self.global / self.block;
        let tail = self.global % self.block;
        let mut n = (full_blocks / self.size) * self.block;
        let leftover = full_blocks % self.size;
        if rank < leftover {
            n += self.block;
        } else if rank == leftover {
            n += tail;
        }
        n
    }

    /// Map a global index to `(owning rank, local index)`.
    pub fn location(&self, global: usize) -> (usize, usize) {
        debug_assert!(global < self.global);
        let b = global / self.block;
        let rank = b % self.size;
        let local = (b / self.size) * self.block + global % self.block;
        (rank, local)
    }

    /// Inverse of [`location`](Self::location).
    pub fn global_index(&self, rank: usize, local: usize) -> usize {
        debug_assert!(local < self.local_size_of(rank));
        let local_block = local / self.block;
        let global_block = local_block * self.size + rank;
        global_block * self.block + local % self.block
    }
}
