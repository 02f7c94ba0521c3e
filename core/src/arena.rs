//! Shared memory arena.
//!
//! Variable-length data (debug labels, dynamic offset arrays, bundle lists,
//! push-constant payloads) crosses the numeric call boundary as a
//! `(pointer, length)` pair into one process-wide byte arena. Pointers are
//! plain offsets into that arena, never host addresses.
//!
//! Layout decisions belong to an [`ArenaAllocator`]. The arena itself only
//! forwards requests to it and performs bounds-checked reads and writes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::profile_scope;

/// Offset into a [`SharedArena`]. `0` is the null pointer.
pub type ArenaPtr = u32;

/// Bytes at the start of the arena that are never handed out, so that a
/// valid allocation never has pointer `0`.
const RESERVED_PREFIX: u32 = 16;

/// Errors from arena allocation and access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    /// The allocator could not satisfy the request.
    #[error("arena out of memory: requested {size} bytes (align {align})")]
    OutOfMemory { size: u32, align: u32 },
    /// The alignment is zero or not a power of two.
    #[error("invalid arena alignment {0}")]
    InvalidAlignment(u32),
    /// The range `[ptr, ptr + len)` is outside the arena.
    #[error("arena access out of bounds: ptr=0x{ptr:x}, len=0x{len:x}")]
    OutOfBounds { ptr: ArenaPtr, len: u64 },
    /// A typed read started at a pointer not aligned for the element type.
    #[error("arena pointer 0x{ptr:x} is not aligned to {align}")]
    Misaligned { ptr: ArenaPtr, align: u32 },
    /// A string read found bytes that are not UTF-8.
    #[error("arena bytes at 0x{ptr:x} are not valid UTF-8")]
    InvalidUtf8 { ptr: ArenaPtr },
}

/// Allocation policy for a [`SharedArena`].
///
/// The allocator only hands out offsets; it never touches arena bytes.
/// Implementations must be callable from any worker thread.
pub trait ArenaAllocator: Send + Sync {
    /// Reserves `size` bytes aligned to `align`.
    fn allocate(&self, size: u32, align: u32) -> Option<ArenaPtr>;

    /// Resizes the block at `ptr`. May return a different pointer; the old
    /// block stays reserved until this call returns.
    fn reallocate(
        &self,
        ptr: ArenaPtr,
        old_size: u32,
        old_align: u32,
        new_size: u32,
    ) -> Option<ArenaPtr>;

    /// Returns a block obtained from `allocate`/`reallocate`.
    ///
    /// Returns `false` and leaves the allocator untouched if the block was
    /// not handed out by this allocator or is already free.
    fn release(&self, ptr: ArenaPtr, size: u32, align: u32) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeBlock {
    start: u32,
    end: u32,
}

/// First-fit free-list allocator over `[RESERVED_PREFIX, capacity)`.
///
/// Free blocks are kept sorted by start offset and coalesced on release.
pub struct FreeListAllocator {
    capacity: u32,
    free: Mutex<Vec<FreeBlock>>,
}

impl FreeListAllocator {
    /// Creates an allocator managing an arena of `capacity` bytes.
    pub fn new(capacity: u32) -> Self {
        let free = if capacity > RESERVED_PREFIX {
            vec![FreeBlock {
                start: RESERVED_PREFIX,
                end: capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            free: Mutex::new(free),
        }
    }

    /// Total bytes currently free (including alignment slack).
    pub fn free_bytes(&self) -> u32 {
        self.free.lock().iter().map(|b| b.end - b.start).sum()
    }

    fn insert_free(free: &mut Vec<FreeBlock>, block: FreeBlock) {
        if block.start >= block.end {
            return;
        }
        let pos = free.partition_point(|b| b.start < block.start);
        free.insert(pos, block);

        // Merge with the successor, then with the predecessor.
        if pos + 1 < free.len() && free[pos].end >= free[pos + 1].start {
            free[pos].end = free[pos].end.max(free[pos + 1].end);
            free.remove(pos + 1);
        }
        if pos > 0 && free[pos - 1].end >= free[pos].start {
            free[pos - 1].end = free[pos - 1].end.max(free[pos].end);
            free.remove(pos);
        }
    }

    /// End of `[ptr, ptr + size)` if that range lies inside the managed region
    /// and overlaps no free block.
    fn owned_end(&self, free: &[FreeBlock], ptr: ArenaPtr, size: u32) -> Option<u32> {
        let end = ptr.checked_add(size)?;
        if ptr < RESERVED_PREFIX || end > self.capacity {
            return None;
        }
        // Free blocks are sorted and disjoint, so only the last one starting
        // before `end` can overlap.
        let pos = free.partition_point(|b| b.start < end);
        if pos > 0 && free[pos - 1].end > ptr {
            return None;
        }
        Some(end)
    }

    fn allocate_locked(free: &mut Vec<FreeBlock>, size: u32, align: u32) -> Option<ArenaPtr> {
        for i in 0..free.len() {
            let block = free[i];
            let aligned = align_up(block.start, align)?;
            let end = aligned.checked_add(size)?;
            if end > block.end {
                continue;
            }

            free.remove(i);
            Self::insert_free(
                free,
                FreeBlock {
                    start: block.start,
                    end: aligned,
                },
            );
            Self::insert_free(
                free,
                FreeBlock {
                    start: end,
                    end: block.end,
                },
            );
            return Some(aligned);
        }
        None
    }
}

impl ArenaAllocator for FreeListAllocator {
    fn allocate(&self, size: u32, align: u32) -> Option<ArenaPtr> {
        if !align.is_power_of_two() {
            return None;
        }
        let mut free = self.free.lock();
        Self::allocate_locked(&mut free, size.max(1), align)
    }

    fn reallocate(
        &self,
        ptr: ArenaPtr,
        old_size: u32,
        old_align: u32,
        new_size: u32,
    ) -> Option<ArenaPtr> {
        if !old_align.is_power_of_two() {
            return None;
        }
        let old_size = old_size.max(1);
        let new_size = new_size.max(1);
        let mut free = self.free.lock();
        let old_end = self.owned_end(&free, ptr, old_size)?;

        if new_size <= old_size {
            Self::insert_free(
                &mut free,
                FreeBlock {
                    start: ptr + new_size,
                    end: old_end,
                },
            );
            return Some(ptr);
        }

        // Grow in place when the block right after us is free and big enough.
        let new_end = ptr.checked_add(new_size)?;
        if let Some(pos) = free.iter().position(|b| b.start == old_end)
            && free[pos].end >= new_end
        {
            if free[pos].end == new_end {
                free.remove(pos);
            } else {
                free[pos].start = new_end;
            }
            return Some(ptr);
        }

        let moved = Self::allocate_locked(&mut free, new_size, old_align)?;
        Self::insert_free(
            &mut free,
            FreeBlock {
                start: ptr,
                end: old_end,
            },
        );
        Some(moved)
    }

    fn release(&self, ptr: ArenaPtr, size: u32, _align: u32) -> bool {
        let size = size.max(1);
        let mut free = self.free.lock();
        let Some(end) = self.owned_end(&free, ptr, size) else {
            log::warn!("FreeListAllocator: ignoring release of foreign block 0x{ptr:x}+{size}");
            return false;
        };
        Self::insert_free(&mut free, FreeBlock { start: ptr, end });
        true
    }
}

impl fmt::Debug for FreeListAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeListAllocator")
            .field("capacity", &self.capacity)
            .field("free_blocks", &self.free.lock().len())
            .finish()
    }
}

/// The process-wide byte arena shared by all worker contexts.
///
/// # Thread Safety
///
/// `SharedArena` is `Send + Sync`. Reads take a shared lock on the bytes,
/// writes and moving reallocations take the exclusive lock.
pub struct SharedArena {
    memory: RwLock<Vec<u8>>,
    allocator: Box<dyn ArenaAllocator>,
    live_bytes: AtomicU64,
}

impl SharedArena {
    /// Creates an arena of `capacity` bytes with a [`FreeListAllocator`].
    pub fn new(capacity: u32) -> Self {
        Self::with_allocator(capacity, Box::new(FreeListAllocator::new(capacity)))
    }

    /// Creates an arena of `capacity` bytes managed by `allocator`.
    pub fn with_allocator(capacity: u32, allocator: Box<dyn ArenaAllocator>) -> Self {
        log::debug!("SharedArena: reserving {} bytes", capacity);
        Self {
            memory: RwLock::new(vec![0u8; capacity as usize]),
            allocator,
            live_bytes: AtomicU64::new(0),
        }
    }

    /// Arena size in bytes.
    pub fn capacity(&self) -> u32 {
        self.memory.read().len() as u32
    }

    /// Bytes currently handed out.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Reserves `size` bytes aligned to `align`.
    pub fn allocate(&self, size: u32, align: u32) -> Result<ArenaPtr, ArenaError> {
        profile_scope!("arena_allocate");
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }
        let ptr = self
            .allocator
            .allocate(size, align)
            .ok_or(ArenaError::OutOfMemory { size, align })?;
        self.live_bytes.fetch_add(u64::from(size), Ordering::Relaxed);
        Ok(ptr)
    }

    /// Reserves space for `bytes` and copies them in.
    pub fn allocate_bytes(&self, bytes: &[u8], align: u32) -> Result<ArenaPtr, ArenaError> {
        let size = u32::try_from(bytes.len()).map_err(|_| ArenaError::OutOfMemory {
            size: u32::MAX,
            align,
        })?;
        let ptr = self.allocate(size, align)?;
        if let Err(err) = self.write(ptr, bytes) {
            self.release(ptr, size, align)?;
            return Err(err);
        }
        Ok(ptr)
    }

    /// Resizes a block, preserving the first `min(old_size, new_size)` bytes.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if `[ptr, ptr + old_size)` is not inside the arena,
    /// `InvalidAlignment` for a bad `old_align`, and `OutOfMemory` if the
    /// allocator refuses the block or has no room. The old block is intact
    /// after any error.
    pub fn reallocate(
        &self,
        ptr: ArenaPtr,
        old_size: u32,
        old_align: u32,
        new_size: u32,
    ) -> Result<ArenaPtr, ArenaError> {
        if !old_align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(old_align));
        }
        // Holding the byte lock keeps the old contents intact until copied,
        // even if another worker is handed the released block meanwhile.
        let mut memory = self.memory.write();
        let src = block_range(memory.len(), ptr, old_size)?;
        let moved = self
            .allocator
            .reallocate(ptr, old_size, old_align, new_size)
            .ok_or(ArenaError::OutOfMemory {
                size: new_size,
                align: old_align,
            })?;

        if moved != ptr {
            let keep = old_size.min(new_size);
            let dst = checked_range(memory.len(), moved, u64::from(keep))?;
            memory.copy_within(src.start..src.start + keep as usize, dst.start);
        }

        self.sub_live(old_size);
        self.live_bytes.fetch_add(u64::from(new_size), Ordering::Relaxed);
        Ok(moved)
    }

    /// Returns a block to the allocator.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if the block is outside the arena or the allocator does
    /// not recognise it as live, e.g. on a double release.
    pub fn release(&self, ptr: ArenaPtr, size: u32, align: u32) -> Result<(), ArenaError> {
        profile_scope!("arena_release");
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }
        block_range(self.memory.read().len(), ptr, size)?;
        if !self.allocator.release(ptr, size, align) {
            return Err(ArenaError::OutOfBounds {
                ptr,
                len: u64::from(size),
            });
        }
        self.sub_live(size);
        Ok(())
    }

    fn sub_live(&self, size: u32) {
        let _ = self
            .live_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                Some(live.saturating_sub(u64::from(size)))
            });
    }

    /// Copies `src` into the arena at `ptr`.
    pub fn write(&self, ptr: ArenaPtr, src: &[u8]) -> Result<(), ArenaError> {
        let mut memory = self.memory.write();
        let range = checked_range(memory.len(), ptr, src.len() as u64)?;
        memory[range].copy_from_slice(src);
        Ok(())
    }

    /// Copies `dst.len()` bytes starting at `ptr` into `dst`.
    pub fn read_into(&self, ptr: ArenaPtr, dst: &mut [u8]) -> Result<(), ArenaError> {
        if dst.is_empty() {
            return Ok(());
        }
        let memory = self.memory.read();
        let range = checked_range(memory.len(), ptr, dst.len() as u64)?;
        dst.copy_from_slice(&memory[range]);
        Ok(())
    }

    /// Reads `len` bytes starting at `ptr`.
    pub fn read(&self, ptr: ArenaPtr, len: u32) -> Result<Vec<u8>, ArenaError> {
        let mut out = vec![0u8; len as usize];
        self.read_into(ptr, &mut out)?;
        Ok(out)
    }

    /// Reads a UTF-8 string of `len` bytes starting at `ptr`.
    pub fn read_str(&self, ptr: ArenaPtr, len: u32) -> Result<String, ArenaError> {
        let bytes = self.read(ptr, len)?;
        String::from_utf8(bytes).map_err(|_| ArenaError::InvalidUtf8 { ptr })
    }

    /// Reads `count` little-endian `u32`s starting at `ptr`.
    pub fn read_u32_slice(&self, ptr: ArenaPtr, count: u32) -> Result<Vec<u32>, ArenaError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if ptr % 4 != 0 {
            return Err(ArenaError::Misaligned { ptr, align: 4 });
        }
        let len = count.checked_mul(4).ok_or(ArenaError::OutOfBounds {
            ptr,
            len: u64::from(count) * 4,
        })?;
        let bytes = self.read(ptr, len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Reads `count` little-endian `u64`s starting at `ptr`.
    pub fn read_u64_slice(&self, ptr: ArenaPtr, count: u32) -> Result<Vec<u64>, ArenaError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if ptr % 8 != 0 {
            return Err(ArenaError::Misaligned { ptr, align: 8 });
        }
        let len = count.checked_mul(8).ok_or(ArenaError::OutOfBounds {
            ptr,
            len: u64::from(count) * 8,
        })?;
        let bytes = self.read(ptr, len)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| {
                let mut word = [0u8; 8];
                word.copy_from_slice(c);
                u64::from_le_bytes(word)
            })
            .collect())
    }
}

impl fmt::Debug for SharedArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArena")
            .field("capacity", &self.capacity())
            .field("live_bytes", &self.live_bytes())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(SharedArena: Send, Sync);

/// Round `value` up to the next multiple of `align` (a power of two).
fn align_up(value: u32, align: u32) -> Option<u32> {
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Byte range of a handed-out block. Pointers inside the reserved prefix are
/// never valid blocks.
fn block_range(
    arena_len: usize,
    ptr: ArenaPtr,
    size: u32,
) -> Result<std::ops::Range<usize>, ArenaError> {
    let len = u64::from(size.max(1));
    if ptr < RESERVED_PREFIX {
        return Err(ArenaError::OutOfBounds { ptr, len });
    }
    checked_range(arena_len, ptr, len)
}

fn checked_range(
    arena_len: usize,
    ptr: ArenaPtr,
    len: u64,
) -> Result<std::ops::Range<usize>, ArenaError> {
    let start = ptr as u64;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= arena_len as u64)
        .ok_or(ArenaError::OutOfBounds { ptr, len })?;
    Ok(start as usize..end as usize)
}
