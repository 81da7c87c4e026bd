//! Handle-indexed table of dynamically reserved buffers.
//!
//! The table has [`MAX_ALLOCATION_COUNT`] slots. A slot is free iff its buffer
//! is null, and a handle is simply a slot index. The value
//! [`MAX_ALLOCATION_COUNT`] itself is the sentinel for "no handle".

use crate::virtual_machine::buffer::Buffer;
use crate::virtual_machine::errors::ErrorCode;
use crate::virtual_machine::limits::MAX_ALLOCATION_COUNT;
use crate::virtual_machine::memory;

/// Sentinel handle meaning "no free slot" / "allocation failed".
pub const NO_HANDLE: u64 = MAX_ALLOCATION_COUNT as u64;

/// Reasons an allocation can fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AllocationError {
    /// Every slot is live.
    TableFull,
    /// A slot was free but the host refused to reserve the memory.
    Rejected,
}

impl AllocationError {
    /// Returns the soft error code written for this failure.
    pub const fn code(self) -> ErrorCode {
        match self {
            AllocationError::TableFull => ErrorCode::AllocationFailureAtMaximum,
            AllocationError::Rejected => ErrorCode::AllocationFailureOsRejectedRequest,
        }
    }
}

/// Deallocation of a handle that does not name a live slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NotAllocated(pub u64);

pub struct AllocationTable {
    slots: [Buffer; MAX_ALLOCATION_COUNT],
}

impl AllocationTable {
    /// Creates a table with every slot free.
    pub fn new() -> Self {
        Self {
            slots: [Buffer::null(); MAX_ALLOCATION_COUNT],
        }
    }

    /// Reserves `size` bytes in the first free slot and returns its handle.
    pub fn allocate(&mut self, size: u64) -> Result<u64, AllocationError> {
        let (handle, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_null())
            .ok_or(AllocationError::TableFull)?;
        let data = memory::reserve(size).ok_or(AllocationError::Rejected)?;
        *slot = Buffer { length: size, data };
        Ok(handle as u64)
    }

    /// Releases the buffer at `handle` and frees its slot.
    pub fn deallocate(&mut self, handle: u64) -> Result<(), NotAllocated> {
        let slot = self
            .slot_mut(handle)
            .filter(|slot| !slot.is_null())
            .ok_or(NotAllocated(handle))?;
        let buffer = std::mem::replace(slot, Buffer::null());
        // SAFETY: live slots only ever hold reservations made by `allocate`,
        // and the slot was reset above so the buffer cannot be released twice.
        unsafe { memory::release(buffer.data, buffer.length) };
        Ok(())
    }

    /// Returns true if `handle` names a live slot.
    pub fn exists(&self, handle: u64) -> bool {
        self.get(handle).is_some()
    }

    /// Returns the live buffer at `handle`.
    pub fn get(&self, handle: u64) -> Option<Buffer> {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.slots.get(index))
            .filter(|slot| !slot.is_null())
            .copied()
    }

    /// Returns the number of live slots.
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_null()).count()
    }

    /// Releases every live slot.
    pub fn clear(&mut self) {
        for handle in 0..MAX_ALLOCATION_COUNT as u64 {
            let _ = self.deallocate(handle);
        }
    }

    fn slot_mut(&mut self, handle: u64) -> Option<&mut Buffer> {
        usize::try_from(handle)
            .ok()
            .and_then(|index| self.slots.get_mut(index))
    }
}

impl Default for AllocationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AllocationTable {
    fn drop(&mut self) {
        self.clear();
    }
}
