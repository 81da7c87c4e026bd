//! Host buffers and the input-buffers blob.
//!
//! A [`Buffer`] is the machine's address/length record. Its layout (length
//! first, then the data address, one 8-byte word each) is the layout of the
//! records inside the input-buffers blob, which programs read directly.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::memory;
use std::mem::size_of;

/// Address and length of a region of host memory.
///
/// A null buffer (`length == 0`, `data == 0`) denotes "absent". Buffers made by
/// [`Buffer::create`] are owned by whoever created them until passed to
/// [`Buffer::destroy`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Buffer {
    /// Length in bytes.
    pub length: u64,
    /// Host address of the first byte, or 0.
    pub data: u64,
}

/// Size of one record in the input-buffers blob.
pub const RECORD_SIZE: usize = size_of::<Buffer>();

const _: () = assert!(RECORD_SIZE == 16);

impl Buffer {
    /// Returns the null buffer.
    pub const fn null() -> Self {
        Self { length: 0, data: 0 }
    }

    /// Returns true if the buffer has no backing memory.
    pub const fn is_null(&self) -> bool {
        self.data == 0
    }

    /// Reserves `length` bytes of zeroed host memory.
    pub fn create(length: u64) -> Result<Self, VMError> {
        memory::reserve(length)
            .map(|data| Self { length, data })
            .ok_or(VMError::HostAllocationFailed { length })
    }

    /// Reserves a buffer holding a copy of `bytes`. Empty input gives the null
    /// buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VMError> {
        if bytes.is_empty() {
            return Ok(Self::null());
        }
        let buffer = Self::create(bytes.len() as u64)?;
        // SAFETY: the buffer was just reserved with exactly `bytes.len()` bytes.
        unsafe { memory::write_bytes(buffer.data, bytes) };
        Ok(buffer)
    }

    /// Releases the backing memory.
    ///
    /// # Safety
    ///
    /// The buffer must come from [`Buffer::create`] (or [`Buffer::from_bytes`])
    /// and must not be used, or destroyed again, afterwards.
    pub unsafe fn destroy(self) {
        if !self.is_null() {
            unsafe { memory::release(self.data, self.length) };
        }
    }

    /// Borrows the buffer's bytes.
    ///
    /// # Safety
    ///
    /// `data..data + length` must be readable host memory for `'a`.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        unsafe { memory::slice(self.data, self.length) }
    }

    /// Reads record `index` of a blob whose bytes are an array of buffers.
    ///
    /// # Safety
    ///
    /// The blob must hold at least `index + 1` records.
    pub unsafe fn record(&self, index: usize) -> Buffer {
        let base = self.data + (index * RECORD_SIZE) as u64;
        unsafe {
            Buffer {
                length: memory::read_word(base, 8),
                data: memory::read_word(base + 8, 8),
            }
        }
    }

    /// Returns the number of whole records the buffer holds.
    pub const fn record_count(&self) -> u64 {
        self.length / RECORD_SIZE as u64
    }

    /// Returns true if `address..address + len` lies inside the buffer.
    pub const fn contains(&self, address: u64, len: u64) -> bool {
        match (address.checked_sub(self.data), address.checked_add(len)) {
            (Some(_), Some(end)) => end <= self.data.saturating_add(self.length),
            _ => false,
        }
    }
}

/// Owner of the sub-buffers handed to the machine and of the record array
/// describing them.
///
/// Sub-buffer 0 is the program image. Dropping the value releases every
/// sub-buffer.
#[derive(Debug, Default)]
pub struct InputBuffers {
    records: Vec<Buffer>,
}

impl InputBuffers {
    /// Creates an empty set of input buffers.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Creates input buffers whose only sub-buffer is `program`.
    pub fn with_program(program: &[u8]) -> Result<Self, VMError> {
        let mut input = Self::new();
        input.push(program)?;
        Ok(input)
    }

    /// Copies `bytes` into a new sub-buffer and appends its record.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Buffer, VMError> {
        let buffer = Buffer::from_bytes(bytes)?;
        self.records.push(buffer);
        Ok(buffer)
    }

    /// Returns the record of sub-buffer `index`.
    pub fn sub_buffer(&self, index: usize) -> Option<Buffer> {
        self.records.get(index).copied()
    }

    /// Returns the number of sub-buffers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no sub-buffer was pushed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the input-buffers blob describing every sub-buffer.
    ///
    /// The blob points into `self` and stays valid until the next `push` or
    /// until `self` is dropped.
    pub fn as_blob(&mut self) -> Buffer {
        Buffer {
            length: (self.records.len() * RECORD_SIZE) as u64,
            data: memory::ptr_to_word(self.records.as_mut_ptr().cast()),
        }
    }
}

impl Drop for InputBuffers {
    fn drop(&mut self) {
        for record in self.records.drain(..) {
            // SAFETY: every record was produced by `Buffer::from_bytes` and is
            // dropped exactly once here.
            unsafe { record.destroy() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_buffer_is_absent() {
        let buffer = Buffer::null();
        assert!(buffer.is_null());
        assert_eq!(buffer.length, 0);
        assert_eq!(Buffer::default(), buffer);
    }

    #[test]
    fn from_bytes_copies_contents() {
        let buffer = Buffer::from_bytes(b"Hello World!\n").unwrap();
        assert_eq!(buffer.length, 13);
        assert_eq!(unsafe { buffer.as_slice() }, b"Hello World!\n");
        unsafe { buffer.destroy() };
    }

    #[test]
    fn blob_records_match_sub_buffers() {
        let mut input = InputBuffers::with_program(&[1, 2, 3]).unwrap();
        input.push(b"data").unwrap();
        let blob = input.as_blob();

        assert_eq!(blob.length, 2 * RECORD_SIZE as u64);
        assert_eq!(blob.record_count(), 2);
        let first = unsafe { blob.record(0) };
        let second = unsafe { blob.record(1) };
        assert_eq!(Some(first), input.sub_buffer(0));
        assert_eq!(unsafe { second.as_slice() }, b"data");
    }

    #[test]
    fn empty_bytes_give_null_records() {
        assert_eq!(Buffer::from_bytes(&[]).unwrap(), Buffer::null());

        let mut input = InputBuffers::with_program(&[0, 0, 13, 13]).unwrap();
        let record = input.push(&[]).unwrap();
        assert_eq!(record, Buffer::null());

        let blob = input.as_blob();
        assert_eq!(blob.record_count(), 2);
        assert_eq!(unsafe { blob.record(1) }, Buffer::null());
        assert!(input.sub_buffer(0).is_some_and(|b| !b.is_null()));
    }

    #[test]
    fn contains_checks_both_ends() {
        let buffer = Buffer {
            length: 16,
            data: 0x1000,
        };
        assert!(buffer.contains(0x1000, 16));
        assert!(buffer.contains(0x100e, 2));
        assert!(!buffer.contains(0x100f, 2));
        assert!(!buffer.contains(0x0fff, 1));
        assert!(!buffer.contains(u64::MAX, 1));
    }
}
