//! Raw host memory access.
//!
//! Register words double as host addresses. Every place the machine treats a
//! word as a pointer goes through this module, so the unchecked reads and writes
//! a program can request are confined to these few functions. Nothing here
//! validates addresses: the bytecode is trusted with the host address space.

use std::ptr;

/// Reinterprets a register word as a host pointer.
#[inline(always)]
pub(crate) const fn word_to_ptr(word: u64) -> *mut u8 {
    word as usize as *mut u8
}

/// Reinterprets a host pointer as a register word.
#[inline(always)]
pub(crate) fn ptr_to_word(ptr: *const u8) -> u64 {
    ptr as usize as u64
}

/// Copies `out.len()` bytes starting at `address` into `out`.
///
/// # Safety
///
/// `address..address + out.len()` must be readable host memory.
#[inline(always)]
pub(crate) unsafe fn read_bytes(address: u64, out: &mut [u8]) {
    if out.is_empty() {
        return;
    }
    unsafe { ptr::copy_nonoverlapping(word_to_ptr(address), out.as_mut_ptr(), out.len()) }
}

/// Copies `src` to host memory starting at `address`.
///
/// # Safety
///
/// `address..address + src.len()` must be writable host memory.
#[inline(always)]
pub(crate) unsafe fn write_bytes(address: u64, src: &[u8]) {
    if src.is_empty() {
        return;
    }
    unsafe { ptr::copy(src.as_ptr(), word_to_ptr(address), src.len()) }
}

/// Loads `len` (at most 8) bytes at `address` as the low-order bytes of a word.
///
/// # Safety
///
/// Same as [`read_bytes`].
#[inline(always)]
pub(crate) unsafe fn read_word(address: u64, len: usize) -> u64 {
    let mut bytes = [0u8; 8];
    unsafe { read_bytes(address, &mut bytes[..len]) };
    u64::from_le_bytes(bytes)
}

/// Borrows `len` bytes of host memory at `address`.
///
/// # Safety
///
/// The range must be readable for the returned lifetime and not mutated
/// through another path meanwhile.
pub(crate) unsafe fn slice<'a>(address: u64, len: u64) -> &'a [u8] {
    if len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(word_to_ptr(address), len as usize) }
}

/// Reserves `length` bytes of zeroed, private read/write memory.
///
/// Returns the base address, or `None` when the host refuses the mapping.
/// Zero-length requests are always refused.
pub(crate) fn reserve(length: u64) -> Option<u64> {
    let length = usize::try_from(length).ok().filter(|len| *len > 0)?;
    // SAFETY: an anonymous private mapping with no address hint touches no
    // existing memory.
    let address = unsafe {
        libc::mmap(
            ptr::null_mut(),
            length,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if address == libc::MAP_FAILED {
        None
    } else {
        Some(ptr_to_word(address.cast()))
    }
}

/// Releases memory obtained from [`reserve`].
///
/// # Safety
///
/// `address` and `length` must describe a live reservation, which must not be
/// used afterwards.
pub(crate) unsafe fn release(address: u64, length: u64) {
    // SAFETY: upheld by the caller.
    unsafe {
        libc::munmap(word_to_ptr(address).cast(), length as usize);
    }
}
