//! Host syscall bridge.
//!
//! `SYSCALL` reaches the host only through the [`SyscallHost`] trait, so the
//! interpreter can run against the real kernel ([`LinuxHost`]) or against a
//! recording double in tests. Buffer and path arguments stay raw register
//! words all the way to the host: [`LinuxHost`] hands them to the kernel
//! untouched, so an unmapped address fails the call with `-1` like it would
//! for a native program, instead of faulting the interpreter.

use crate::virtual_machine::isa::Syscall;
use crate::virtual_machine::memory;

/// File metadata reported by `STAT` and `FSTAT`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// File type and permission bits.
    pub mode: u64,
}

/// Host operations reachable from bytecode.
///
/// Return values follow the kernel convention: a non-negative result on
/// success, `-1` on failure.
///
/// # Safety
///
/// `buf` and `path` are program-supplied addresses. A host may reject them
/// (the kernel does so for unmapped ranges), but an address that happens to be
/// mapped is read or written as is. Callers vouch for the program, see
/// [`VM::run`](crate::virtual_machine::vm::VM::run).
pub trait SyscallHost {
    /// Reads up to `len` bytes from `fd` into `buf..buf + len`.
    unsafe fn read(&mut self, fd: i32, buf: u64, len: u64) -> i64;
    /// Writes `buf..buf + len` to `fd`.
    unsafe fn write(&mut self, fd: i32, buf: u64, len: u64) -> i64;
    /// Opens the NUL-terminated path at `path`.
    unsafe fn open(&mut self, path: u64, flags: i32, mode: u32) -> i64;
    fn close(&mut self, fd: i32) -> i64;
    /// Returns the metadata of the file at `path`, or the failing return value.
    unsafe fn stat(&mut self, path: u64) -> Result<FileStat, i64>;
    /// Returns the metadata of the open file `fd`, or the failing return value.
    fn fstat(&mut self, fd: i32) -> Result<FileStat, i64>;
}

/// Forwards every call to the kernel through `libc`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxHost;

impl SyscallHost for LinuxHost {
    unsafe fn read(&mut self, fd: i32, buf: u64, len: u64) -> i64 {
        // SAFETY: the kernel checks the range and fails with EFAULT.
        unsafe { libc::read(fd, memory::word_to_ptr(buf).cast(), len as usize) as i64 }
    }

    unsafe fn write(&mut self, fd: i32, buf: u64, len: u64) -> i64 {
        // SAFETY: the kernel checks the range and fails with EFAULT.
        unsafe {
            libc::write(
                fd,
                memory::word_to_ptr(buf).cast_const().cast(),
                len as usize,
            ) as i64
        }
    }

    unsafe fn open(&mut self, path: u64, flags: i32, mode: u32) -> i64 {
        let path = memory::word_to_ptr(path).cast_const().cast();
        // SAFETY: the kernel reads the path itself and fails with EFAULT.
        unsafe { libc::open(path, flags, mode as libc::c_uint) as i64 }
    }

    fn close(&mut self, fd: i32) -> i64 {
        // SAFETY: closing an arbitrary descriptor is memory safe.
        unsafe { libc::close(fd) as i64 }
    }

    unsafe fn stat(&mut self, path: u64) -> Result<FileStat, i64> {
        let path = memory::word_to_ptr(path).cast_const().cast();
        // SAFETY: `libc::stat` is plain old data; all-zero is a valid value.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: the kernel reads the path itself; `st` is a valid out pointer.
        let rc = unsafe { libc::stat(path, &mut st) };
        if rc == 0 {
            Ok(file_stat(&st))
        } else {
            Err(rc as i64)
        }
    }

    fn fstat(&mut self, fd: i32) -> Result<FileStat, i64> {
        // SAFETY: see `stat`.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: `st` is a valid out pointer.
        let rc = unsafe { libc::fstat(fd, &mut st) };
        if rc == 0 {
            Ok(file_stat(&st))
        } else {
            Err(rc as i64)
        }
    }
}

fn file_stat(st: &libc::stat) -> FileStat {
    FileStat {
        size: st.st_size as u64,
        mode: st.st_mode as u64,
    }
}

/// Result of one bridged call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SyscallOutcome {
    /// Host return value, stored in the destination register as a word.
    pub(crate) ret: i64,
    /// Metadata written back by `STAT`/`FSTAT`. Zeroed when the call failed.
    pub(crate) stat: Option<FileStat>,
}

impl SyscallOutcome {
    fn plain(ret: i64) -> Self {
        Self { ret, stat: None }
    }

    fn metadata(result: Result<FileStat, i64>) -> Self {
        match result {
            Ok(stat) => Self {
                ret: 0,
                stat: Some(stat),
            },
            Err(ret) => Self {
                ret,
                stat: Some(FileStat::default()),
            },
        }
    }
}

/// Performs `syscall` with the first three argument words.
///
/// Descriptors, flags and modes are truncated to their C widths the way the
/// kernel ABI would.
///
/// # Safety
///
/// See [`SyscallHost`]: buffer and path words reach the host unchecked.
pub(crate) unsafe fn invoke<H: SyscallHost>(
    host: &mut H,
    syscall: Syscall,
    args: [u64; 3],
) -> SyscallOutcome {
    let [a1, a2, a3] = args;
    match syscall {
        Syscall::Read => SyscallOutcome::plain(unsafe { host.read(a1 as i32, a2, a3) }),
        Syscall::Write => SyscallOutcome::plain(unsafe { host.write(a1 as i32, a2, a3) }),
        Syscall::Open => SyscallOutcome::plain(unsafe { host.open(a1, a2 as i32, a3 as u32) }),
        Syscall::Close => SyscallOutcome::plain(host.close(a1 as i32)),
        Syscall::Stat => SyscallOutcome::metadata(unsafe { host.stat(a1) }),
        Syscall::Fstat => SyscallOutcome::metadata(host.fstat(a1 as i32)),
    }
}
