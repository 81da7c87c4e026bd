//! Register-based bytecode virtual machine.
//!
//! The machine interprets a compact bytecode straight out of host memory. A
//! run takes an input-buffers blob (up to 16 address/length records, record 0
//! being the program image) and ends at `QUIT` with an output buffer, or at
//! the first fatal error.
//!
//! # Architecture
//!
//! - **Registers**: 256 untyped 64-bit words; registers 0..=12 have fixed roles
//!   (instruction pointer, instruction ID, parameter scratch, blob location,
//!   soft-error selector) but stay writable
//! - **Instruction format**: 2-byte opcode ID followed by fixed-width operands,
//!   so every instruction has a fixed stride
//! - **Allocations**: up to 256 host buffers reserved and released by handle
//! - **Syscalls**: read, write, open, close, stat and fstat through a host trait
//! - **Errors**: fatal errors stop the run; soft errors are written into a
//!   register the program selects and execution continues
//!
//! # Modules
//!
//! - [`allocations`]: Handle-indexed allocation table
//! - [`assembler`]: Assembly parsing, diagnostics, and bytecode generation
//! - [`buffer`]: Address/length records and the input-buffers blob
//! - [`builder`]: Programmatic bytecode encoder
//! - [`errors`]: Error codes and error types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`limits`]: Fixed capacities
//! - [`syscall`]: Host syscall bridge
//! - [`vm`]: Interpreter loop and configuration

pub mod allocations;
pub mod assembler;
pub mod buffer;
pub mod builder;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod limits;
pub(crate) mod memory;
pub mod syscall;
pub mod vm;
