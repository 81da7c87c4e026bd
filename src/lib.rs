//! Byte machine library.
//!
//! Provides a small register-based bytecode virtual machine together with its
//! assembler, bytecode builder and host harness.

pub mod utils;
pub mod virtual_machine;
