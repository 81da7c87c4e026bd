//! Fixed capacities of the machine.

/// Number of registers in the register file.
pub const REGISTER_COUNT: usize = 256;

/// Number of slots in the allocation table. Also the "no free slot" sentinel handle.
pub const MAX_ALLOCATION_COUNT: usize = 256;

/// Maximum number of sub-buffers in the input-buffers blob.
pub const MAX_INPUT_SUB_BUFFER_COUNT: usize = 16;

/// Number of instruction-parameter scratch registers.
pub const MAX_PARAMETER_COUNT: usize = 8;

/// Largest byte count a register/buffer transfer may move.
pub const MAX_TRANSFER_SIZE: u8 = 8;

/// Registers `0..RESERVED_REGISTER_COUNT` have fixed roles.
pub const RESERVED_REGISTER_COUNT: usize = 13;

/// Largest program image the assembler emits, in bytes.
pub const MAX_IMAGE_SIZE: u64 = 16 << 20;

/// Width of an opcode ID in bytes.
pub const OPCODE_SIZE: u64 = 2;
