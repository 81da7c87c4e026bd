//! Programmatic bytecode encoder.
//!
//! [`ProgramBuilder`] has one method per instruction, generated from the ISA
//! table, each appending the encoded instruction and returning `&mut Self` so
//! calls chain:
//!
//! ```
//! use bytemachine::virtual_machine::builder::ProgramBuilder;
//! use bytemachine::virtual_machine::isa::Operation;
//!
//! let mut program = ProgramBuilder::new();
//! program
//!     .write_register(13, 40)
//!     .write_register(14, 2)
//!     .write_register(15, 0)
//!     .operate(15, 64, Operation::Add as u8, 13, 14, 16)
//!     .quit(16, 15);
//! assert_eq!(program.offset(), 11 * 3 + 8 + 4);
//! ```

use crate::define_instructions;
use crate::virtual_machine::isa::Instruction;

/// Append-only bytecode buffer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProgramBuilder {
    bytes: Vec<u8>,
}

macro_rules! define_builder {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $method:ident, $mnemonic:literal, $stride:expr => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        impl ProgramBuilder {
            $(
                $(#[$doc])*
                pub fn $method(&mut self, $( $field: define_instructions!(@ty $kind) ),*) -> &mut Self {
                    self.bytes.extend_from_slice(&(Instruction::$name as u16).to_le_bytes());
                    $( define_instructions!(@emit self.bytes, $kind, $field); )*
                    self
                }
            )*
        }
    };
}

crate::for_each_instruction!(define_builder);

impl ProgramBuilder {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Current length of the program, i.e. the offset of the next instruction.
    pub fn offset(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Encoded bytes so far.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Appends raw data (messages, tables) to the image.
    pub fn data(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Pads with zeroes up to `offset`. Does nothing if the image is already
    /// that long.
    pub fn zero_fill_to(&mut self, offset: u64) -> &mut Self {
        if let Ok(offset) = usize::try_from(offset)
            && offset > self.bytes.len()
        {
            self.bytes.resize(offset, 0);
        }
        self
    }

    /// Consumes the builder and returns the program image.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
