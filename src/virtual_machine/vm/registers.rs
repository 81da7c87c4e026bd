use crate::virtual_machine::limits::{MAX_PARAMETER_COUNT, REGISTER_COUNT, RESERVED_REGISTER_COUNT};

/// Register 0: absolute address of the current instruction.
pub const INSTRUCTION_POINTER: u8 = 0;
/// Register 1: ID of the instruction being executed.
pub const INSTRUCTION_ID: u8 = 1;
/// Registers 2..=9: instruction parameters, in encoding order.
pub const PARAMETER_0: u8 = 2;
/// Register 8 (scratch parameter 6): `OPERATE` always-execute flag.
pub const OPERATE_ALWAYS_EXECUTE: u8 = PARAMETER_0 + 6;
/// Register 9 (scratch parameter 7): `OPERATE` resolved operation.
pub const OPERATE_OPERATION: u8 = PARAMETER_0 + 7;
/// Register 10: length in bytes of the input-buffers blob.
pub const INPUT_BUFFERS_LENGTH: u8 = 10;
/// Register 11: base address of the input-buffers blob.
pub const INPUT_BUFFERS_POINTER: u8 = 11;
/// Register 12: index of the register receiving soft error codes.
pub const ERROR_CODE_SELECTOR: u8 = 12;
/// First register without a fixed role.
pub const FIRST_GENERAL_PURPOSE: u8 = RESERVED_REGISTER_COUNT as u8;

const _: () = assert!(ERROR_CODE_SELECTOR + 1 == FIRST_GENERAL_PURPOSE);
const _: () = assert!(OPERATE_OPERATION < INPUT_BUFFERS_LENGTH);

/// Register file of 256 untyped 64-bit words.
///
/// Any register index is valid, so reads and writes are infallible. Every
/// register, reserved ones included, is writable by programs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registers {
    words: [u64; REGISTER_COUNT],
}

impl Registers {
    /// Creates a zeroed register file.
    pub const fn new() -> Self {
        Self {
            words: [0; REGISTER_COUNT],
        }
    }

    #[inline(always)]
    pub fn get(&self, idx: u8) -> u64 {
        self.words[idx as usize]
    }

    #[inline(always)]
    pub fn set(&mut self, idx: u8, value: u64) {
        self.words[idx as usize] = value;
    }

    /// Returns the word in the register named by the word in register `idx`.
    ///
    /// Only the low byte of the selector is used.
    #[inline(always)]
    pub fn get_indirect(&self, idx: u8) -> u64 {
        self.get(self.get(idx) as u8)
    }

    /// Stores `value` in the register named by the word in register `idx`.
    #[inline(always)]
    pub fn set_indirect(&mut self, idx: u8, value: u64) {
        self.set(self.get(idx) as u8, value);
    }

    /// Mirrors instruction parameter `ordinal` into its scratch register.
    #[inline(always)]
    pub(super) fn set_parameter(&mut self, ordinal: usize, value: u64) {
        if ordinal < MAX_PARAMETER_COUNT {
            self.set(PARAMETER_0 + ordinal as u8, value);
        }
    }

    /// Zeroes every parameter scratch register.
    #[inline(always)]
    pub(super) fn clear_parameters(&mut self) {
        let start = PARAMETER_0 as usize;
        self.words[start..start + MAX_PARAMETER_COUNT].fill(0);
    }

    /// Zeroes every register.
    pub fn reset(&mut self) {
        self.words = [0; REGISTER_COUNT];
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.words
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_index_is_addressable() {
        let mut regs = Registers::new();
        regs.set(255, u64::MAX);
        regs.set(0, 7);
        assert_eq!(regs.get(255), u64::MAX);
        assert_eq!(regs.get(0), 7);
        assert_eq!(regs.as_slice().len(), REGISTER_COUNT);
    }

    #[test]
    fn reset_clears_reserved_and_general_registers() {
        let mut regs = Registers::new();
        for idx in 0..=u8::MAX {
            regs.set(idx, idx as u64 + 1);
        }
        regs.reset();
        assert!(regs.as_slice()[..RESERVED_REGISTER_COUNT].iter().all(|w| *w == 0));
        assert!(regs.as_slice()[FIRST_GENERAL_PURPOSE as usize..].iter().all(|w| *w == 0));
    }

    #[test]
    fn indirect_uses_low_byte_of_selector() {
        let mut regs = Registers::new();
        regs.set(ERROR_CODE_SELECTOR, 0x1_00 + 40);
        regs.set_indirect(ERROR_CODE_SELECTOR, 8);
        assert_eq!(regs.get(40), 8);
        assert_eq!(regs.get_indirect(ERROR_CODE_SELECTOR), 8);
    }

    #[test]
    fn parameters_map_to_scratch_registers() {
        let mut regs = Registers::new();
        for ordinal in 0..MAX_PARAMETER_COUNT {
            regs.set_parameter(ordinal, ordinal as u64 + 100);
        }
        regs.set_parameter(MAX_PARAMETER_COUNT, 1);
        assert_eq!(regs.get(2), 100);
        assert_eq!(regs.get(9), 107);
        assert_eq!(regs.get(10), 0);

        regs.clear_parameters();
        assert!(regs.as_slice()[2..10].iter().all(|w| *w == 0));
    }
}
