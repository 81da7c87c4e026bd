//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the machine's instruction set. The [`for_each_instruction!`](crate::for_each_instruction)
//! macro holds the canonical instruction table and invokes a callback macro for
//! code generation, so the decoder, the [`ProgramBuilder`](super::builder::ProgramBuilder)
//! and the [`assembler`](super::assembler) all derive from one definition.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode ID mappings
//! - `TryFrom<u16>` for decoding opcode IDs
//! - Per-instruction stride and mnemonic tables
//!
//! It also defines the [`Operation`] selectors of `OPERATE` and the [`Syscall`]
//! selectors of `SYSCALL`.
//!
//! # Bytecode Format
//!
//! Every instruction has a fixed stride:
//! - Opcode ID: 2 bytes (little-endian)
//! - Register operand: 1 byte (register index 0-255)
//! - Immediate u8 / operation / syscall selector: 1 byte
//! - Immediate u64: 8 bytes (little-endian)

use crate::virtual_machine::errors::VMError;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry is `Name = id, builder_method, "MNEMONIC", stride => [fields]`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// QUIT rp, rl ; output = { data: rp, length: rl } and halt
            Quit = 0, quit, "QUIT", 4 => [data: Reg, length: Reg],
            /// WRITE_REGISTER rd, imm64 ; rd = imm64
            WriteRegister = 1, write_register, "WRITE_REGISTER", 11 => [rd: Reg, value: Imm64],
            /// ALLOCATE rs, rh, rp, rl ; reserve rs bytes -> handle rh, address rp, length rl
            Allocate = 2, allocate, "ALLOCATE", 6 => [size: Reg, handle: Reg, pointer: Reg, length: Reg],
            /// DEALLOCATE rh ; release the allocation with handle rh
            Deallocate = 3, deallocate, "DEALLOCATE", 3 => [handle: Reg],
            /// BUFFER_TO_REGISTER ra, n, rd ; rd = n bytes loaded from address ra (n <= 8)
            BufferToRegister = 4, buffer_to_register, "BUFFER_TO_REGISTER", 5 => [address: Reg, count: Imm8, rd: Reg],
            /// REGISTER_TO_REGISTER rs, rd ; rd = rs
            RegisterToRegister = 5, register_to_register, "REGISTER_TO_REGISTER", 4 => [rs: Reg, rd: Reg],
            /// REGISTER_TO_BUFFER rs, n, ra ; store the low n bytes of rs at address ra (n <= 8)
            RegisterToBuffer = 6, register_to_buffer, "REGISTER_TO_BUFFER", 5 => [rs: Reg, count: Imm8, address: Reg],
            /// OPERATE rf, mode, op, ra, rb, rd ; rd = ra op rb, gated by mode and flags rf
            Operate = 7, operate, "OPERATE", 8 => [flags: Reg, mode: Imm8, operation: OpSel, a: Reg, b: Reg, rd: Reg],
            /// SYSCALL nr, r1, r2, r3, r4, r5, r6, rd ; rd = host syscall nr(r1, r2, r3)
            Syscall = 8, syscall, "SYSCALL", 10 => [number: SysSel, arg1: Reg, arg2: Reg, arg3: Reg, arg4: Reg, arg5: Reg, arg6: Reg, rd: Reg],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $method:ident, $mnemonic:literal, $stride:expr => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // Instruction enum
        // =========================
        #[repr(u16)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u16> for Instruction {
            type Error = VMError;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::UnimplementedInstruction {
                        id: value,
                        address: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in opcode ID order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name ),* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the fixed number of bytes this instruction occupies,
            /// opcode ID included. The instruction pointer always advances by it.
            pub const fn stride(&self) -> u64 {
                match self {
                    $( Instruction::$name => $stride, )*
                }
            }

            /// Returns the number of bytes taken by the operands.
            pub const fn operand_bytes(&self) -> u64 {
                match self {
                    $( Instruction::$name => 0u64 $( + define_instructions!(@size $kind) )*, )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)    => { u8 };
    (@ty Imm8)   => { u8 };
    (@ty OpSel)  => { u8 };
    (@ty SysSel) => { u8 };
    (@ty Imm64)  => { u64 };

    // ---------- sizes ----------
    (@size Reg)    => { 1u64 };
    (@size Imm8)   => { 1u64 };
    (@size OpSel)  => { 1u64 };
    (@size SysSel) => { 1u64 };
    (@size Imm64)  => { 8u64 };

    // ---------- encoding ----------
    (@emit $out:expr, Imm64, $v:expr) => {
        $out.extend_from_slice(&$v.to_le_bytes());
    };

    (@emit $out:expr, $kind:ident, $v:expr) => {
        $out.push($v);
    };
}

for_each_instruction!(define_instructions);

/// Declares a selector enum decoded from a register word or an imm8 byte.
macro_rules! define_selectors {
    (
        $(#[$meta:meta])*
        $enum_name:ident {
            $( $(#[$doc:meta])* $name:ident = $value:expr, $mnemonic:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum $enum_name {
            $( $(#[$doc])* $name = $value, )*
        }

        impl $enum_name {
            /// Every selector, in value order.
            pub const ALL: &'static [$enum_name] = &[ $( $enum_name::$name ),* ];

            /// Returns the assembly mnemonic for this selector.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( $enum_name::$name => $mnemonic, )*
                }
            }

            /// Looks a selector up by its assembly mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Self> {
                match name {
                    $( $mnemonic => Some($enum_name::$name), )*
                    _ => None,
                }
            }
        }

        impl TryFrom<u64> for $enum_name {
            type Error = u64;

            fn try_from(value: u64) -> Result<Self, Self::Error> {
                match value {
                    $( v if v == $value => Ok($enum_name::$name), )*
                    other => Err(other),
                }
            }
        }
    };
}

define_selectors! {
    /// ALU operations selectable by `OPERATE`. All arithmetic is unsigned and wrapping.
    Operation {
        /// a >> b (0 when b >= 64)
        RightShift = 0, "SHR",
        /// a << b (0 when b >= 64)
        LeftShift = 1, "SHL",
        /// !a, b is ignored
        Not = 2, "NOT",
        And = 3, "AND",
        Or = 4, "OR",
        Xor = 5, "XOR",
        Add = 6, "ADD",
        Subtract = 7, "SUB",
        Multiply = 8, "MUL",
        /// a / b, soft error when b == 0
        Divide = 9, "DIV",
        /// a % b, soft error when b == 0
        Modulo = 10, "MOD",
        LessThan = 11, "LT",
        EqualTo = 12, "EQ",
        NotEqualTo = 13, "NE",
        GreaterThan = 14, "GT",
    }
}

define_selectors! {
    /// Host syscalls reachable through `SYSCALL`. Nothing else is reachable.
    Syscall {
        /// rd = read(fd: r1, buf: r2, len: r3)
        Read = 0, "READ",
        /// rd = write(fd: r1, buf: r2, len: r3)
        Write = 1, "WRITE",
        /// rd = open(path: r1, flags: r2, mode: r3)
        Open = 2, "OPEN",
        /// rd = close(fd: r1)
        Close = 3, "CLOSE",
        /// rd = stat(path: r1); r2 = size, r3 = mode
        Stat = 4, "STAT",
        /// rd = fstat(fd: r1); r2 = size, r3 = mode
        Fstat = 5, "FSTAT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_invalid() {
        assert!(matches!(
            Instruction::try_from(0xFFFF),
            Err(VMError::UnimplementedInstruction { id: 0xFFFF, .. })
        ));
        assert!(Instruction::try_from(9).is_err());
    }

    #[test]
    fn ids_match_table_order() {
        for (id, instr) in Instruction::ALL.iter().enumerate() {
            assert_eq!(*instr as u16, id as u16);
            assert_eq!(Instruction::try_from(id as u16).unwrap(), *instr);
        }
    }

    #[test]
    fn strides_are_opcode_plus_operands() {
        for instr in Instruction::ALL {
            assert_eq!(
                instr.stride(),
                2 + instr.operand_bytes(),
                "{}",
                instr.mnemonic()
            );
        }
    }

    #[test]
    fn strides_match_wire_contract() {
        let expected = [4, 11, 6, 3, 5, 4, 5, 8, 10];
        let actual: Vec<u64> = Instruction::ALL.iter().map(|i| i.stride()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn operation_selectors() {
        assert_eq!(Operation::try_from(6), Ok(Operation::Add));
        assert_eq!(Operation::try_from(14), Ok(Operation::GreaterThan));
        assert_eq!(Operation::try_from(15), Err(15));
        assert_eq!(Operation::try_from(256 + 6), Err(262));
        assert_eq!(Operation::from_mnemonic("MOD"), Some(Operation::Modulo));
        assert_eq!(Operation::ALL.len(), 15);
    }

    #[test]
    fn syscall_selectors() {
        assert_eq!(Syscall::try_from(1), Ok(Syscall::Write));
        assert_eq!(Syscall::try_from(6), Err(6));
        assert_eq!(Syscall::from_mnemonic("FSTAT"), Some(Syscall::Fstat));
        assert_eq!(Syscall::Stat.mnemonic(), "STAT");
    }
}
