//! Core virtual machine implementation.
//!
//! The VM interprets bytecode in place, straight from host memory, with 256
//! untyped 64-bit registers. A run starts from an input-buffers blob whose
//! first sub-buffer is the program image, and ends at `QUIT` (yielding an
//! output buffer) or at the first fatal error. Arithmetic wraps.
//!
//! Every instruction has a fixed stride. Its parameters are mirrored into the
//! scratch registers 2..=9 before it executes, and register 0 is advanced by
//! the stride after it executes, so writing register 0 is a jump to the
//! written address plus the stride.

use crate::virtual_machine::allocations::{AllocationTable, NO_HANDLE};
use crate::virtual_machine::buffer::{Buffer, RECORD_SIZE};
use crate::virtual_machine::errors::{ErrorCode, VMError};
use crate::virtual_machine::isa::{Instruction, Operation, Syscall};
use crate::virtual_machine::limits::{MAX_INPUT_SUB_BUFFER_COUNT, MAX_TRANSFER_SIZE, OPCODE_SIZE};
use crate::virtual_machine::memory;
use crate::virtual_machine::syscall::{self, SyscallHost};
use crate::{debug, info, warn};

mod config;
pub mod registers;

pub use config::VmConfig;
use registers::*;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        host = $host:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => exec_vm!(@call $vm, $host, $handler, $args),
            )*
        }
    }};

    // Handler with host access (semicolon separator)
    (@call $vm:ident, $host:ident, $handler:ident,
        (host; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        let mut operands = OperandReader::new($vm.current);
        $( let $field = exec_vm!(@read $vm, operands, $kind); )*
        unsafe { $vm.$handler($host, $( $field ),*) }
    }};

    // Handler without host access (no semicolon)
    (@call $vm:ident, $host:ident, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        let mut operands = OperandReader::new($vm.current);
        $( let $field = exec_vm!(@read $vm, operands, $kind); )*
        $vm.$handler($( $field ),*)
    }};

    // Decode a u64 immediate (little-endian, 8 bytes)
    (@read $vm:ident, $ops:ident, Imm64) => {
        unsafe { $ops.word(&mut $vm.registers) }
    };

    // Decode a one-byte operand: register index, imm8 or selector
    (@read $vm:ident, $ops:ident, $kind:ident) => {
        unsafe { $ops.byte(&mut $vm.registers) }
    };
}

/// Cursor over the operand bytes of the instruction being executed.
///
/// Each operand read is mirrored into the scratch register of the same ordinal.
struct OperandReader {
    address: u64,
    ordinal: usize,
}

impl OperandReader {
    fn new(instruction: u64) -> Self {
        Self {
            address: instruction.wrapping_add(OPCODE_SIZE),
            ordinal: 0,
        }
    }

    /// # Safety
    ///
    /// The operand byte must be readable.
    unsafe fn byte(&mut self, registers: &mut Registers) -> u8 {
        let value = unsafe { memory::read_word(self.address, 1) } as u8;
        self.advance(registers, 1, value as u64);
        value
    }

    /// # Safety
    ///
    /// The eight operand bytes must be readable.
    unsafe fn word(&mut self, registers: &mut Registers) -> u64 {
        let value = unsafe { memory::read_word(self.address, 8) };
        self.advance(registers, 8, value);
        value
    }

    fn advance(&mut self, registers: &mut Registers, width: u64, value: u64) {
        registers.set_parameter(self.ordinal, value);
        self.ordinal += 1;
        self.address = self.address.wrapping_add(width);
    }
}

/// Bytecode virtual machine.
///
/// Owns the register file and the allocation table. Both survive a run so the
/// caller can inspect them; allocations are released when the next run starts
/// or when the VM is dropped.
pub struct VM {
    /// Register file (256 registers).
    registers: Registers,
    /// Buffers reserved by `ALLOCATE`.
    allocations: AllocationTable,
    config: VmConfig,
    /// Sub-buffer 0 of the current run, for the fetch bounds check.
    program: Buffer,
    /// Address of the instruction being executed.
    current: u64,
    /// Instructions dispatched in the current run.
    steps: u64,
    /// Output produced by `QUIT`.
    output: Option<Buffer>,
}

impl VM {
    /// Creates a VM with zeroed registers and an empty allocation table.
    pub fn new(config: VmConfig) -> Self {
        Self {
            registers: Registers::new(),
            allocations: AllocationTable::new(),
            config,
            program: Buffer::null(),
            current: 0,
            steps: 0,
            output: None,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn allocations(&self) -> &AllocationTable {
        &self.allocations
    }

    /// Returns the soft error register, i.e. the register named by register 12.
    pub fn soft_error(&self) -> u64 {
        self.registers.get_indirect(ERROR_CODE_SELECTOR)
    }

    /// Returns the number of instructions dispatched by the last run.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs the program described by the input-buffers blob `input` until
    /// `QUIT` or a fatal error.
    ///
    /// Soft errors do not stop the run; read them with [`VM::soft_error`].
    ///
    /// # Safety
    ///
    /// `input` must describe readable records, and the program is trusted with
    /// the host address space: every word it loads from, stores to, or passes
    /// to a syscall as an address must be valid for that access. The fetch
    /// bounds check only guards instruction fetches.
    pub unsafe fn run<H: SyscallHost>(
        &mut self,
        host: &mut H,
        input: Buffer,
    ) -> Result<Buffer, VMError> {
        let result = unsafe { self.execute(host, input) };
        if let Err(err) = &result {
            warn!(
                "Byte machine faulted after {} instructions: {} (error code {})",
                self.steps,
                err,
                err.code().as_word()
            );
        }
        result
    }

    unsafe fn execute<H: SyscallHost>(
        &mut self,
        host: &mut H,
        input: Buffer,
    ) -> Result<Buffer, VMError> {
        unsafe { self.initialize(input)? };

        loop {
            if let Some(limit) = self.config.step_limit
                && self.steps >= limit
            {
                return Err(VMError::StepLimitExceeded { limit });
            }
            self.steps += 1;

            self.registers.clear_parameters();
            self.current = self.registers.get(INSTRUCTION_POINTER);
            let instr = unsafe { self.fetch()? };

            debug!("{:#x}: {}", self.current, instr.mnemonic());
            unsafe { self.exec(instr, host)? };

            if let Some(output) = self.output.take() {
                return Ok(output);
            }

            let ip = self.registers.get(INSTRUCTION_POINTER);
            self.registers
                .set(INSTRUCTION_POINTER, ip.wrapping_add(instr.stride()));
        }
    }

    /// Validates the blob and sets up registers and allocations.
    unsafe fn initialize(&mut self, input: Buffer) -> Result<(), VMError> {
        let records = input.record_count();
        if input.length % RECORD_SIZE as u64 != 0
            || records == 0
            || records > MAX_INPUT_SUB_BUFFER_COUNT as u64
        {
            return Err(VMError::InvalidInputBuffer {
                length: input.length,
                record_size: RECORD_SIZE,
                max_records: MAX_INPUT_SUB_BUFFER_COUNT,
            });
        }

        self.steps = 0;
        self.output = None;
        self.allocations.clear();
        self.program = unsafe { input.record(0) };

        self.registers.reset();
        self.registers.set(INSTRUCTION_POINTER, self.program.data);
        self.registers.set(INPUT_BUFFERS_LENGTH, input.length);
        self.registers.set(INPUT_BUFFERS_POINTER, input.data);
        Ok(())
    }

    /// Loads the opcode ID at the current instruction into register 1.
    unsafe fn fetch(&mut self) -> Result<Instruction, VMError> {
        let address = self.current;
        self.check_fetch(OPCODE_SIZE)?;
        let id = unsafe { memory::read_word(address, OPCODE_SIZE as usize) };
        self.registers.set(INSTRUCTION_ID, id);

        let instr = Instruction::try_from(id as u16).map_err(|_| {
            VMError::UnimplementedInstruction {
                id: id as u16,
                address,
            }
        })?;
        self.check_fetch(instr.stride())?;
        Ok(instr)
    }

    fn check_fetch(&self, len: u64) -> Result<(), VMError> {
        if !self.config.fetch_bounds_check || self.program.contains(self.current, len) {
            return Ok(());
        }
        Err(VMError::FetchOutOfBounds {
            address: self.current,
            start: self.program.data,
            end: self.program.data.saturating_add(self.program.length),
        })
    }

    /// Writes a soft error code into the register selected by register 12.
    fn raise(&mut self, code: ErrorCode) {
        self.registers
            .set_indirect(ERROR_CODE_SELECTOR, code.as_word());
    }

    /// Executes a single instruction.
    unsafe fn exec<H: SyscallHost>(
        &mut self,
        instruction: Instruction,
        host: &mut H,
    ) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            host = host,
            instr = instruction,
            {
                Quit => op_quit(data: Reg, length: Reg),
                WriteRegister => op_write_register(rd: Reg, value: Imm64),
                // Allocations
                Allocate => op_allocate(size: Reg, handle: Reg, pointer: Reg, length: Reg),
                Deallocate => op_deallocate(handle: Reg),
                // Moves
                BufferToRegister => op_buffer_to_register(address: Reg, count: Imm8, rd: Reg),
                RegisterToRegister => op_register_to_register(rs: Reg, rd: Reg),
                RegisterToBuffer => op_register_to_buffer(rs: Reg, count: Imm8, address: Reg),
                // ALU
                Operate => op_operate(flags: Reg, mode: Imm8, operation: OpSel, a: Reg, b: Reg, rd: Reg),
                // Host
                Syscall => op_syscall(host; number: SysSel, arg1: Reg, arg2: Reg, arg3: Reg, arg4: Reg, arg5: Reg, arg6: Reg, rd: Reg),
            }
        }
    }

    fn op_quit(&mut self, data: u8, length: u8) -> Result<(), VMError> {
        let output = Buffer {
            data: self.registers.get(data),
            length: self.registers.get(length),
        };
        if self.config.dump_on_quit {
            self.dump(output);
        }
        self.output = Some(output);
        Ok(())
    }

    fn op_write_register(&mut self, rd: u8, value: u64) -> Result<(), VMError> {
        self.registers.set(rd, value);
        Ok(())
    }

    fn op_allocate(&mut self, size: u8, handle: u8, pointer: u8, length: u8) -> Result<(), VMError> {
        match self.allocations.allocate(self.registers.get(size)) {
            Ok(h) => {
                let buffer = self.allocations.get(h).unwrap_or_default();
                self.registers.set(handle, h);
                self.registers.set(pointer, buffer.data);
                self.registers.set(length, buffer.length);
            }
            Err(err) => {
                self.registers.set(handle, NO_HANDLE);
                self.registers.set(pointer, 0);
                self.registers.set(length, 0);
                self.raise(err.code());
            }
        }
        Ok(())
    }

    fn op_deallocate(&mut self, handle: u8) -> Result<(), VMError> {
        if self
            .allocations
            .deallocate(self.registers.get(handle))
            .is_err()
        {
            self.raise(ErrorCode::DeallocationFailure);
        }
        Ok(())
    }

    fn op_buffer_to_register(&mut self, address: u8, count: u8, rd: u8) -> Result<(), VMError> {
        if count > MAX_TRANSFER_SIZE {
            self.raise(ErrorCode::InvalidByteTransferSize);
            return Ok(());
        }
        // SAFETY: the address comes from trusted bytecode, see `VM::run`.
        let value = unsafe { memory::read_word(self.registers.get(address), count as usize) };
        self.registers.set(rd, value);
        Ok(())
    }

    fn op_register_to_register(&mut self, rs: u8, rd: u8) -> Result<(), VMError> {
        self.registers.set(rd, self.registers.get(rs));
        Ok(())
    }

    fn op_register_to_buffer(&mut self, rs: u8, count: u8, address: u8) -> Result<(), VMError> {
        if count > MAX_TRANSFER_SIZE {
            self.raise(ErrorCode::InvalidByteTransferSize);
            return Ok(());
        }
        let bytes = self.registers.get(rs).to_le_bytes();
        // SAFETY: the address comes from trusted bytecode, see `VM::run`.
        unsafe { memory::write_bytes(self.registers.get(address), &bytes[..count as usize]) };
        Ok(())
    }

    /// `OPERATE` mode ranges:
    ///
    /// | Mode       | Always execute | Operation from         |
    /// |------------|----------------|------------------------|
    /// | `0..32`    | no             | the operation byte     |
    /// | `32..64`   | no             | the register it names  |
    /// | `64..128`  | yes            | the operation byte     |
    /// | `128..256` | yes            | the register it names  |
    ///
    /// When not always executing, the operation runs only if bit `mode % 32`
    /// of the flags register is set.
    fn op_operate(
        &mut self,
        flags: u8,
        mode: u8,
        operation: u8,
        a: u8,
        b: u8,
        rd: u8,
    ) -> Result<(), VMError> {
        let always = mode >= 64;
        let indirect = (32..64).contains(&mode) || mode >= 128;
        let selected = if indirect {
            self.registers.get(operation)
        } else {
            operation as u64
        };
        self.registers.set(OPERATE_ALWAYS_EXECUTE, always as u64);
        self.registers.set(OPERATE_OPERATION, selected);

        if !always && self.registers.get(flags) & (1u64 << (mode % 32)) == 0 {
            return Ok(());
        }

        let op = Operation::try_from(selected).map_err(|operation| {
            VMError::UnimplementedOperation {
                operation,
                address: self.current,
            }
        })?;
        let x = self.registers.get(a);
        let y = self.registers.get(b);

        let result = match op {
            Operation::RightShift if y < 64 => x >> y,
            Operation::LeftShift if y < 64 => x << y,
            Operation::RightShift | Operation::LeftShift => 0,
            Operation::Not => !x,
            Operation::And => x & y,
            Operation::Or => x | y,
            Operation::Xor => x ^ y,
            Operation::Add => x.wrapping_add(y),
            Operation::Subtract => x.wrapping_sub(y),
            Operation::Multiply => x.wrapping_mul(y),
            Operation::Divide => match x.checked_div(y) {
                Some(q) => q,
                None => {
                    self.raise(ErrorCode::DivisionByZeroAttempted);
                    return Ok(());
                }
            },
            Operation::Modulo => match x.checked_rem(y) {
                Some(r) => r,
                None => {
                    self.raise(ErrorCode::ModulusByZeroAttempted);
                    return Ok(());
                }
            },
            Operation::LessThan => (x < y) as u64,
            Operation::EqualTo => (x == y) as u64,
            Operation::NotEqualTo => (x != y) as u64,
            Operation::GreaterThan => (x > y) as u64,
        };
        self.registers.set(rd, result);
        Ok(())
    }

    /// # Safety
    ///
    /// Buffer and path words reach the host unchecked, see [`SyscallHost`].
    #[allow(clippy::too_many_arguments)]
    unsafe fn op_syscall<H: SyscallHost>(
        &mut self,
        host: &mut H,
        number: u8,
        arg1: u8,
        arg2: u8,
        arg3: u8,
        _arg4: u8,
        _arg5: u8,
        _arg6: u8,
        rd: u8,
    ) -> Result<(), VMError> {
        let call = Syscall::try_from(number as u64).map_err(|_| VMError::UnimplementedSyscall {
            number,
            address: self.current,
        })?;
        let args = [
            self.registers.get(arg1),
            self.registers.get(arg2),
            self.registers.get(arg3),
        ];
        let outcome = unsafe { syscall::invoke(host, call, args) };

        self.registers.set(rd, outcome.ret as u64);
        if let Some(stat) = outcome.stat {
            self.registers.set(arg2, stat.size);
            self.registers.set(arg3, stat.mode);
        }
        Ok(())
    }

    /// Logs the register file (32 rows of 8) and the output pair.
    fn dump(&self, output: Buffer) {
        info!("Instruction 'QUIT' called, dumping registers and output:");
        for (row, words) in self.registers.as_slice().chunks(8).enumerate() {
            let line = words
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            info!("\t{:3}: [ {} ]", row * 8, line);
        }
        info!("\tOutput: [ {}, {} ]", output.data, output.length);
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}
