use bytemachine_derive::Error;

/// Numeric error codes reported by the machine.
///
/// The values are part of the bytecode ABI: soft errors are written into the
/// register a program designates through the error-code selector register, and
/// programs compare against these numbers.
#[repr(u64)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    NoError = 0,
    /// Allocation requested while all table slots are live.
    AllocationFailureAtMaximum = 1,
    /// A free slot existed but the host refused the memory reservation.
    AllocationFailureOsRejectedRequest = 2,
    /// Deallocation of a handle that is not live.
    DeallocationFailure = 3,
    /// Input-buffers blob has a bad size or record count (fatal).
    InvalidInputBuffer = 4,
    /// Instruction fetch outside the program image (fatal).
    OutOfBoundsInputBufferRequested = 5,
    /// Register/buffer transfer of more than one word.
    InvalidByteTransferSize = 6,
    /// Unknown ALU operation selected by `OPERATE` (fatal).
    UnimplementedOperation = 7,
    DivisionByZeroAttempted = 8,
    ModulusByZeroAttempted = 9,
    /// Unknown syscall selector (fatal).
    UnimplementedSyscall = 10,
    /// Unknown instruction ID (fatal).
    UnimplementedInstructionId = 11,
    /// The configured step limit was reached (fatal).
    StepLimitExceeded = 12,
}

impl ErrorCode {
    /// Returns the code as a register word.
    pub const fn as_word(self) -> u64 {
        self as u64
    }

    /// Returns true for codes that halt the interpreter.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::InvalidInputBuffer
                | ErrorCode::OutOfBoundsInputBufferRequested
                | ErrorCode::UnimplementedOperation
                | ErrorCode::UnimplementedSyscall
                | ErrorCode::UnimplementedInstructionId
                | ErrorCode::StepLimitExceeded
        )
    }
}

impl TryFrom<u64> for ErrorCode {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ErrorCode::NoError,
            1 => ErrorCode::AllocationFailureAtMaximum,
            2 => ErrorCode::AllocationFailureOsRejectedRequest,
            3 => ErrorCode::DeallocationFailure,
            4 => ErrorCode::InvalidInputBuffer,
            5 => ErrorCode::OutOfBoundsInputBufferRequested,
            6 => ErrorCode::InvalidByteTransferSize,
            7 => ErrorCode::UnimplementedOperation,
            8 => ErrorCode::DivisionByZeroAttempted,
            9 => ErrorCode::ModulusByZeroAttempted,
            10 => ErrorCode::UnimplementedSyscall,
            11 => ErrorCode::UnimplementedInstructionId,
            12 => ErrorCode::StepLimitExceeded,
            other => return Err(other),
        })
    }
}

/// Fatal errors that stop the machine, plus assembly and host-side failures.
#[derive(Debug, Error)]
#[error_code(ErrorCode)]
pub enum VMError {
    /// Input-buffers blob is not 1..=16 whole records.
    #[error("invalid input buffer of {length} bytes (expected 1 to {max_records} records of {record_size} bytes)")]
    #[error_code(InvalidInputBuffer)]
    InvalidInputBuffer {
        length: u64,
        record_size: usize,
        max_records: usize,
    },
    /// Instruction fetch fell outside the program image.
    #[error("instruction at {address:#x} is outside the program image [{start:#x}, {end:#x})")]
    #[error_code(OutOfBoundsInputBufferRequested)]
    FetchOutOfBounds { address: u64, start: u64, end: u64 },
    /// Unknown instruction ID in the bytecode.
    #[error("unimplemented instruction ID {id} at {address:#x}")]
    #[error_code(UnimplementedInstructionId)]
    UnimplementedInstruction { id: u16, address: u64 },
    /// Unknown ALU operation selected by an `OPERATE` instruction.
    #[error("unimplemented operation {operation} at {address:#x}")]
    #[error_code(UnimplementedOperation)]
    UnimplementedOperation { operation: u64, address: u64 },
    /// Unknown syscall selector.
    #[error("unimplemented syscall {number} at {address:#x}")]
    #[error_code(UnimplementedSyscall)]
    UnimplementedSyscall { number: u8, address: u64 },
    /// The configured step limit was exhausted.
    #[error("step limit of {limit} instructions exhausted")]
    #[error_code(StepLimitExceeded)]
    StepLimitExceeded { limit: u64 },
    /// Expected a `rN` register operand.
    #[error("expected register, found '{0}'")]
    #[error_code(NoError)]
    ExpectedRegister(String),
    /// Register operand outside `r0..=r255`.
    #[error("invalid register '{token}'")]
    #[error_code(NoError)]
    InvalidRegister { token: String },
    /// Immediate that does not parse or does not fit its operand.
    #[error("invalid immediate '{token}' (expected {expected})")]
    #[error_code(NoError)]
    InvalidImmediate {
        token: String,
        expected: &'static str,
    },
    /// Unknown instruction mnemonic.
    #[error("unknown instruction '{name}'")]
    #[error_code(NoError)]
    InvalidInstructionName { name: String },
    /// Unknown assembler directive.
    #[error("unknown directive '{name}'")]
    #[error_code(NoError)]
    InvalidDirective { name: String },
    /// Wrong number of operands for an instruction or directive.
    #[error("{instruction} expects {expected} operands, got {actual}")]
    #[error_code(NoError)]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    #[error("label '{label}' is defined more than once")]
    #[error_code(NoError)]
    DuplicateLabel { label: String },
    #[error("undefined label '{label}'")]
    #[error_code(NoError)]
    UndefinedLabel { label: String },
    /// `.org` target lies before the current offset.
    #[error(".org {target} is behind the current offset {current}")]
    #[error_code(NoError)]
    OriginBehind { target: u64, current: u64 },
    /// Program image would grow past the assembler's size cap.
    #[error("program image would reach {size} bytes (at most {max})")]
    #[error_code(NoError)]
    ImageTooLarge { size: u128, max: u64 },
    /// Lexical error with line and column context.
    #[error("line {line}:{offset}: {message}")]
    #[error_code(NoError)]
    ParseError {
        line: usize,
        offset: usize,
        message: &'static str,
    },
    /// Assembly error with line and column context.
    #[error("line {line}:{offset}: {message}")]
    #[error_code(NoError)]
    AssemblyError {
        line: usize,
        offset: usize,
        message: String,
    },
    /// Host memory could not be reserved for a buffer.
    #[error("could not reserve {length} bytes of host memory")]
    #[error_code(AllocationFailureOsRejectedRequest)]
    HostAllocationFailed { length: u64 },
    /// File I/O error in the host harness.
    #[error("io error: {0}")]
    #[error_code(NoError)]
    IoError(String),
}

impl From<std::io::Error> for VMError {
    fn from(err: std::io::Error) -> Self {
        VMError::IoError(err.to_string())
    }
}
