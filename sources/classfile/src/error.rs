use support::bytes_ext::OutOfBytes;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("malformed class file: {0}")]
    MalformedClassFile(String),

    #[error("truncated input: {0}")]
    TruncatedInput(#[from] OutOfBytes),

    #[error("constant pool index {index} is out of range (pool has {size} slots)")]
    IndexOutOfRange { index: u16, size: usize },

    #[error("constant pool entry {index} is {found}, expected {expected}")]
    ConstantKindMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("constant pool cannot hold more than 65535 slots")]
    PoolOverflow,

    #[error("utf8 constant of {0} bytes exceeds the 65535 byte limit")]
    ConstantTooLong(usize),

    #[error("invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: u32 },

    #[error("offset {offset} ({context}) is not an instruction boundary")]
    InvalidOffset { offset: u32, context: String },

    #[error("unsupported edit: {0}")]
    UnsupportedEdit(String),

    #[error("code length {0} exceeds the 65535 byte limit")]
    CodeTooLarge(usize),

    #[error("member {name}:{descriptor} already exists")]
    DuplicateMember { name: String, descriptor: String },

    #[error("field {0} does not resolve in the class or its known ancestry")]
    FieldNotFound(String),

    #[error("method {name}{descriptor} not found")]
    MethodNotFound { name: String, descriptor: String },

    #[error("invalid descriptor '{descriptor}': {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },
}

impl ClassFileError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ClassFileError::MalformedClassFile(message.into())
    }

    pub(crate) fn invalid_offset(offset: u32, context: impl Into<String>) -> Self {
        ClassFileError::InvalidOffset {
            offset,
            context: context.into(),
        }
    }
}

pub type Result<T, E = ClassFileError> = std::result::Result<T, E>;
