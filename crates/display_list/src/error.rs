use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// `restore()` was called with no `save()` or `save_layer()` pending.
    UnbalancedSaveRestore,
    /// A single record would not fit the 24-bit length field of its header.
    RecordTooLarge { words: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnbalancedSaveRestore => {
                write!(formatter, "restore called without a matching save")
            }
            BuildError::RecordTooLarge { words } => {
                write!(formatter, "record of {words} words exceeds the tape record limit")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Failures found while walking a tape. Offsets are byte offsets of the
/// offending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    MalformedTape { offset: usize },
    UnknownOpcode { offset: usize, opcode: u8 },
    ObjectIndexOutOfRange { offset: usize, index: u32 },
    ObjectTypeMismatch { offset: usize, index: u32 },
    RangeNotOnRecordBoundary { offset: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MalformedTape { offset } => {
                write!(formatter, "malformed record at byte {offset}")
            }
            DispatchError::UnknownOpcode { offset, opcode } => {
                write!(formatter, "unknown opcode {opcode} at byte {offset}")
            }
            DispatchError::ObjectIndexOutOfRange { offset, index } => {
                write!(
                    formatter,
                    "record at byte {offset} references missing object {index}"
                )
            }
            DispatchError::ObjectTypeMismatch { offset, index } => {
                write!(
                    formatter,
                    "record at byte {offset} references object {index} of the wrong kind"
                )
            }
            DispatchError::RangeNotOnRecordBoundary { offset } => {
                write!(formatter, "byte {offset} is not a record boundary")
            }
        }
    }
}

impl std::error::Error for DispatchError {}
