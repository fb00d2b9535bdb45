//! Error taxonomy for the emulator core
//!
//! Everything fallible in the core surfaces a [`NesError`]; nothing is
//! recovered locally. ROM parsing errors carry the context a frontend needs
//! to report the failure (leading bytes, mapper number, declared size).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NesError {
    #[error("invalid iNES signature: {0:02x?}")]
    InvalidSignature([u8; 4]),

    #[error("mapper number not implemented: {0}")]
    UnsupportedMapper(u8),

    #[error("PRG ROM size incompatible with mapper 0: {0} x 16 KiB")]
    InvalidPrgSize(u8),

    #[error("CHR ROM size incompatible with mapper 0: {0} x 8 KiB")]
    InvalidChrSize(u8),

    #[error("ROM image truncated: expected {expected} bytes, got {actual}")]
    RomTruncated { expected: usize, actual: usize },

    /// The CPU fetched an opcode with no implementation. The machine state is
    /// consistent with the bytes consumed so far; the PC has moved past the
    /// offending byte.
    #[error("illegal opcode: {0:02x}")]
    IllegalOpcode(u8),
}
