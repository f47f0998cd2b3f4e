//! Unified error type and exchange status codes for the coupling pipeline.
//!
//! `CouplingError` is reserved for faults that break a call locally: I/O,
//! parse failures, transport faults, consistency violations detected before
//! any peer is waiting on us. Degradation that must travel *across* the
//! process group (so that peers can complete their handshakes) is carried as
//! an [`ExchangeStatus`] instead and merged with [`ExchangeStatus::worst`].

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all fallible coupling operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CouplingError {
    /// File could not be opened, read or written.
    #[error("i/o error on {path}: {message}")]
    Io { path: PathBuf, message: String },
    /// File content did not parse as expected.
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
    /// A point-to-point exchange with a peer failed or was malformed.
    #[error("communication error with rank {peer}: {message}")]
    Comm { peer: usize, message: String },
    /// Declared and received payload lengths disagree.
    #[error("payload length mismatch: declared {declared}, received {received}")]
    PayloadLengthMismatch { declared: usize, received: usize },
    /// A reorder index pointed past the end of the source array.
    #[error("reorder index out of bounds at position {pos}: index {index} >= source length {len}")]
    ReorderIndexOutOfBounds { pos: usize, index: usize, len: usize },
    /// Index array and destination disagree in length.
    #[error("reorder length mismatch: {index_len} indices for {dest_len} destination entries")]
    ReorderLengthMismatch { index_len: usize, dest_len: usize },
    /// A worker id reported during a gather was outside the process group.
    #[error("worker id {id} out of range for {workers} workers")]
    WorkerIdOutOfRange { id: usize, workers: usize },
    /// Nearest-neighbor matching needs at least one point on each side.
    #[error("cannot match against an empty point set")]
    EmptyPointSet,
    /// The two point sets live in different spatial dimensions.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Slot tag index exceeds the per-cell slot capacity.
    #[error("slot tag {tag} out of range: zone provides {slots} slots per cell")]
    SlotOutOfRange { tag: usize, slots: usize },
    /// A cell handle was not present in the local zone slice.
    #[error("unknown cell {cell} in zone slice")]
    UnknownCell { cell: u32 },
    /// The session was asked to exchange before a mapping was built.
    #[error("coupling session is not initialized")]
    NotInitialized,
    /// Initialization requires the external solver to have signalled ready.
    #[error("wrong sync state for initialization: {found} (expected external-ready)")]
    WrongSyncState { found: i32 },
    /// Count-table total disagrees with the gathered point-set length.
    #[error("count table sums to {table}, point set has {points} points")]
    CountTableMismatch { table: usize, points: usize },
    /// A worker passed a different number of zone slices than configured.
    #[error("configured {expected} coupled zones but got {found} local slices")]
    ZoneCountMismatch { expected: usize, found: usize },
}

impl CouplingError {
    /// Wrap a `std::io::Error` for `path`, stringifying the source so the
    /// enum stays `Clone + PartialEq`.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        CouplingError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CouplingError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn comm(peer: usize, message: impl Into<String>) -> Self {
        CouplingError::Comm {
            peer,
            message: message.into(),
        }
    }
}

/// Tri-state result code threaded through every hop of a distributed
/// exchange. A non-OK status still completes the handshake so peers never
/// deadlock; payload exchange is skipped on `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExchangeStatus {
    Ok = 0,
    Warning = 1,
    Error = 2,
}

impl ExchangeStatus {
    /// Merge two statuses, keeping the more severe one.
    #[inline]
    pub fn worst(self, other: ExchangeStatus) -> ExchangeStatus {
        self.max(other)
    }

    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, ExchangeStatus::Error)
    }

    /// Wire byte for the status flag.
    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte; anything unknown is treated as `Error`.
    #[inline]
    pub fn from_wire(byte: u8) -> ExchangeStatus {
        match byte {
            0 => ExchangeStatus::Ok,
            1 => ExchangeStatus::Warning,
            _ => ExchangeStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_keeps_severity() {
        use ExchangeStatus::*;
        assert_eq!(Ok.worst(Warning), Warning);
        assert_eq!(Warning.worst(Ok), Warning);
        assert_eq!(Warning.worst(Error), Error);
        assert_eq!(Ok.worst(Ok), Ok);
    }

    #[test]
    fn wire_roundtrip_and_unknown_bytes() {
        for s in [
            ExchangeStatus::Ok,
            ExchangeStatus::Warning,
            ExchangeStatus::Error,
        ] {
            assert_eq!(ExchangeStatus::from_wire(s.to_wire()), s);
        }
        assert_eq!(ExchangeStatus::from_wire(17), ExchangeStatus::Error);
    }
}
