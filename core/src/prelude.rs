use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dpif::config::Direction;

/// Caller-visible buffers and scratch regions named in validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    DetMatrix,
    HwaMemInput,
    HwaMemOutDoppler,
    HwaMemOutRange,
    DopplerBitMask,
    DetectionList,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::DetMatrix => "detection matrix",
            Region::HwaMemInput => "accelerator input scratch",
            Region::HwaMemOutDoppler => "accelerator Doppler output scratch",
            Region::HwaMemOutRange => "accelerator range output scratch",
            Region::DopplerBitMask => "Doppler detection bitmask",
            Region::DetectionList => "detection list",
        };
        f.write_str(name)
    }
}

/// Error taxonomy shared by every stage of the CFAR unit.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CfarError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported detection matrix format: {0}")]
    InvalidFormat(String),
    #[error("invalid number of accelerator param sets: {requested} (supported {supported})")]
    InvalidParamSetCount { requested: usize, supported: usize },
    #[error("{first} and {second} share an accelerator memory bank")]
    BankConflict { first: Region, second: Region },
    #[error("insufficient memory for {region}: need {required} bytes, have {available}")]
    InsufficientMemory {
        region: Region,
        required: usize,
        available: usize,
    },
    #[error("{region} at 0x{address:x} is not aligned to {alignment} bytes")]
    MisalignedBuffer {
        region: Region,
        address: usize,
        alignment: usize,
    },
    #[error("internal failure: {0}")]
    Internal(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("transfer on channel {channel} did not complete within {timeout_ms} ms")]
    TransferTimeout { channel: u8, timeout_ms: u64 },
    #[error("{direction} pass did not complete within {timeout_ms} ms")]
    PassTimeout { direction: Direction, timeout_ms: u64 },
}

impl CfarError {
    /// Legacy status code; distinct per violated invariant.
    pub fn code(&self) -> i32 {
        match self {
            CfarError::InvalidArgument(_) => -1,
            CfarError::InvalidFormat(_) => -2,
            CfarError::InvalidParamSetCount { .. } => -3,
            CfarError::BankConflict { .. } => -4,
            CfarError::InsufficientMemory { region, .. } => match region {
                Region::DetMatrix | Region::HwaMemInput => -11,
                Region::DopplerBitMask => -16,
                Region::HwaMemOutDoppler => -18,
                Region::HwaMemOutRange => -19,
                Region::DetectionList => -21,
            },
            CfarError::MisalignedBuffer { region, .. } => match region {
                Region::DetMatrix | Region::HwaMemInput => -12,
                Region::DetectionList => -13,
                Region::HwaMemOutDoppler => -14,
                Region::HwaMemOutRange => -15,
                Region::DopplerBitMask => -17,
            },
            CfarError::Internal(_) => -20,
            CfarError::NotImplemented(_) => -30,
            CfarError::TransferTimeout { .. } => -40,
            CfarError::PassTimeout { .. } => -41,
        }
    }

    /// Timeouts fail the frame only; the session stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CfarError::TransferTimeout { .. } | CfarError::PassTimeout { .. }
        )
    }

    /// Errors after which the handle must be deinitialized.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CfarError::Internal(_))
    }
}

pub type CfarResult<T> = Result<T, CfarError>;
