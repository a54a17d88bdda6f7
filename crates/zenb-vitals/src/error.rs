//! Error taxonomy for the vitals pipeline.
//!
//! Only conditions a caller can act on are errors. Too few samples or peaks is
//! reported as an absent measurement, and implausible values are reported as
//! [`crate::measurement::Anomaly`] events; neither appears here.

use thiserror::Error;

use crate::buffer::ChannelKind;
use crate::session::SessionState;

pub use crate::config::ConfigError;

/// A capture channel could not be opened.
///
/// Fatal to the affected channel only; other channels keep working.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("{0:?} channel unavailable: {1}")]
    Unavailable(ChannelKind, String),
    #[error("permission denied for {0:?} channel")]
    PermissionDenied(ChannelKind),
    #[error("{0:?} channel is already open")]
    AlreadyOpen(ChannelKind),
}

impl AcquisitionError {
    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::Unavailable(kind, _) | Self::PermissionDenied(kind) | Self::AlreadyOpen(kind) => {
                *kind
            }
        }
    }
}

/// Invalid session lifecycle transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot start monitoring without at least one open channel")]
    NoChannels,
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("session already stopped")]
    Stopped,
    #[error("monitoring worker failed to start: {0}")]
    Worker(String),
}

/// Umbrella error for callers that do not care which stage failed.
#[derive(Error, Debug)]
pub enum VitalsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type Result<T, E = VitalsError> = std::result::Result<T, E>;
