//! Errors produced while building or driving an [`crate::Encoder`].

use std::{error, fmt, io};

/// Misuse of the encoder API, independent of any filesystem state.
#[derive(Debug)]
pub enum Misuse {
    /// `EncoderBuilder::feature_flags` was called more than once.
    FlagsAlreadySet,
    /// `EncoderBuilder::base` was called more than once.
    BaseAlreadySet,
    /// `EncoderBuilder::build` was called without a base having been set.
    BaseNotSet,
    /// An API call was made that doesn't apply to the encoder's current state
    /// (e.g. a query that's only valid on a regular-file/block-device node).
    WrongState(&'static str),
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Misuse::FlagsAlreadySet => write!(f, "feature flags were already set"),
            Misuse::BaseAlreadySet => write!(f, "base descriptor was already set"),
            Misuse::BaseNotSet => write!(f, "no base descriptor was set"),
            Misuse::WrongState(what) => write!(f, "not valid in the current state: {what}"),
        }
    }
}

/// Why a requested input (root or child) was rejected.
#[derive(Debug)]
pub enum InputKind {
    /// The root was not a regular file, directory, or block device.
    UnsupportedRoot,
    /// A child is a symlink/device/fifo/socket but its feature flag is off.
    ProtocolUnsupported(&'static str),
    /// `uid` or `gid` exceeded the width selected by the feature flags.
    WidthExceeded,
    /// `uid` or `gid` equaled a reserved "nobody" sentinel (`u16::MAX` or `u32::MAX`).
    ReservedId,
    /// A requested feature-flag bit is outside `FEATURE_FLAGS_MAX`.
    UnknownFlag,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::UnsupportedRoot => {
                write!(f, "root is not a regular file, directory, or block device")
            }
            InputKind::ProtocolUnsupported(kind) => {
                write!(f, "protocol unsupported: {kind} entries are disabled")
            }
            InputKind::WidthExceeded => write!(f, "uid or gid exceeds the selected width"),
            InputKind::ReservedId => write!(f, "uid or gid is a reserved sentinel value"),
            InputKind::UnknownFlag => write!(f, "unsupported feature flag bit requested"),
        }
    }
}

/// Errors returned by [`crate::EncoderBuilder`] and [`crate::Encoder`].
#[derive(Debug)]
pub enum Error {
    /// API misuse (see [`Misuse`]).
    Misuse(Misuse),
    /// The traversal stack's depth limit was exceeded.
    Capacity,
    /// The root or a child was rejected (see [`InputKind`]).
    InputKind(InputKind),
    /// An underlying filesystem operation failed.
    Io(io::Error),
    /// Allocation failure while acquiring a buffer.
    Resource,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Misuse(m) => write!(f, "misuse: {m}"),
            Error::Capacity => write!(f, "traversal depth limit exceeded"),
            Error::InputKind(k) => write!(f, "{k}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Resource => write!(f, "out of memory"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Error::Io(io::Error::from_raw_os_error(e as i32))
    }
}

impl From<Misuse> for Error {
    fn from(m: Misuse) -> Self {
        Error::Misuse(m)
    }
}

impl From<InputKind> for Error {
    fn from(k: InputKind) -> Self {
        Error::InputKind(k)
    }
}

/// A specialized [`Result`] for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
