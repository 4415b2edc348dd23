//! Streaming, pull-based archive encoder for POSIX filesystem trees.
//!
//! An [`Encoder`] walks a directory subtree (or reads a single regular file
//! or block device) and emits a deterministic, byte-exact binary archive:
//! callers drive it with [`Encoder::step`] and pull the next chunk with
//! [`Encoder::get_data`]. No full-archive buffering ever happens — at most
//! one chunk is materialized at a time.
//!
//! Construction goes through [`EncoderBuilder`]:
//!
//! ```no_run
//! use std::path::Path;
//! use arcwalk::{BaseInput, EncoderBuilder, StepOutcome};
//!
//! # fn run() -> arcwalk::Result<()> {
//! let mut encoder = EncoderBuilder::new()
//!     .base(BaseInput::Path(Path::new(".")))?
//!     .build()?;
//!
//! loop {
//!     match encoder.step()? {
//!         StepOutcome::Finished => break,
//!         _ => {
//!             let _chunk = encoder.get_data()?;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod builder;
mod buffer;
mod encoder;
mod error;
mod flags;
mod node;
mod record;
mod stack;
mod state;
mod time;

/// Caller-selected bitmask controlling which metadata is recorded; see
/// [`arcwalk_format::FeatureFlags`] for the full set and its normalization
/// rules.
pub use arcwalk_format::FeatureFlags;
pub use builder::{BaseInput, EncoderBuilder};
pub use encoder::Encoder;
pub use error::{Error, InputKind, Misuse, Result};
pub use state::StepOutcome;
