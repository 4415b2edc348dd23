//! Construction surface for [`Encoder`] (§9a).

use std::os::fd::{AsRawFd, BorrowedFd, IntoRawFd, OwnedFd};
use std::path::Path;

use arcwalk_format::FeatureFlags;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::encoder::Encoder;
use crate::error::{InputKind, Misuse, Result};
use crate::flags;
use crate::node::{Node, NodeFd, Stat};

/// The root the encoder walks or reads: a caller-held descriptor, an owned
/// descriptor the builder takes ownership of, or a filesystem path the
/// builder opens itself.
#[derive(Debug)]
pub enum BaseInput<'fd> {
    /// A descriptor the caller keeps ownership of.
    Borrowed(BorrowedFd<'fd>),
    /// A descriptor whose ownership transfers to the encoder.
    Owned(OwnedFd),
    /// A path the builder opens with `O_RDONLY|O_CLOEXEC|O_NOCTTY`.
    Path(&'fd Path),
}

/// Builds an [`Encoder`]. See the crate-level docs for the lifecycle.
#[derive(Debug, Default)]
pub struct EncoderBuilder<'fd> {
    flags: Option<FeatureFlags>,
    base: Option<BaseInput<'fd>>,
}

impl<'fd> EncoderBuilder<'fd> {
    /// Starts a builder with no feature flags and no base set.
    pub fn new() -> Self {
        EncoderBuilder {
            flags: None,
            base: None,
        }
    }

    /// Sets the requested feature-flag mask. One-shot.
    pub fn feature_flags(mut self, flags: FeatureFlags) -> Result<Self> {
        if self.flags.is_some() {
            return Err(Misuse::FlagsAlreadySet.into());
        }
        self.flags = Some(flags);
        Ok(self)
    }

    /// Sets the root input. One-shot.
    pub fn base(mut self, base: BaseInput<'fd>) -> Result<Self> {
        if self.base.is_some() {
            return Err(Misuse::BaseAlreadySet.into());
        }
        self.base = Some(base);
        Ok(self)
    }

    /// Validates the root kind, normalizes feature flags, and returns an
    /// `Encoder` positioned at `INIT`.
    pub fn build(self) -> Result<Encoder> {
        let normalized = flags::normalize(self.flags.unwrap_or(FeatureFlags::WITH_BEST))?;
        let base = self.base.ok_or(Misuse::BaseNotSet)?;

        let root = match base {
            BaseInput::Borrowed(fd) => Node::from_borrowed_root(fd.as_raw_fd())?,
            BaseInput::Owned(fd) => {
                let raw = fd.into_raw_fd();
                let mut node = Node::from_borrowed_root(raw)?;
                node.fd = NodeFd::Owned(raw);
                node
            }
            BaseInput::Path(path) => {
                let flags = OFlag::O_RDONLY | OFlag::O_CLOEXEC | OFlag::O_NOCTTY;
                let owned = nix::fcntl::open(path, flags, Mode::empty())?;
                let raw = owned.into_raw_fd();
                let mut node = Node::from_borrowed_root(raw)?;
                node.fd = NodeFd::Owned(raw);
                node
            }
        };

        validate_root_kind(&root.stat)?;

        Ok(Encoder::new(root, normalized))
    }
}

fn validate_root_kind(stat: &Stat) -> Result<()> {
    if stat.is_dir() || stat.is_reg() || stat.is_blk() {
        Ok(())
    } else {
        Err(InputKind::UnsupportedRoot.into())
    }
}
