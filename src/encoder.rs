//! The top-level `Encoder`: ties the traversal stack, record builders, and
//! state machine together behind the pull-based `step`/`get_data` API
//! (§4.3, §4.5).

use std::os::fd::RawFd;

use arcwalk_format::FeatureFlags;
use log::{debug, trace, warn};

use crate::buffer::ChunkBuffer;
use crate::error::{Error, Misuse, Result};
use crate::flags::NormalizedFlags;
use crate::node::Node;
use crate::record;
use crate::stack::{LeaveResult, Stack};
use crate::state::{EncoderState, StepOutcome};

/// Streaming archive encoder. Construct with [`crate::EncoderBuilder`].
#[derive(Debug)]
pub struct Encoder {
    flags: NormalizedFlags,
    stack: Stack,
    buffer: ChunkBuffer,
    state: EncoderState,
    archive_offset: u64,
    payload_offset: u64,
    step_size: u64,
}

impl Encoder {
    pub(crate) fn new(root: Node, flags: NormalizedFlags) -> Self {
        Encoder {
            flags,
            stack: Stack::with_root(root),
            buffer: ChunkBuffer::new(),
            state: EncoderState::Init,
            archive_offset: 0,
            payload_offset: 0,
            step_size: 0,
        }
    }

    /// The normalized feature flags in effect for this archive.
    pub fn feature_flags(&self) -> FeatureFlags {
        self.flags.flags
    }

    fn enter_state(&mut self, state: EncoderState) {
        trace!(target: "arcwalk::encoder", "{:?} -> {:?}", self.state, state);
        self.state = state;
        self.buffer.clear();
        self.payload_offset = 0;
        self.step_size = 0;
    }

    /// Advances the encoder by one logical unit (§4.3).
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.state == EncoderState::Eof {
            return Ok(StepOutcome::Finished);
        }

        self.payload_offset += self.step_size;
        self.archive_offset += self.step_size;
        self.step_size = 0;

        loop {
            let outcome = if self.stack.current().stat.is_reg() || self.stack.current().stat.is_blk()
            {
                self.step_regular()?
            } else if self.stack.current().stat.is_dir() {
                self.step_directory()?
            } else {
                return Err(Misuse::WrongState("current node is not a recognized kind").into());
            };

            if outcome != StepOutcome::Finished {
                return Ok(outcome);
            }

            match self.stack.leave_child() {
                LeaveResult::WasAtRoot => break,
                LeaveResult::MovedUp => {
                    debug!(target: "arcwalk::encoder", "left child, depth now {}", self.stack.depth());
                    self.enter_state(EncoderState::PostChild);
                }
            }
        }

        self.stack.forget_children();
        self.enter_state(EncoderState::Eof);
        Ok(StepOutcome::Finished)
    }

    fn step_regular(&mut self) -> Result<StepOutcome> {
        debug_assert_eq!(self.state, EncoderState::Init);
        self.buffer.clear();
        let size = self.stack.current_mut().payload_size()?;
        if self.payload_offset >= size {
            self.enter_state(EncoderState::Eof);
            return Ok(StepOutcome::Finished);
        }
        Ok(StepOutcome::Data)
    }

    fn step_directory(&mut self) -> Result<StepOutcome> {
        self.stack.current_mut().read_dirents()?;

        match self.state {
            EncoderState::Init => {
                self.enter_state(EncoderState::Hello);
                Ok(StepOutcome::Data)
            }
            EncoderState::Entry => {
                let enterable = self
                    .stack
                    .child()
                    .map(|c| c.stat.is_dir() || c.stat.is_reg())
                    .ok_or(Misuse::WrongState("no pending child in ENTRY state"))?;
                if enterable {
                    self.stack.enter_child()?;
                    self.enter_state(EncoderState::Init);
                    return self.step();
                }
                self.advance_dirent_and_continue()
            }
            EncoderState::PostChild => self.advance_dirent_and_continue(),
            EncoderState::Hello => self.open_next_or_goodbye(),
            EncoderState::Goodbye => {
                self.enter_state(EncoderState::Eof);
                Ok(StepOutcome::Finished)
            }
            EncoderState::Eof => unreachable!("step() short-circuits before reaching Eof here"),
        }
    }

    fn advance_dirent_and_continue(&mut self) -> Result<StepOutcome> {
        self.stack.current_mut().dirent_idx += 1;
        self.open_next_or_goodbye()
    }

    fn open_next_or_goodbye(&mut self) -> Result<StepOutcome> {
        let name = self.stack.current().current_dirent().cloned();
        match name {
            None => {
                self.enter_state(EncoderState::Goodbye);
                Ok(StepOutcome::Data)
            }
            Some(name) => {
                self.stack.open_child(&name)?;
                self.enter_state(EncoderState::Entry);
                Ok(StepOutcome::NextFile)
            }
        }
    }

    /// Fills (if not already filled) and returns the bytes of the current chunk.
    pub fn get_data(&mut self) -> Result<&[u8]> {
        if self.stack.current().stat.is_reg() || self.stack.current().stat.is_blk() {
            if self.state != EncoderState::Init {
                return Err(Misuse::WrongState("get_data on regular/block node outside INIT").into());
            }
            if self.buffer.is_empty() {
                let fd = self.current_fd()?;
                let size = self.stack.current_mut().payload_size()?;
                let read = record::build_payload_chunk(&mut self.buffer, fd, self.payload_offset, size);
                if let Err(e) = read {
                    self.buffer.clear();
                    warn!(target: "arcwalk::encoder", "payload read failed at offset {}: {e}", self.payload_offset);
                    return Err(e);
                }
            }
        } else if self.stack.current().stat.is_dir() {
            match self.state {
                EncoderState::Hello => {
                    if self.buffer.is_empty() {
                        record::build_hello(&mut self.buffer, self.flags.flags);
                    }
                }
                EncoderState::Entry => {
                    if self.buffer.is_empty() {
                        self.fill_entry()?;
                    }
                }
                EncoderState::Goodbye => {
                    if self.buffer.is_empty() {
                        record::build_goodbye(&mut self.buffer);
                    }
                }
                _ => {
                    return Err(Misuse::WrongState("get_data on directory node outside HELLO/ENTRY/GOODBYE").into());
                }
            }
        } else {
            return Err(Misuse::WrongState("current node is not a recognized kind").into());
        }

        self.step_size = self.buffer.len() as u64;
        Ok(self.buffer.as_slice())
    }

    fn fill_entry(&mut self) -> Result<()> {
        let name = self
            .stack
            .current()
            .current_dirent()
            .cloned()
            .ok_or(Misuse::WrongState("no current dirent in ENTRY state"))?;
        // Detach the buffer temporarily to satisfy the borrow checker: the
        // builder needs `&Node` (the child) while also writing into
        // `self.buffer`, and both live on `self`.
        let mut buffer = std::mem::take(&mut self.buffer);
        let result = (|| {
            let child = self
                .stack
                .child()
                .ok_or(Misuse::WrongState("no pending child in ENTRY state"))?;
            record::build_entry(&mut buffer, child, &name, self.flags.flags, self.flags.time_granularity)
        })();
        self.buffer = buffer;
        if let Err(e) = &result {
            self.buffer.clear();
            warn!(target: "arcwalk::encoder", "entry rejected for {:?}: {e}", name);
        }
        result
    }

    fn current_fd(&self) -> Result<RawFd> {
        self.stack
            .current()
            .fd
            .raw()
            .ok_or(Error::from(Misuse::WrongState("current node has no descriptor")))
    }

    /// Concatenated path of the currently open directory components (§4.5).
    pub fn current_path(&self) -> Result<String> {
        self.stack.current_path()
    }

    /// Mode of the pending child if present, else of the current node (§4.5).
    pub fn current_mode(&self) -> u64 {
        let stat = match self.stack.child() {
            Some(child) => &child.stat,
            None => &self.stack.current().stat,
        };
        record::masked_mode(stat, self.flags.flags)
    }

    /// Offset within the current regular-file/block-device payload.
    pub fn current_payload_offset(&self) -> Result<u64> {
        if self.stack.current().stat.is_reg() || self.stack.current().stat.is_blk() {
            Ok(self.payload_offset)
        } else {
            Err(Misuse::WrongState("current_payload_offset on a non-payload node").into())
        }
    }

    /// Total bytes successfully handed back to the caller so far.
    pub fn current_archive_offset(&self) -> u64 {
        self.archive_offset
    }
}
