//! Traversal stack: init/open/enter/leave/forget-child (§4.2).

use std::ffi::OsString;

use crate::error::{Error, Misuse};
use crate::node::{self, Node, NodeFd, Stat};

/// Bound on traversal depth, matching the original core's fixed-capacity
/// node array. Exceeding it is a [`crate::error::Error::Capacity`] error.
pub(crate) const NODES_MAX: usize = 256;

/// Whether `leave_child` moved the cursor up a level or was already at the root.
pub(crate) enum LeaveResult {
    MovedUp,
    WasAtRoot,
}

/// The encoder's fixed-capacity stack of open filesystem objects.
#[derive(Debug)]
pub(crate) struct Stack {
    nodes: Vec<Node>,
    node_idx: usize,
}

impl Stack {
    pub(crate) fn with_root(root: Node) -> Self {
        Stack {
            nodes: vec![root],
            node_idx: 0,
        }
    }

    pub(crate) fn current(&self) -> &Node {
        &self.nodes[self.node_idx]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Node {
        &mut self.nodes[self.node_idx]
    }

    pub(crate) fn child(&self) -> Option<&Node> {
        self.nodes.get(self.node_idx + 1)
    }

    pub(crate) fn depth(&self) -> usize {
        self.node_idx
    }

    /// Concatenates the current-dirent names from the root down to and
    /// including the current node with `/` separators (§4.5), stopping at
    /// the first depth with no entry opened. Fails only if nothing was
    /// collected (i.e. the root itself has no current dirent yet).
    pub(crate) fn current_path(&self) -> Result<String, Error> {
        let mut parts = Vec::with_capacity(self.node_idx + 1);
        for node in &self.nodes[0..=self.node_idx] {
            match node.current_dirent() {
                Some(de) => parts.push(de.to_string_lossy().into_owned()),
                None => break,
            }
        }
        if parts.is_empty() {
            return Err(Misuse::WrongState("no entry opened at the root").into());
        }
        Ok(parts.join("/"))
    }

    /// Destroys and frees any stack entries above the current node.
    pub(crate) fn forget_children(&mut self) {
        self.nodes.truncate(self.node_idx + 1);
    }

    /// Reserves `nodes[n]` for a pending child, first discarding any stale
    /// children left over from a previous sibling.
    pub(crate) fn init_child(&mut self) -> Result<(), Error> {
        self.forget_children();
        if self.nodes.len() >= NODES_MAX {
            return Err(Error::Capacity);
        }
        self.nodes.push(Node::empty());
        Ok(())
    }

    /// Opens the named entry under the current directory node.
    pub(crate) fn open_child(&mut self, name: &OsString) -> Result<(), Error> {
        let dir_fd = self
            .current()
            .fd
            .raw()
            .expect("directory node always has an fd");

        self.init_child()?;

        // Regular files and directories are always opened directly; every
        // other kind is fstatat-ed first and only opened if it turns out to
        // be one of those two kinds after all (§4.2).
        let probe = node::fstatat_child(dir_fd, name)?;
        let probe_stat = Stat::from(probe);
        let is_dir = probe_stat.is_dir();
        let shall_open = is_dir || probe_stat.is_reg();

        let child_idx = self.node_idx + 1;
        if shall_open {
            let fd = node::openat_child(dir_fd, name, is_dir)?;
            self.nodes[child_idx].fd = NodeFd::Owned(fd);
            let st = nix::sys::stat::fstat(fd)?;
            self.nodes[child_idx].stat = Stat::from(st);
        } else {
            self.nodes[child_idx].stat = probe_stat;
        }

        if self.nodes[child_idx].stat.is_lnk() {
            let target = node::read_symlink_target(dir_fd, name)?;
            self.nodes[child_idx].symlink_target = Some(target);
        }

        Ok(())
    }

    /// Advances into the pending child. Only permitted for a regular file or
    /// directory with a valid descriptor.
    pub(crate) fn enter_child(&mut self) -> Result<(), Error> {
        let child_idx = self.node_idx + 1;
        let child = self
            .nodes
            .get(child_idx)
            .ok_or(Misuse::WrongState("no pending child"))?;
        if !node::mode_is_enterable(child.stat.mode) {
            return Err(Misuse::WrongState("pending child is not enterable").into());
        }
        if child.fd.raw().is_none() {
            return Err(Misuse::WrongState("pending child has no descriptor").into());
        }
        self.node_idx = child_idx;
        Ok(())
    }

    /// Moves the cursor up one level, if not already at the root.
    pub(crate) fn leave_child(&mut self) -> LeaveResult {
        if self.node_idx == 0 {
            return LeaveResult::WasAtRoot;
        }
        self.node_idx -= 1;
        LeaveResult::MovedUp
    }
}
