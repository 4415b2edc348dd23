//! On-disk record layout for the arcwalk archive format.
//!
//! Defines the little-endian, unaligned-trailer record layouts an encoder
//! (and, eventually, a decoder) reads and writes, plus the feature-flag
//! registry that controls which metadata a given archive carries. This
//! crate has no filesystem-walking logic of its own: it is the wire
//! contract shared by anything that produces or consumes an archive.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

use bitflags::bitflags;
use zerocopy::{Immutable, IntoBytes, KnownLayout};

/// Every record in the archive begins with this 16-byte header.
///
/// `size` counts the header itself plus the body that follows it.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct RecordHeader {
    /// One of the `RECORD_*` constants.
    pub record_type: u64,
    /// Header + body, in bytes.
    pub size: u64,
}

impl RecordHeader {
    /// Size of the header itself, in bytes.
    pub const SIZE: u64 = size_of::<RecordHeader>() as u64;

    /// Builds a header for a record of the given type and total size.
    pub fn new(record_type: u64, size: u64) -> Self {
        RecordHeader { record_type, size }
    }
}

/// Opens a directory's content and precedes the first Entry.
pub const RECORD_HELLO: u64 = 0x8b_9e_09_e9_1e_0c_4a_05;
/// One filesystem object (file, directory, symlink, device, fifo, socket).
pub const RECORD_ENTRY: u64 = 0x1c_40_6e_27_fb_b0_4c_9d;
/// Trailer on a regular file's Entry; precedes the raw file bytes.
pub const RECORD_PAYLOAD: u64 = 0x90_86_6c_93_3c_17_43_5d;
/// Trailer on a symlink's Entry; carries the link target text.
pub const RECORD_SYMLINK: u64 = 0x66_4a_89_e8_0b_4b_4a_39;
/// Trailer on a block/character device's Entry; carries major/minor.
pub const RECORD_DEVICE: u64 = 0x9a_6b_6a_21_9a_7b_4d_b3;
/// Closes a directory's content; carries the (degenerate) lookup table.
pub const RECORD_GOODBYE: u64 = 0x96_87_86_29_c4_8e_44_b5;

/// Fixed second half of the format UUID, stamped into every Hello record.
pub const HELLO_UUID_PART2: u64 = 0x29_a3_2c_f4_5e_53_4b_0c;

/// Fixed-size record that opens a directory's content.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct HelloRecord {
    /// `{ type: RECORD_HELLO, size: size_of::<HelloRecord>() }`
    pub header: RecordHeader,
    /// Fixed format identifier; always [`HELLO_UUID_PART2`].
    pub uuid_part2: u64,
    /// Normalized [`FeatureFlags`] in effect for this archive.
    pub feature_flags: u64,
}

impl HelloRecord {
    /// Builds a Hello record for the given normalized feature flags.
    pub fn new(feature_flags: FeatureFlags) -> Self {
        HelloRecord {
            header: RecordHeader::new(RECORD_HELLO, size_of::<HelloRecord>() as u64),
            uuid_part2: HELLO_UUID_PART2,
            feature_flags: feature_flags.bits(),
        }
    }
}

/// Fixed prefix of an Entry record. The variable-length name (and, for
/// non-directory children, a trailer record) immediately follow in the
/// buffer, unaligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct EntryRecordPrefix {
    /// `record_type = RECORD_ENTRY`; `size` covers only header+mode/uid/gid/mtime+name.
    pub header: RecordHeader,
    /// Masked/normalized mode bits (see the mode-masking rules in the crate docs).
    pub mode: u64,
    /// Owner uid, or 0 if uid/gid flags are unset.
    pub uid: u64,
    /// Owner gid, or 0 if uid/gid flags are unset.
    pub gid: u64,
    /// Quantized nanoseconds-since-epoch modification time.
    pub mtime: u64,
}

impl EntryRecordPrefix {
    /// Size of this fixed prefix, not counting the trailing name.
    pub const SIZE: u64 = size_of::<EntryRecordPrefix>() as u64;
}

/// Trailer on a regular file's Entry record.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct PayloadHeader {
    /// `record_type = RECORD_PAYLOAD`; `size` covers header + file bytes.
    pub header: RecordHeader,
}

impl PayloadHeader {
    /// Size of this header, not counting the payload bytes that follow.
    pub const SIZE: u64 = size_of::<PayloadHeader>() as u64;

    /// Builds a header for a payload of `data_len` bytes.
    pub fn new(data_len: u64) -> Self {
        PayloadHeader {
            header: RecordHeader::new(RECORD_PAYLOAD, Self::SIZE + data_len),
        }
    }
}

/// Fixed prefix of a symlink's trailer record; the null-terminated target
/// text immediately follows, unaligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct SymlinkHeader {
    /// `record_type = RECORD_SYMLINK`; `size` covers header + target text.
    pub header: RecordHeader,
}

impl SymlinkHeader {
    /// Size of this header, not counting the target text that follows.
    pub const SIZE: u64 = size_of::<SymlinkHeader>() as u64;

    /// Builds a header for a target of `target_len` bytes (including the NUL).
    pub fn new(target_len: u64) -> Self {
        SymlinkHeader {
            header: RecordHeader::new(RECORD_SYMLINK, Self::SIZE + target_len),
        }
    }
}

/// Trailer on a block/character device's Entry record.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct DeviceRecord {
    /// `record_type = RECORD_DEVICE`; `size = size_of::<DeviceRecord>()`.
    pub header: RecordHeader,
    /// Device major number.
    pub major: u64,
    /// Device minor number.
    pub minor: u64,
}

impl DeviceRecord {
    /// Builds a device record for the given major/minor numbers.
    pub fn new(major: u64, minor: u64) -> Self {
        DeviceRecord {
            header: RecordHeader::new(RECORD_DEVICE, size_of::<DeviceRecord>() as u64),
            major,
            minor,
        }
    }
}

/// Closes a directory's content.
///
/// This crate always writes the degenerate one-entry form: a single `u64`
/// table entry equal to the Goodbye record's own size, preserved for wire
/// compatibility with decoders that expect a lookup table.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, KnownLayout, Immutable)]
pub struct GoodbyeRecord {
    /// `record_type = RECORD_GOODBYE`; `size = size_of::<GoodbyeRecord>()`.
    pub header: RecordHeader,
    /// Degenerate one-entry table: equal to `header.size`.
    pub table_entry: u64,
}

impl GoodbyeRecord {
    /// Builds the degenerate single-entry Goodbye record.
    pub fn new() -> Self {
        let size = size_of::<GoodbyeRecord>() as u64;
        GoodbyeRecord {
            header: RecordHeader::new(RECORD_GOODBYE, size),
            table_entry: size,
        }
    }
}

impl Default for GoodbyeRecord {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    /// Caller-selected bitmask controlling which metadata is recorded, at
    /// what resolution, and which filesystem-object kinds are permitted.
    ///
    /// See the normalization rules documented on `arcwalk::FeatureFlags`
    /// (the wrapper re-exported from the encoder crate) for how a
    /// requested mask is canonicalized before being stamped into a Hello
    /// record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u64 {
        /// Store uid/gid, rejecting values above `u16::MAX`.
        const WITH_UID_GID_16BIT = 1 << 0;
        /// Store uid/gid as full 32-bit values.
        const WITH_UID_GID_32BIT = 1 << 1;
        /// Quantize mtime to whole nanoseconds (i.e. don't quantize).
        const WITH_TIMES_NSEC = 1 << 2;
        /// Quantize mtime to whole microseconds.
        const WITH_TIMES_USEC = 1 << 3;
        /// Quantize mtime to whole seconds.
        const WITH_TIMES_SEC = 1 << 4;
        /// Quantize mtime to whole two-second intervals (FAT-style).
        const WITH_TIMES_2SEC = 1 << 5;
        /// Store full S_IFMT|07777 permission bits.
        const WITH_PERMISSIONS = 1 << 6;
        /// Store only a synthesized writable/readonly bit.
        const WITH_READONLY = 1 << 7;
        /// Permit symlink children (reject them otherwise).
        const WITH_SYMLINKS = 1 << 8;
        /// Permit block/character device children (reject them otherwise).
        const WITH_DEVICE_NODES = 1 << 9;
        /// Permit FIFO children (reject them otherwise).
        const WITH_FIFOS = 1 << 10;
        /// Permit Unix domain socket children (reject them otherwise).
        const WITH_SOCKETS = 1 << 11;
    }
}

impl FeatureFlags {
    /// The convenience superset used as the default when no flags are given:
    /// full permissions, all file-type gates open, 32-bit uid/gid, and
    /// nanosecond mtimes.
    pub const WITH_BEST: FeatureFlags = FeatureFlags::WITH_PERMISSIONS
        .union(FeatureFlags::WITH_SYMLINKS)
        .union(FeatureFlags::WITH_DEVICE_NODES)
        .union(FeatureFlags::WITH_FIFOS)
        .union(FeatureFlags::WITH_SOCKETS)
        .union(FeatureFlags::WITH_UID_GID_32BIT)
        .union(FeatureFlags::WITH_TIMES_NSEC);

    /// The widest mask any implementation of this format revision accepts.
    /// Requesting a bit outside this mask is rejected at setup.
    pub const FEATURE_FLAGS_MAX: FeatureFlags = FeatureFlags::all();
}

/// Quantization granularity in nanoseconds, one per time-resolution flag.
pub const GRANULARITY_NSEC: u64 = 1;
/// Quantization granularity in nanoseconds for `WITH_TIMES_USEC`.
pub const GRANULARITY_USEC: u64 = 1_000;
/// Quantization granularity in nanoseconds for `WITH_TIMES_SEC`.
pub const GRANULARITY_SEC: u64 = 1_000_000_000;
/// Quantization granularity in nanoseconds for `WITH_TIMES_2SEC`.
pub const GRANULARITY_2SEC: u64 = 2_000_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_sixteen_bytes() {
        assert_eq!(size_of::<RecordHeader>(), 16);
        assert_eq!(RecordHeader::SIZE, 16);
    }

    #[test]
    fn hello_record_is_header_plus_two_u64() {
        assert_eq!(size_of::<HelloRecord>(), 32);
        let h = HelloRecord::new(FeatureFlags::empty());
        assert_eq!(h.header.record_type, RECORD_HELLO);
        assert_eq!(h.header.size, 32);
        assert_eq!(h.uuid_part2, HELLO_UUID_PART2);
    }

    #[test]
    fn goodbye_record_table_entry_equals_its_own_size() {
        let g = GoodbyeRecord::new();
        assert_eq!(g.table_entry, g.header.size);
        assert_eq!(g.header.size, 24);
    }

    #[test]
    fn with_best_is_the_full_type_gate_superset() {
        let best = FeatureFlags::WITH_BEST;
        assert!(best.contains(FeatureFlags::WITH_SYMLINKS));
        assert!(best.contains(FeatureFlags::WITH_DEVICE_NODES));
        assert!(best.contains(FeatureFlags::WITH_FIFOS));
        assert!(best.contains(FeatureFlags::WITH_SOCKETS));
        assert!(best.contains(FeatureFlags::WITH_UID_GID_32BIT));
        assert!(best.contains(FeatureFlags::WITH_TIMES_NSEC));
        assert!(!best.contains(FeatureFlags::WITH_UID_GID_16BIT));
        assert!(!best.contains(FeatureFlags::WITH_READONLY));
    }

    #[test]
    fn feature_flags_max_covers_every_defined_bit() {
        assert_eq!(
            FeatureFlags::FEATURE_FLAGS_MAX,
            FeatureFlags::WITH_UID_GID_16BIT
                | FeatureFlags::WITH_UID_GID_32BIT
                | FeatureFlags::WITH_TIMES_NSEC
                | FeatureFlags::WITH_TIMES_USEC
                | FeatureFlags::WITH_TIMES_SEC
                | FeatureFlags::WITH_TIMES_2SEC
                | FeatureFlags::WITH_PERMISSIONS
                | FeatureFlags::WITH_READONLY
                | FeatureFlags::WITH_SYMLINKS
                | FeatureFlags::WITH_DEVICE_NODES
                | FeatureFlags::WITH_FIFOS
                | FeatureFlags::WITH_SOCKETS
        );
    }
}
