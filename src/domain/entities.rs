//! Domain Entities - Core migration objects
//!
//! These entities describe what flows through a migration session: the
//! entries a snapshot decoder produces and the counters a session reports.
//! They have no I/O dependencies.

use bytes::Bytes;

/// One decoded snapshot entry.
///
/// Entries are handed to the translator one at a time, in snapshot order,
/// and dropped as soon as the corresponding target commands are sent.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEntry {
    /// The decoder accepted the snapshot header.
    Begin,
    /// Subsequent keys belong to this logical database.
    SelectDb(u32),
    /// A plain string value.
    Set {
        key: Bytes,
        value: Bytes,
        /// Absolute expiry, Unix milliseconds
        expire_at_ms: Option<u64>,
    },
    /// One field of a hash.
    HashField { key: Bytes, field: Bytes, value: Bytes },
    /// One member of a set.
    SetMember { key: Bytes, member: Bytes },
    /// Opens a list; elements follow until the matching [`SnapshotEntry::ListEnd`].
    ListStart {
        key: Bytes,
        len: u64,
        expire_at_ms: Option<u64>,
    },
    /// Next element of the open list.
    ListElement(Bytes),
    /// Closes the open list.
    ListEnd { key: Bytes },
    /// One member of a sorted set.
    SortedSetMember { key: Bytes, score: f64, member: Bytes },
    /// Expiry for a hash, set or sorted set whose members were already emitted.
    Expire { key: Bytes, expire_at_ms: u64 },
    /// The decoder reached the end-of-snapshot marker.
    End,
}

impl SnapshotEntry {
    /// Short name used in logs and sequencing errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::SelectDb(_) => "select",
            Self::Set { .. } => "set",
            Self::HashField { .. } => "hash-field",
            Self::SetMember { .. } => "set-member",
            Self::ListStart { .. } => "list-start",
            Self::ListElement(_) => "list-element",
            Self::ListEnd { .. } => "list-end",
            Self::SortedSetMember { .. } => "zset-member",
            Self::Expire { .. } => "expire",
            Self::End => "end",
        }
    }
}

/// Progress of one snapshot transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Entries received from the decoder
    pub entries: u64,
    /// Commands written to the target
    pub commands: u64,
    /// Bytes of command payload written to the target
    pub bytes_sent: u64,
}
