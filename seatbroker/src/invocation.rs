//! Invocation identity and liveness tracking.

use chrono::{DateTime, Utc};

/// Sequence number assigned to an entry while it is queued. 0 means
/// "not queued". Within one queue, live entries hold contiguous ascending
/// sequence numbers, which is what makes position lookups O(1).
pub(crate) type QueueSeq = u64;

/// 1-based rank of a queued invocation within its pool's queue.
/// 0 means "not queued".
pub type Position = u64;

/// One client's logical request for a license seat.
///
/// Created on the first `Allocate` contact with a server-issued id; the
/// client carries that id through every subsequent poll. An invocation lives
/// in at most one of {queue, allocations} of a pool at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Server-generated unique id.
    pub id: String,
    /// Client-provided logical owner; consulted only by fairness policies.
    pub owner: String,
    /// Client-provided build tag. Not interpreted; carried for observability.
    pub build_tag: String,
    /// Time this invocation last had its queue spot or allocation refreshed.
    pub last_checkin: DateTime<Utc>,
    /// Queue sequence number, meaningful only while queued.
    pub(crate) queue_seq: QueueSeq,
}

impl Invocation {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        build_tag: impl Into<String>,
        last_checkin: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            build_tag: build_tag.into(),
            last_checkin,
            queue_seq: 0,
        }
    }
}
