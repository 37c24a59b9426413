use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Poll document persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollEntity {
    /// Short public token of the poll.
    pub id: String,
    /// Question asked to voters.
    pub question: String,
    /// Options in display order.
    pub options: Vec<PollOptionEntity>,
    /// Every voter's current selection.
    pub voters: Vec<VoterEntity>,
    /// Optimistic concurrency token, bumped on each accepted change.
    pub revision: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// Option of a persisted poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollOptionEntity {
    /// Identifier unique within the poll.
    pub id: String,
    /// Display text.
    pub text: String,
    /// Count derived from `voters` at save time. Never read back as a source of truth.
    pub vote_count: u64,
}

/// Voter record stored alongside its poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoterEntity {
    /// Lower-cased identity.
    pub identity: String,
    /// Name as typed by the voter.
    pub display_name: String,
    /// Selected option.
    pub option_id: String,
    /// Last time the selection changed.
    pub voted_at: SystemTime,
}
