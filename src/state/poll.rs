//! In-memory working copy of a poll: options, voter records and derived counts.
//!
//! Counts are never edited directly; they are recomputed from the voter records
//! after every change and whenever a poll is loaded from storage.

use std::time::SystemTime;

use indexmap::IndexMap;
use rand::Rng;

use crate::dao::models::{PollEntity, PollOptionEntity, VoterEntity};
use crate::state::identity::VoterIdentity;

/// Length of generated poll and option identifiers.
pub const ID_LENGTH: usize = 10;
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generate a short URL-safe identifier.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Runtime working copy of a poll and its voter ledger.
#[derive(Debug, Clone)]
pub struct Poll {
    /// Short token shared in the poll link.
    pub id: String,
    /// Question shown above the options.
    pub question: String,
    /// Options in display order.
    pub options: Vec<PollOption>,
    /// Current selection of every voter, keyed by normalized identity.
    pub voters: IndexMap<String, VoterRecord>,
    /// Incremented on every accepted change.
    pub revision: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// One answer of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    /// Identifier unique within the poll.
    pub id: String,
    /// Text shown to voters.
    pub text: String,
    /// Number of voter records selecting this option. Derived, see [`Poll::recount`].
    pub vote_count: u64,
}

/// A voter's current choice in one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterRecord {
    /// Name as typed by the voter.
    pub display_name: String,
    /// Selected option.
    pub option_id: String,
    /// Last time the selection changed.
    pub voted_at: SystemTime,
}

/// Effect of [`Poll::record_vote`] on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteChange {
    /// The voter already selected this option; nothing changed.
    Unchanged,
    /// First vote of this identity in the poll.
    Cast,
    /// The voter moved away from `from`.
    Switched {
        /// Option previously selected.
        from: String,
    },
}

impl VoteChange {
    /// Whether the ledger was mutated.
    pub fn is_change(&self) -> bool {
        !matches!(self, VoteChange::Unchanged)
    }
}

/// Vote counts of a poll at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    /// Poll the counts belong to.
    pub poll_id: String,
    /// Poll question.
    pub question: String,
    /// Revision the counts were taken at.
    pub revision: u64,
    /// Counts in display order.
    pub options: Vec<OptionTally>,
    /// Number of distinct voters.
    pub total_voters: u64,
}

/// Count for a single option inside a [`TallySnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTally {
    /// Option identifier.
    pub option_id: String,
    /// Option text.
    pub text: String,
    /// Number of voters currently selecting the option.
    pub vote_count: u64,
}

impl TallySnapshot {
    /// Count for `option_id`, if the option exists.
    pub fn count(&self, option_id: &str) -> Option<u64> {
        self.options
            .iter()
            .find(|option| option.option_id == option_id)
            .map(|option| option.vote_count)
    }
}

impl Poll {
    /// Build a new poll with freshly generated identifiers and no votes.
    pub fn new(question: String, option_texts: Vec<String>) -> Self {
        let mut options: Vec<PollOption> = Vec::with_capacity(option_texts.len());
        for text in option_texts {
            let mut id = generate_id();
            while options.iter().any(|existing| existing.id == id) {
                id = generate_id();
            }
            options.push(PollOption {
                id,
                text,
                vote_count: 0,
            });
        }

        Self {
            id: generate_id(),
            question,
            options,
            voters: IndexMap::new(),
            revision: 0,
            created_at: SystemTime::now(),
        }
    }

    /// Look up an option by identifier.
    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    /// Point `identity` at `option_id`, replacing any previous selection.
    ///
    /// The caller must have checked that the option exists. Counts are recomputed
    /// and the revision bumped only when the selection actually changes.
    pub fn record_vote(
        &mut self,
        identity: &VoterIdentity,
        option_id: &str,
        now: SystemTime,
    ) -> VoteChange {
        let change = match self.voters.get_mut(identity.key()) {
            Some(record) if record.option_id == option_id => return VoteChange::Unchanged,
            Some(record) => {
                let from = std::mem::replace(&mut record.option_id, option_id.to_owned());
                record.display_name = identity.display_name().to_owned();
                record.voted_at = now;
                VoteChange::Switched { from }
            }
            None => {
                self.voters.insert(
                    identity.key().to_owned(),
                    VoterRecord {
                        display_name: identity.display_name().to_owned(),
                        option_id: option_id.to_owned(),
                        voted_at: now,
                    },
                );
                VoteChange::Cast
            }
        };

        self.recount();
        self.revision += 1;
        change
    }

    /// Recompute every option's count from the voter records.
    pub fn recount(&mut self) {
        for option in &mut self.options {
            option.vote_count = 0;
        }
        for record in self.voters.values() {
            if let Some(option) = self
                .options
                .iter_mut()
                .find(|option| option.id == record.option_id)
            {
                option.vote_count += 1;
            }
        }
    }

    /// Number of voters whose record points at an existing option.
    pub fn total_voters(&self) -> u64 {
        self.options.iter().map(|option| option.vote_count).sum()
    }

    /// Current counts.
    pub fn tally(&self) -> TallySnapshot {
        TallySnapshot {
            poll_id: self.id.clone(),
            question: self.question.clone(),
            revision: self.revision,
            options: self
                .options
                .iter()
                .map(|option| OptionTally {
                    option_id: option.id.clone(),
                    text: option.text.clone(),
                    vote_count: option.vote_count,
                })
                .collect(),
            total_voters: self.total_voters(),
        }
    }
}

impl From<PollEntity> for Poll {
    fn from(entity: PollEntity) -> Self {
        let options = entity
            .options
            .into_iter()
            .map(|option| PollOption {
                id: option.id,
                text: option.text,
                vote_count: 0,
            })
            .collect();
        let voters = entity
            .voters
            .into_iter()
            .map(|voter| {
                (
                    voter.identity,
                    VoterRecord {
                        display_name: voter.display_name,
                        option_id: voter.option_id,
                        voted_at: voter.voted_at,
                    },
                )
            })
            .collect();

        let mut poll = Self {
            id: entity.id,
            question: entity.question,
            options,
            voters,
            revision: entity.revision,
            created_at: entity.created_at,
        };
        // Stored counts are informational only.
        poll.recount();
        poll
    }
}

impl From<Poll> for PollEntity {
    fn from(poll: Poll) -> Self {
        Self {
            id: poll.id,
            question: poll.question,
            options: poll
                .options
                .into_iter()
                .map(|option| PollOptionEntity {
                    id: option.id,
                    text: option.text,
                    vote_count: option.vote_count,
                })
                .collect(),
            voters: poll
                .voters
                .into_iter()
                .map(|(identity, record)| VoterEntity {
                    identity,
                    display_name: record.display_name,
                    option_id: record.option_id,
                    voted_at: record.voted_at,
                })
                .collect(),
            revision: poll.revision,
            created_at: poll.created_at,
        }
    }
}
