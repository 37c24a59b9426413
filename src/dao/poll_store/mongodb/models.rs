use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{PollEntity, PollOptionEntity, VoterEntity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPollDocument {
    #[serde(rename = "_id")]
    id: String,
    question: String,
    options: Vec<MongoOptionDocument>,
    #[serde(default)]
    voters: Vec<MongoVoterDocument>,
    #[serde(default)]
    revision: i64,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoOptionDocument {
    id: String,
    text: String,
    #[serde(default)]
    vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoterDocument {
    identity: String,
    display_name: String,
    option_id: String,
    voted_at: DateTime,
}

impl From<PollEntity> for MongoPollDocument {
    fn from(value: PollEntity) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value
                .options
                .into_iter()
                .map(|option| MongoOptionDocument {
                    id: option.id,
                    text: option.text,
                    vote_count: saturating_i64(option.vote_count),
                })
                .collect(),
            voters: value
                .voters
                .into_iter()
                .map(|voter| MongoVoterDocument {
                    identity: voter.identity,
                    display_name: voter.display_name,
                    option_id: voter.option_id,
                    voted_at: DateTime::from_system_time(voter.voted_at),
                })
                .collect(),
            revision: saturating_i64(value.revision),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoPollDocument> for PollEntity {
    fn from(value: MongoPollDocument) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value
                .options
                .into_iter()
                .map(|option| PollOptionEntity {
                    id: option.id,
                    text: option.text,
                    vote_count: option.vote_count.max(0) as u64,
                })
                .collect(),
            voters: value
                .voters
                .into_iter()
                .map(|voter| VoterEntity {
                    identity: voter.identity,
                    display_name: voter.display_name,
                    option_id: voter.option_id,
                    voted_at: voter.voted_at.to_system_time(),
                })
                .collect(),
            revision: value.revision.max(0) as u64,
            created_at: value.created_at.to_system_time(),
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

/// Filter matching a poll only while it is still at `revision`.
pub fn doc_id_at_revision(id: &str, revision: u64) -> Document {
    doc! {"_id": id, "revision": saturating_i64(revision)}
}
