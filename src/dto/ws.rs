use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    error::{VoteError, VoteErrorKind},
    state::poll::TallySnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
/// Messages accepted from poll WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Subscribe to live updates of a poll.
    #[serde(rename_all = "camelCase")]
    JoinPoll {
        /// Poll to follow.
        poll_id: String,
    },
    /// Stop receiving updates of a poll.
    #[serde(rename_all = "camelCase")]
    LeavePoll {
        /// Poll to stop following.
        poll_id: String,
    },
    /// Select an option, replacing any earlier selection by the same name.
    #[serde(rename_all = "camelCase")]
    Vote {
        /// Poll voted on.
        poll_id: String,
        /// Option selected.
        option_id: String,
        /// Self-asserted display name.
        #[serde(alias = "identity")]
        name: String,
    },
}

/// Why an inbound frame could not be turned into a [`ClientMessage`].
#[derive(Debug, Error)]
pub enum InboundError {
    /// Not JSON, unknown `type`, or a field of the wrong shape.
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    /// A required identifier was blank.
    #[error("`{0}` must not be empty")]
    BlankField(&'static str),
}

impl From<InboundError> for VoteError {
    fn from(err: InboundError) -> Self {
        VoteError::MalformedEvent(err.to_string())
    }
}

impl ClientMessage {
    /// Parse a text frame and reject blank identifiers.
    ///
    /// The voter name is left untouched; it is checked by the identity rules later.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(text)?;
        match &message {
            Self::JoinPoll { poll_id } | Self::LeavePoll { poll_id } => {
                require("pollId", poll_id)?;
            }
            Self::Vote {
                poll_id, option_id, ..
            } => {
                require("pollId", poll_id)?;
                require("optionId", option_id)?;
            }
        }
        Ok(message)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), InboundError> {
    if value.trim().is_empty() {
        return Err(InboundError::BlankField(field));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages pushed to poll WebSocket clients.
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// New counts for a poll; sent to the whole room.
    PollUpdated(PollUpdate),
    /// A failed request, sent to its sender only.
    Error(ErrorMessage),
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Vote counts of a poll at one revision.
pub struct PollUpdate {
    /// Poll identifier.
    pub poll_id: String,
    /// Poll question.
    pub question: String,
    /// Increases with every accepted change; older updates can be discarded.
    pub revision: u64,
    /// Counts in display order.
    pub options: Vec<OptionCount>,
    /// Number of distinct voters.
    pub total_voters: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Count of a single option.
pub struct OptionCount {
    /// Option identifier.
    pub id: String,
    /// Option text.
    pub text: String,
    /// Voters currently selecting this option.
    pub vote_count: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Error report for a single request.
pub struct ErrorMessage {
    /// Machine-readable category.
    pub kind: VoteErrorKind,
    /// Human-readable explanation.
    pub message: String,
    /// Seconds to wait before voting again, for rate-limit errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl From<&TallySnapshot> for PollUpdate {
    fn from(snapshot: &TallySnapshot) -> Self {
        Self {
            poll_id: snapshot.poll_id.clone(),
            question: snapshot.question.clone(),
            revision: snapshot.revision,
            options: snapshot
                .options
                .iter()
                .map(|option| OptionCount {
                    id: option.option_id.clone(),
                    text: option.text.clone(),
                    vote_count: option.vote_count,
                })
                .collect(),
            total_voters: snapshot.total_voters,
        }
    }
}

impl From<&VoteError> for ServerMessage {
    fn from(err: &VoteError) -> Self {
        ServerMessage::Error(ErrorMessage {
            kind: err.kind(),
            message: err.to_string(),
            retry_after_seconds: err.retry_after_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::poll::OptionTally;

    #[test]
    fn parses_vote_with_legacy_identity_field() {
        let message = ClientMessage::from_json_str(
            r#"{"type":"vote","pollId":"p1","optionId":"o1","identity":"Alice"}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            ClientMessage::Vote {
                poll_id: "p1".into(),
                option_id: "o1".into(),
                name: "Alice".into(),
            }
        );
    }

    #[test]
    fn rejects_unknown_type_and_missing_fields() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"shout"}"#),
            Err(InboundError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"vote","pollId":"p1","name":"a"}"#),
            Err(InboundError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str("not json"),
            Err(InboundError::Json(_))
        ));
    }

    #[test]
    fn rejects_blank_identifiers_but_not_blank_names() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"joinPoll","pollId":"  "}"#),
            Err(InboundError::BlankField("pollId"))
        ));
        assert!(
            ClientMessage::from_json_str(
                r#"{"type":"vote","pollId":"p1","optionId":"o1","name":" "}"#
            )
            .is_ok()
        );
    }

    #[test]
    fn poll_update_wire_shape() {
        let snapshot = TallySnapshot {
            poll_id: "p1".into(),
            question: "Color?".into(),
            revision: 3,
            options: vec![OptionTally {
                option_id: "o1".into(),
                text: "Red".into(),
                vote_count: 2,
            }],
            total_voters: 2,
        };
        let value = serde_json::to_value(ServerMessage::PollUpdated((&snapshot).into())).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "pollUpdated",
                "pollId": "p1",
                "question": "Color?",
                "revision": 3,
                "options": [{"id": "o1", "text": "Red", "voteCount": 2}],
                "totalVoters": 2
            })
        );
    }

    #[test]
    fn error_wire_shape() {
        let err = VoteError::RateLimited {
            retry_after_secs: 12,
        };
        let value = serde_json::to_value(ServerMessage::from(&err)).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["kind"], "rateLimited");
        assert_eq!(value["retryAfterSeconds"], 12);

        let value = serde_json::to_value(ServerMessage::from(&VoteError::StorageFailure)).unwrap();
        assert_eq!(value["message"], "Error recording vote");
        assert!(value.get("retryAfterSeconds").is_none());
    }
}
