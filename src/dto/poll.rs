use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        validation::{validate_options, validate_question},
    },
    state::poll::Poll,
};

/// Payload used to create a poll.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePollRequest {
    /// Question shown above the options.
    #[validate(custom(function = "validate_question"))]
    pub question: String,
    /// Option texts in display order.
    #[validate(custom(function = "validate_options"))]
    pub options: Vec<String>,
}

/// Identifier of a freshly created poll.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePollResponse {
    pub id: String,
}

/// Poll with its current counts.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOptionView>,
    pub total_voters: u64,
    pub revision: u64,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollOptionView {
    pub id: String,
    pub text: String,
    pub vote_count: u64,
}

impl From<&Poll> for PollView {
    fn from(poll: &Poll) -> Self {
        Self {
            id: poll.id.clone(),
            question: poll.question.clone(),
            options: poll
                .options
                .iter()
                .map(|option| PollOptionView {
                    id: option.id.clone(),
                    text: option.text.clone(),
                    vote_count: option.vote_count,
                })
                .collect(),
            total_voters: poll.total_voters(),
            revision: poll.revision,
            created_at: format_system_time(poll.created_at),
        }
    }
}
