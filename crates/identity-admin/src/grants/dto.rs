use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::persisted_grant;
use crate::paging::PagedList;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedGrantDto {
    pub key: String,
    pub grant_type: String,
    pub subject_id: Option<String>,
    /// User name of the subject, when the identity store knows it
    pub subject_name: Option<String>,
    pub session_id: Option<String>,
    pub client_id: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiration: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub consumed_time: Option<OffsetDateTime>,
    pub expired: bool,
    pub consumed: bool,
    pub data: String,
}

impl PersistedGrantDto {
    pub fn new(model: persisted_grant::Model, subject_name: Option<String>) -> Self {
        let expired = model.is_expired();
        let consumed = model.is_consumed();
        Self {
            key: model.key,
            grant_type: model.grant_type,
            subject_id: model.subject_id,
            subject_name,
            session_id: model.session_id,
            client_id: model.client_id,
            description: model.description,
            creation_time: model.creation_time,
            expiration: model.expiration,
            consumed_time: model.consumed_time,
            expired,
            consumed,
            data: model.data,
        }
    }
}

impl From<persisted_grant::Model> for PersistedGrantDto {
    fn from(model: persisted_grant::Model) -> Self {
        Self::new(model, None)
    }
}

/// A subject holding at least one grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedGrantSubjectDto {
    pub subject_id: String,
    pub subject_name: Option<String>,
}

/// Filter of a bulk grant deletion, as recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantDeletionScope {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    pub deleted: u64,
}

pub type PersistedGrantsDto = PagedList<PersistedGrantDto>;
pub type PersistedGrantSubjectsDto = PagedList<PersistedGrantSubjectDto>;
