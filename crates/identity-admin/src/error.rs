use std::fmt;

use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

use crate::identity::credentials::CredentialError;
use crate::resources::{MessageId, ResourceProvider};

/// Coarse classification of an [`AdminError`], stable for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Provider,
    Store,
}

/// What went wrong, by identifier, plus the optional field it concerns.
///
/// `message` stays `None` until a service localizes the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub message_id: MessageId,
    pub field: Option<&'static str>,
    /// Machine-readable reason reported by the identity-provider runtime
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ErrorDetail {
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            field: None,
            reason: None,
            message: None,
        }
    }

    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message)?,
            None => write!(f, "{}", self.message_id)?,
        }
        if let Some(field) = self.field {
            write!(f, " (field: {field})")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " [{reason}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Not found: {0}")]
    NotFound(ErrorDetail),
    #[error("Validation failed: {0}")]
    Validation(ErrorDetail),
    #[error("Conflict: {0}")]
    Conflict(ErrorDetail),
    #[error("Identity provider rejected the operation: {0}")]
    Provider(ErrorDetail),
    #[error("Store failure: {detail}")]
    Store {
        detail: ErrorDetail,
        #[source]
        source: DbErr,
    },
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    pub fn not_found(id: MessageId) -> Self {
        AdminError::NotFound(ErrorDetail::new(id))
    }

    pub fn validation(id: MessageId, field: &'static str) -> Self {
        AdminError::Validation(ErrorDetail::new(id).with_field(field))
    }

    pub fn conflict(id: MessageId) -> Self {
        AdminError::Conflict(ErrorDetail::new(id))
    }

    pub fn provider(error: &CredentialError, field: &'static str) -> Self {
        let id = match error {
            CredentialError::InvalidUserName(_) => MessageId::UserNameInvalid,
            _ => MessageId::PasswordRejected,
        };
        AdminError::Provider(
            ErrorDetail::new(id)
                .with_field(field)
                .with_reason(error.reason_code()),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AdminError::NotFound(_) => ErrorKind::NotFound,
            AdminError::Validation(_) => ErrorKind::Validation,
            AdminError::Conflict(_) => ErrorKind::Conflict,
            AdminError::Provider(_) => ErrorKind::Provider,
            AdminError::Store { .. } => ErrorKind::Store,
        }
    }

    pub fn detail(&self) -> &ErrorDetail {
        match self {
            AdminError::NotFound(detail)
            | AdminError::Validation(detail)
            | AdminError::Conflict(detail)
            | AdminError::Provider(detail)
            | AdminError::Store { detail, .. } => detail,
        }
    }

    fn detail_mut(&mut self) -> &mut ErrorDetail {
        match self {
            AdminError::NotFound(detail)
            | AdminError::Validation(detail)
            | AdminError::Conflict(detail)
            | AdminError::Provider(detail)
            | AdminError::Store { detail, .. } => detail,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.detail().message_id
    }

    /// Attach the localized text for this error's message id.
    pub fn localized(mut self, resources: &dyn ResourceProvider) -> Self {
        let id = self.message_id();
        self.detail_mut().message = Some(resources.message(id));
        self
    }

    /// The caller-facing rendering. Store internals never appear here.
    pub fn view(&self) -> ErrorView {
        let detail = self.detail();
        ErrorView {
            kind: self.kind(),
            code: detail.message_id,
            message: detail
                .message
                .clone()
                .unwrap_or_else(|| detail.message_id.code().to_string()),
            field: detail.field,
            reason: detail.reason.clone(),
        }
    }
}

impl From<DbErr> for AdminError {
    fn from(source: DbErr) -> Self {
        AdminError::Store {
            detail: ErrorDetail::new(MessageId::StoreFailure),
            source,
        }
    }
}

/// Structured error handed to whatever renders forms or JSON for an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub kind: ErrorKind,
    pub code: MessageId,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Localize the error side of a result at the service boundary.
///
/// Store failures are logged here with their source, since the rendered
/// error never carries it.
pub trait Localize<T> {
    fn localize(self, resources: &dyn ResourceProvider) -> AdminResult<T>;
}

impl<T> Localize<T> for AdminResult<T> {
    fn localize(self, resources: &dyn ResourceProvider) -> AdminResult<T> {
        self.map_err(|error| {
            if let AdminError::Store { source, .. } = &error {
                tracing::error!(error = %source, "Store operation failed");
            }
            error.localized(resources)
        })
    }
}
