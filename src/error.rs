use std::fmt;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Entity named by a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Post,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User => f.write_str("user"),
            Entity::Post => f.write_str("post"),
        }
    }
}

/// Coarse classification of an [`Error`]; the HTTP layer maps each kind to
/// exactly one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    InvalidInput,
    Unauthorized,
    Internal,
}

/// Failures reported by a [`crate::store::Store`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("duplicate key")]
    Duplicate,
    #[error("backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("do not have access rights")]
    Forbidden,
    #[error("username already taken")]
    UsernameTaken,
    #[error("cannot follow yourself")]
    SelfFollow,
    #[error("already following this user")]
    AlreadyFollowing,
    #[error("not following this user")]
    NotFollowing,
    #[error("page and per_page must be at least 1")]
    InvalidPagination,
    #[error("content must be between 1 and {max} characters")]
    InvalidContent { max: usize },
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown search type: {0}")]
    UnknownScope(String),
    #[error("search type requires a username")]
    MissingScopeUsername,
    #[error("cannot change own role")]
    SelfRoleChange,
    #[error("username must be at least 3 and password at least 6 characters")]
    WeakCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("{op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error("background task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::NotFollowing => ErrorKind::NotFound,
            Error::Forbidden => ErrorKind::Forbidden,
            Error::UsernameTaken | Error::SelfFollow | Error::AlreadyFollowing => {
                ErrorKind::Conflict
            }
            Error::InvalidPagination
            | Error::InvalidContent { .. }
            | Error::UnknownRole(_)
            | Error::UnknownScope(_)
            | Error::MissingScopeUsername
            | Error::SelfRoleChange
            | Error::WeakCredentials => ErrorKind::InvalidInput,
            Error::InvalidCredentials | Error::InvalidToken => ErrorKind::Unauthorized,
            Error::Storage { .. } | Error::PasswordHash(_) | Error::Blocking(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Wraps a backend failure with the name of the operation that hit it.
    pub(crate) fn storage(op: &'static str) -> impl FnOnce(StoreError) -> Error {
        move |source| Error::Storage { op, source }
    }

    /// Like [`Error::storage`], but turns a missing row into `NotFound(entity)`.
    pub(crate) fn lookup(op: &'static str, entity: Entity) -> impl FnOnce(StoreError) -> Error {
        move |source| match source {
            StoreError::NotFound => Error::NotFound(entity),
            source => Error::Storage { op, source },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self.kind() {
            ErrorKind::Internal => {
                error!("Request failed: {}", self);
                "server error".to_string()
            }
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { message })
    }
}
