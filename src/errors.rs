//! Two-tier error design, carried over from the reference service's
//! `shared_models.rs`: `GameError` is the domain enum every fallible
//! operation returns; `ServiceError` adds the HTTP-shaped status code and
//! response payload needed at the admin-surface boundary.

use std::fmt;

use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Domain-level error. Every module in this crate (ingestion, store, game
/// engine) returns `Result<_, GameError>`; the admin surface wraps the ones
/// it needs to report back to an HTTP client in a `ServiceError`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum GameError {
    /// Long-poll / send / member-fetch failed in a retriable way.
    TransportError(String),
    /// Long-poll server handed back a missing/invalid field, or the key expired.
    ProtocolError(String),
    /// The relational store failed for an infrastructure reason.
    DbError(String),
    /// Router couldn't make sense of an inbound update.
    ValidationError(String),
    BadId(String),
    ChannelError(String),
    AlreadyExists(String),
    NotFound(String),
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GameError::TransportError(d) => write!(f, "transport error: {}", d),
            GameError::ProtocolError(d) => write!(f, "protocol error: {}", d),
            GameError::DbError(d) => write!(f, "db error: {}", d),
            GameError::ValidationError(d) => write!(f, "validation error: {}", d),
            GameError::BadId(d) => write!(f, "bad id: {}", d),
            GameError::ChannelError(d) => write!(f, "channel error: {}", d),
            GameError::AlreadyExists(d) => write!(f, "already exists: {}", d),
            GameError::NotFound(d) => write!(f, "not found: {}", d),
        }
    }
}

impl From<reqwest::Error> for GameError {
    fn from(err: reqwest::Error) -> Self {
        GameError::TransportError(format!("{:#?}", err))
    }
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::ProtocolError(err.to_string())
    }
}

impl From<sqlx::Error> for GameError {
    fn from(err: sqlx::Error) -> Self {
        GameError::DbError(err.to_string())
    }
}

/// Response payload carried by a `ServiceError`, mirroring the reference
/// service's `ResponseType` enum.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ResponseType {
    NoData,
    Token(String),
    ErrorInfo(String),
}

/// HTTP-shaped error used at the admin surface boundary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub message: String,
    #[serde(serialize_with = "serialize_status_code")]
    #[serde(deserialize_with = "deserialize_status_code")]
    pub status: StatusCode,
    pub response_type: ResponseType,
    pub game_error: GameError,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}): {}", self.message, self.status, self.game_error)
    }
}

impl ServiceError {
    pub fn new(message: &str, status: StatusCode, response_type: ResponseType, error: GameError) -> Self {
        ServiceError {
            message: message.into(),
            status,
            response_type,
            game_error: error,
        }
    }

    pub fn new_not_found(message: &str, id: &str) -> Self {
        ServiceError::new(
            message,
            StatusCode::NOT_FOUND,
            ResponseType::NoData,
            GameError::NotFound(id.to_owned()),
        )
    }

    pub fn new_bad_request(message: &str) -> Self {
        ServiceError::new(
            message,
            StatusCode::BAD_REQUEST,
            ResponseType::NoData,
            GameError::ValidationError(message.to_owned()),
        )
    }

    pub fn new_internal(message: &str, error: GameError) -> Self {
        ServiceError::new(message, StatusCode::INTERNAL_SERVER_ERROR, ResponseType::NoData, error)
    }

    pub fn to_http_response(&self) -> actix_web::HttpResponse {
        let body = serde_json::to_string(self).unwrap_or_else(|_| self.message.clone());
        actix_web::HttpResponse::build(self.status).body(body)
    }
}

fn serialize_status_code<S>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u16(status.as_u16())
}

fn deserialize_status_code<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let code = u16::deserialize(deserializer)?;
    StatusCode::from_u16(code).map_err(serde::de::Error::custom)
}
