#![allow(non_snake_case)]

use crate::{IntoResponse, Uri};

use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;

use serde::Serialize;

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Maybe<T> {
    Nothing(Error),
    Fine(Success<T>),
}

pub fn Fine<V>(v: V) -> Maybe<V>
where
    V: Serialize,
{
    Maybe::Fine(Success::of(v))
}

pub fn Nothing<V>(err: Error) -> Maybe<V> {
    Maybe::Nothing(err)
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<T> IntoResponse for Maybe<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match self {
            Maybe::Nothing(err) => Json::into_response(Json(err)),
            Maybe::Fine(success) => Json::into_response(Json(success)),
        }
    }
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound { message: String },
    NotRegistered { message: String },
    InvalidPayload { message: String },
    AuthenticationFailure { message: String },
    Forbidden { message: String },
    AccountAlreadyExists { message: String },
    StorageError { message: String },
    InternalError { kind: &'static str, message: String },
    Unknown { message: String },
}

impl Error {
    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Error {
        Error::Forbidden {
            message: msg.into(),
        }
    }

    pub fn storage<S: Into<String>>(msg: S) -> Error {
        Error::StorageError {
            message: msg.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::NotRegistered { .. } => StatusCode::CONFLICT,
            Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::AccountAlreadyExists { .. } => StatusCode::CONFLICT,
            Error::StorageError { .. }
            | Error::InternalError { .. }
            | Error::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
            Error::NotFound { message }
            | Error::NotRegistered { message }
            | Error::InvalidPayload { message }
            | Error::AuthenticationFailure { message }
            | Error::Forbidden { message }
            | Error::AccountAlreadyExists { message }
            | Error::StorageError { message }
            | Error::Unknown { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{:?}", self);
        }
        (status, Json(self)).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::StorageError {
            message: io.to_string(),
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(id: uuid::Error) -> Self {
        Self::InvalidPayload {
            message: id.to_string(),
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(err: postcard::Error) -> Self {
        Self::StorageError {
            message: format!("corrupt document: {}", err),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "HashError",
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_serialize_with_tag() {
        let value = serde_json::to_value(Error::NotRegistered {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(value["error"], "NotRegistered");
        assert_eq!(value["message"], "nope");
    }

    #[test]
    fn success_envelope_flattens_value() {
        #[derive(Serialize)]
        struct Created {
            id: u32,
        }
        let value = serde_json::to_value(Fine(Created { id: 7 })).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(Error::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::storage("disk").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::invalid("bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn non_fatal_signals_render_as_ok() {
        let not_registered = || Error::NotRegistered {
            message: "not on the roster".to_string(),
        };
        let rendered = crate::breaks::<()>(not_registered()).into_response();
        assert_eq!(rendered.status(), StatusCode::OK);
        let rendered = Nothing::<()>(not_registered()).into_response();
        assert_eq!(rendered.status(), StatusCode::OK);

        let value = serde_json::to_value(Nothing::<()>(not_registered())).unwrap();
        assert_eq!(value["error"], "NotRegistered");
    }
}
