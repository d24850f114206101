use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use crate::domain_model::InvalidIdempotencyKey;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use crate::logger::*;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<reject::LengthRequired>().is_some()
        || err.find::<reject::PayloadTooLarge>().is_some()
        || err.find::<reject::UnsupportedMediaType>().is_some()
    {
        ApiErrorCode::InvalidInput
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::NotFound
    } else {
        warn!("Unhandled rejection: {:?}", err);
        ApiErrorCode::InternalError
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Request is malformed or fails validation")]
    InvalidInput,
    #[error("Idempotency-Key header is missing or invalid")]
    InvalidIdempotencyKey,
    #[error("Idempotency-Key was already used with a different request")]
    IdempotencyKeyConflict,
    #[error("A request with this Idempotency-Key is still being processed")]
    OperationInFlight,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Username already taken")]
    UsernameTaken,
    #[error("Refresh token is invalid or has already been used")]
    InvalidOrReusedToken,
    #[error("Access token is invalid or expired")]
    InvalidToken,
    #[error("Not found")]
    NotFound,
    #[error("Service temporarily unavailable")]
    StoreUnavailable,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    fn unavailable<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Store unavailable: {}", error);
        ApiErrorCode::StoreUnavailable
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidInput
            | ApiErrorCode::InvalidIdempotencyKey
            | ApiErrorCode::IdempotencyKeyConflict => StatusCode::BAD_REQUEST,
            ApiErrorCode::OperationInFlight => StatusCode::ACCEPTED,
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::InvalidOrReusedToken
            | ApiErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiErrorCode::UsernameTaken => StatusCode::CONFLICT,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::UserExists => ApiErrorCode::UsernameTaken,
            AuthError::InvalidInput(_) => ApiErrorCode::InvalidInput,
            AuthError::InvalidOrReusedToken => ApiErrorCode::InvalidOrReusedToken,
            AuthError::InvalidOrExpiredAccessToken => ApiErrorCode::InvalidToken,
            AuthError::StoreUnavailable(e) => ApiErrorCode::unavailable(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<PaymentError> for ApiErrorCode {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::InvalidTransfer(_) => ApiErrorCode::InvalidInput,
            PaymentError::KeyConflict => ApiErrorCode::IdempotencyKeyConflict,
            PaymentError::InFlight => ApiErrorCode::OperationInFlight,
            PaymentError::StoreUnavailable(e) => ApiErrorCode::unavailable(e),
            PaymentError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<InvalidIdempotencyKey> for ApiErrorCode {
    fn from(_: InvalidIdempotencyKey) -> Self {
        ApiErrorCode::InvalidIdempotencyKey
    }
}
