use std::convert::Infallible;

use serde_json::{json, Value};
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidHeader, InvalidQuery, LengthRequired, MethodNotAllowed, MissingHeader,
        PayloadTooLarge, UnsupportedMediaType,
    },
    Rejection, Reply,
};

use crate::error::{Error, HttpError};

fn detail(status: StatusCode, detail: impl ToString) -> (StatusCode, Value) {
    (status, json!({ "detail": detail.to_string() }))
}

fn render(rejection: &Rejection) -> (StatusCode, Value) {
    if let Some(error) = rejection.find::<Error>() {
        if error.kind == HttpError::InternalServerError {
            log::error!("> {error}");
        }
        return (error.status(), error.body());
    }

    if rejection.is_not_found() {
        return detail(StatusCode::NOT_FOUND, "Not found.");
    }

    if let Some(e) = rejection.find::<BodyDeserializeError>() {
        return detail(StatusCode::BAD_REQUEST, e);
    }
    if let Some(e) = rejection.find::<InvalidQuery>() {
        return detail(StatusCode::BAD_REQUEST, e);
    }
    if let Some(e) = rejection.find::<MissingHeader>() {
        return detail(StatusCode::BAD_REQUEST, e);
    }
    if let Some(e) = rejection.find::<InvalidHeader>() {
        return detail(StatusCode::BAD_REQUEST, e);
    }
    if let Some(e) = rejection.find::<LengthRequired>() {
        return detail(StatusCode::LENGTH_REQUIRED, e);
    }
    if let Some(e) = rejection.find::<PayloadTooLarge>() {
        return detail(StatusCode::PAYLOAD_TOO_LARGE, e);
    }
    if let Some(e) = rejection.find::<UnsupportedMediaType>() {
        return detail(StatusCode::UNSUPPORTED_MEDIA_TYPE, e);
    }
    if let Some(e) = rejection.find::<MethodNotAllowed>() {
        return detail(StatusCode::METHOD_NOT_ALLOWED, e);
    }

    log::error!("> Unhandled rejection: {rejection:?}");
    detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Turns every rejection into a JSON error response.
pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = render(&rejection);

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
