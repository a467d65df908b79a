mod follows;
mod ingredients;
mod memberships;
mod recipes;
mod tags;
mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use follows::*;
pub use ingredients::*;
pub use memberships::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;

use serde_json::json;

use crate::error::{Error, HttpError};

/// 400 with a single message under `field`.
pub(crate) fn field_error(field: &str, message: &str) -> Error {
    HttpError::InvalidRequest
        .new(message)
        .with_details(json!({ field: [message] }))
}
