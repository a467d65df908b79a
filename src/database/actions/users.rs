use chrono::Duration;
use serde_json::json;
use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    error::{Error, HttpError, QueryError},
    form::{NewUser, ProfileChanges},
    pagination::{Page, PageContext},
    schema::{User, UserRow, Uuid},
};

use super::field_error;

const USER_ROW_SELECT: &str = "
    SELECT u.id, u.email, u.username, u.first_name, u.last_name,
        EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.following_id = u.id) AS is_subscribed,
        COUNT(*) OVER() AS count
    FROM users u
";

pub async fn get_user(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// User `id` as seen by `viewer`.
pub async fn get_user_row(
    id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<Option<UserRow>, Error> {
    let row: Option<UserRow> = sqlx::query_as(&format!("{USER_ROW_SELECT} WHERE u.id = $2"))
        .bind(viewer)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn list_users(
    viewer: Option<Uuid>,
    page: &Page,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserRow>, Error> {
    let rows: Vec<UserRow> =
        sqlx::query_as(&format!("{USER_ROW_SELECT} ORDER BY u.id LIMIT $2 OFFSET $3"))
            .bind(viewer)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    let total_count = match rows.first() {
        Some(row) => row.count,
        None => {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(pool)
                .await
                .map_err(QueryError::from)?;
            count
        }
    };
    Ok(PageContext::from_rows(rows, total_count, page))
}

/// Rejects an email or username already taken by someone other than `exclude`.
async fn check_unique(
    email: Option<&str>,
    username: Option<&str>,
    exclude: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let taken: Vec<(String, String)> = sqlx::query_as(
        "
        SELECT email, username FROM users
        WHERE (email = $1 OR username = $2) AND id IS DISTINCT FROM $3
    ",
    )
    .bind(email)
    .bind(username)
    .bind(exclude)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let mut details = serde_json::Map::new();
    for (taken_email, taken_username) in taken {
        if Some(taken_email.as_str()) == email {
            details.insert(
                String::from("email"),
                json!(["A user with that email already exists."]),
            );
        }
        if Some(taken_username.as_str()) == username {
            details.insert(
                String::from("username"),
                json!(["A user with that username already exists."]),
            );
        }
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(HttpError::InvalidRequest
            .new("User already exists")
            .with_details(details.into()))
    }
}

fn hash(password: &str) -> Result<String, Error> {
    hash_password(password)
        .map_err(|e| HttpError::InternalServerError.new(&format!("Failed to hash password: {e}")))
}

pub async fn register_user(user: &NewUser, pool: &Pool<Postgres>) -> Result<User, Error> {
    check_unique(Some(&user.email), Some(&user.username), None, pool).await?;
    let password = hash(&user.password)?;

    let row: Option<User> = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT DO NOTHING RETURNING *
    ",
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(password)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    // Lost a race against a concurrent registration
    row.ok_or_else(|| HttpError::InvalidRequest.new("User already exists"))
}

pub async fn update_user_profile(
    id: Uuid,
    changes: &ProfileChanges,
    pool: &Pool<Postgres>,
) -> Result<User, Error> {
    check_unique(
        changes.email.as_deref(),
        changes.username.as_deref(),
        Some(id),
        pool,
    )
    .await?;

    let row: Option<User> = sqlx::query_as(
        "
        UPDATE users SET
            email = COALESCE($1, email),
            username = COALESCE($2, username),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name)
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(&changes.email)
    .bind(&changes.username)
    .bind(&changes.first_name)
    .bind(&changes.last_name)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| HttpError::NotFound.new("User not found"))
}

pub async fn set_password(
    id: Uuid,
    current_password: &str,
    new_password: &str,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user(id, pool)
        .await?
        .ok_or_else(|| HttpError::NotFound.new("User not found"))?;

    if !verify_password(current_password, &user.password).unwrap_or(false) {
        return Err(field_error("current_password", "Invalid password."));
    }

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hash(new_password)?)
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

/// Checks the credentials and issues a session token.
pub async fn login_user(
    email: &str,
    password: &str,
    secret: &[u8],
    lifetime: Duration,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let invalid = || {
        field_error(
            "non_field_errors",
            "Unable to log in with provided credentials.",
        )
    };

    let user = get_user_by_email(email, pool).await?.ok_or_else(invalid)?;

    let authenticated = verify_password(password, &user.password).map_err(|e| {
        log::error!("> Stored password hash of user {} is unreadable: {e}", user.id);
        invalid()
    })?;
    if !authenticated {
        return Err(invalid());
    }

    generate_jwt_session(&user, secret, lifetime)
}
