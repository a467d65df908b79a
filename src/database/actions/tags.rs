use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    schema::{Tag, Uuid},
};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

/// Ids out of `ids` that name no tag.
pub async fn missing_tags(ids: &[Uuid], pool: &Pool<Postgres>) -> Result<Vec<Uuid>, Error> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "
        SELECT requested.id FROM UNNEST($1::INTEGER[]) AS requested(id)
        WHERE NOT EXISTS (SELECT 1 FROM tags t WHERE t.id = requested.id)
    ",
    )
    .bind(ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}
