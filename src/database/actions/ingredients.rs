use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    schema::{Ingredient, Uuid},
};

/// Case-insensitive "starts with" search. `None` returns the whole catalog.
pub async fn search_ingredients(
    prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let pattern = prefix.map(|prefix| format!("{}%", escape_like(prefix)));

    let list: Vec<Ingredient> = sqlx::query_as(
        "SELECT * FROM ingredients WHERE $1::TEXT IS NULL OR LOWER(name) LIKE LOWER($1) ORDER BY name, id",
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let ingredient: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(ingredient)
}

pub async fn missing_ingredients(
    ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<Uuid>, Error> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "
        SELECT requested.id FROM UNNEST($1::INTEGER[]) AS requested(id)
        WHERE NOT EXISTS (SELECT 1 FROM ingredients i WHERE i.id = requested.id)
    ",
    )
    .bind(ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
