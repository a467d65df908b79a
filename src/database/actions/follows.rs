use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HttpError, QueryError},
    pagination::{Page, PageContext},
    schema::{RecipeShort, SubscriptionRow, Uuid},
};

use super::get_user;

const SUBSCRIPTION_SELECT: &str = "
    SELECT u.id, u.email, u.username, u.first_name, u.last_name,
        (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
        COUNT(*) OVER() AS count
    FROM follows f
    INNER JOIN users u ON u.id = f.following_id
    WHERE f.user_id = $1
";

pub async fn follow_user(
    user_id: Uuid,
    following_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_user(following_id, pool).await?.is_none() {
        return Err(HttpError::NotFound.new("User not found"));
    }

    if user_id == following_id {
        return Err(HttpError::InvalidRequest.new("You cannot subscribe to yourself"));
    }

    let result = sqlx::query(
        "INSERT INTO follows (user_id, following_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(following_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HttpError::InvalidRequest.new("You are already subscribed to this user"));
    }

    Ok(())
}

pub async fn unfollow_user(
    user_id: Uuid,
    following_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_user(following_id, pool).await?.is_none() {
        return Err(HttpError::NotFound.new("User not found"));
    }

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND following_id = $2")
        .bind(user_id)
        .bind(following_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound.new("You are not subscribed to this user"));
    }

    Ok(())
}

pub async fn list_subscriptions(
    user_id: Uuid,
    page: &Page,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscriptionRow>, Error> {
    let rows: Vec<SubscriptionRow> =
        sqlx::query_as(&format!("{SUBSCRIPTION_SELECT} ORDER BY f.id LIMIT $2 OFFSET $3"))
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    let total_count = match rows.first() {
        Some(row) => row.count,
        None => {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await
                .map_err(QueryError::from)?;
            count
        }
    };
    Ok(PageContext::from_rows(rows, total_count, page))
}

pub async fn get_subscription(
    user_id: Uuid,
    following_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Option<SubscriptionRow>, Error> {
    let row: Option<SubscriptionRow> =
        sqlx::query_as(&format!("{SUBSCRIPTION_SELECT} AND u.id = $2"))
            .bind(user_id)
            .bind(following_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

/// Recipes of the given authors, at most `limit` per author.
pub async fn list_author_recipes(
    author_ids: &[Uuid],
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeShort>, Error> {
    if author_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<RecipeShort> = sqlx::query_as(
        "
        SELECT id, author_id, name, image, cooking_time
        FROM (
            SELECT r.*, ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date, r.id) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY pub_date, id
    ",
    )
    .bind(author_ids)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crate::actions::testing::{new_recipe, seed_ingredient, seed_recipe, seed_user, test_pool};

    use super::*;

    #[tokio::test]
    async fn following_rules() {
        let Some(pool) = test_pool().await else { return };
        let reader = seed_user("reader", &pool).await;
        let author = seed_user("author", &pool).await;

        let own = follow_user(reader, reader, &pool).await.unwrap_err();
        assert_eq!(own.kind, HttpError::InvalidRequest);

        let missing = follow_user(reader, author + 1000, &pool).await.unwrap_err();
        assert_eq!(missing.kind, HttpError::NotFound);

        follow_user(reader, author, &pool).await.unwrap();
        let twice = follow_user(reader, author, &pool).await.unwrap_err();
        assert_eq!(twice.kind, HttpError::InvalidRequest);

        unfollow_user(reader, author, &pool).await.unwrap();
        let absent = unfollow_user(reader, author, &pool).await.unwrap_err();
        assert_eq!(absent.kind, HttpError::NotFound);
    }

    #[tokio::test]
    async fn subscriptions_count_and_cap_recipes() {
        let Some(pool) = test_pool().await else { return };
        let reader = seed_user("reader", &pool).await;
        let author = seed_user("author", &pool).await;
        let flour = seed_ingredient("flour", "g", &pool).await;
        for name in ["one", "two", "three"] {
            seed_recipe(author, &new_recipe(name, &[(flour, 1)], &[]), &pool).await;
        }
        follow_user(reader, author, &pool).await.unwrap();

        let page = Page::from_query("/api/users/subscriptions/", &[]);
        let listed = list_subscriptions(reader, &page, &pool).await.unwrap();
        assert_eq!(listed.count, 1);
        assert_eq!(listed.results[0].id, author);
        assert_eq!(listed.results[0].recipes_count, 3);

        let capped = list_author_recipes(&[author], Some(2), &pool).await.unwrap();
        let names: Vec<&str> = capped.iter().map(|recipe| recipe.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);

        let query = vec![(String::from("offset"), String::from("10"))];
        let past_end = Page::from_query("/api/users/subscriptions/", &query);
        let empty = list_subscriptions(reader, &past_end, &pool).await.unwrap();
        assert_eq!(empty.count, 1);
        assert!(empty.results.is_empty());
    }
}
