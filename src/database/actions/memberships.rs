use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HttpError, QueryError},
    schema::{Membership, RecipeShort, ShoppingListPart, Uuid},
};

use super::get_recipe;

/// Puts the recipe into the user's set and returns its short form.
pub async fn add_membership(
    membership: Membership,
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| HttpError::NotFound.new("No recipe exists with specified id"))?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        membership.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HttpError::InvalidRequest.new(&format!(
            "Recipe is already in {}",
            membership.label()
        )));
    }

    Ok(RecipeShort {
        id: recipe.id,
        author_id: recipe.author_id,
        name: recipe.name,
        image: recipe.image,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn remove_membership(
    membership: Membership,
    recipe_id: Uuid,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(HttpError::NotFound.new("No recipe exists with specified id"));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        membership.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HttpError::NotFound.new(&format!(
            "Recipe is not in {}",
            membership.label()
        )));
    }

    Ok(())
}

/// Every ingredient amount reachable through the user's shopping cart.
pub async fn list_shopping_list_parts(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListPart>, Error> {
    let rows: Vec<ShoppingListPart> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_list s
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = s.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE s.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}
