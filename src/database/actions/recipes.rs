use std::collections::HashMap;

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::permissions::Access,
    error::{Error, HttpError, QueryError},
    filters::RecipeFilter,
    form::{IngredientAmount, NewRecipe, RecipeChanges, ValidationErrors},
    jwt::SessionData,
    pagination::{Page, PageContext},
    schema::{
        LinkedRecipeTag, Membership, Recipe, RecipeDetails, RecipePart, RecipeRow, Tag, Uuid,
    },
};

use super::{missing_ingredients, missing_tags};

/// Recipe rows joined with their author, flagged for `viewer`.
fn recipe_query<'a>(viewer: Option<Uuid>) -> QueryBuilder<'a, Postgres> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "
        SELECT r.id, r.name, r.image, r.text, r.cooking_time,
            u.id AS author_id, u.email AS author_email, u.username AS author_username,
            u.first_name AS author_first_name, u.last_name AS author_last_name,
            EXISTS (SELECT 1 FROM follows f WHERE f.following_id = u.id AND f.user_id = ",
    );
    query.push_bind(viewer).push(") AS author_is_subscribed, ");

    for membership in [Membership::Favorites, Membership::ShoppingCart] {
        query
            .push(format!(
                "EXISTS (SELECT 1 FROM {} m WHERE m.recipe_id = r.id AND m.user_id = ",
                membership.table()
            ))
            .push_bind(viewer)
            .push(match membership {
                Membership::Favorites => ") AS is_favorited, ",
                Membership::ShoppingCart => ") AS is_in_shopping_cart, ",
            });
    }

    query.push(
        "COUNT(*) OVER() AS count
        FROM recipes r
        INNER JOIN users u ON u.id = r.author_id
        WHERE TRUE",
    );

    query
}

fn push_recipe_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter, viewer: Option<Uuid>) {
    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id
                WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    // Membership filters only make sense for a known user
    if let Some(user_id) = viewer {
        for membership in [Membership::Favorites, Membership::ShoppingCart] {
            if let Some(member) = filter.membership(membership) {
                query
                    .push(if member { " AND EXISTS " } else { " AND NOT EXISTS " })
                    .push(format!(
                        "(SELECT 1 FROM {} m WHERE m.recipe_id = r.id AND m.user_id = ",
                        membership.table()
                    ))
                    .push_bind(user_id)
                    .push(")");
            }
        }
    }
}

pub async fn list_recipes(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    page: &Page,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeDetails>, Error> {
    let mut query = recipe_query(viewer);
    push_recipe_filter(&mut query, filter, viewer);

    query
        .push(" ORDER BY r.pub_date, r.id LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset);

    let rows: Vec<RecipeRow> = query
        .build_query_as::<RecipeRow>()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = match rows.first() {
        Some(row) => row.count,
        None => count_recipes(filter, viewer, pool).await?,
    };
    let recipes = attach_recipe_parts(rows, pool).await?;

    Ok(PageContext::from_rows(recipes, total_count, page))
}

/// Window counts vanish on a page past the end, so the total is queried on its own.
async fn count_recipes(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<i64, Error> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
    push_recipe_filter(&mut query, filter, viewer);

    let (count,): (i64,) = query
        .build_query_as()
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(count)
}

pub async fn get_recipe_details(
    id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeDetails>, Error> {
    let mut query = recipe_query(viewer);
    query.push(" AND r.id = ").push_bind(id);

    let row: Option<RecipeRow> = query
        .build_query_as::<RecipeRow>()
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    match row {
        Some(row) => Ok(attach_recipe_parts(vec![row], pool).await?.pop()),
        None => Ok(None),
    }
}

async fn attach_recipe_parts(
    rows: Vec<RecipeRow>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetails>, Error> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

    let mut parts: HashMap<Uuid, Vec<RecipePart>> = HashMap::new();
    for part in list_recipe_parts(&ids, pool).await? {
        parts.entry(part.recipe_id).or_default().push(part);
    }

    let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for tag in list_recipe_tags(&ids, pool).await? {
        tags.entry(tag.recipe_id).or_default().push(tag.into());
    }

    Ok(rows
        .into_iter()
        .map(|row| RecipeDetails {
            ingredients: parts.remove(&row.id).unwrap_or_default(),
            tags: tags.remove(&row.id).unwrap_or_default(),
            row,
        })
        .collect())
}

pub async fn list_recipe_parts(
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipePart>, Error> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id AS ingredient_id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn list_recipe_tags(
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<LinkedRecipeTag>, Error> {
    let rows: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Fetches a recipe the session is allowed to change.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| HttpError::NotFound.new("No recipe exists with specified id"))?;

    session.authenticate(Access::Author(recipe.author_id))?;

    Ok(recipe)
}

/// Every referenced ingredient and tag must exist.
pub async fn check_recipe_references(
    ingredient_ids: &[Uuid],
    tag_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let mut errors = ValidationErrors::default();

    for id in missing_ingredients(ingredient_ids, pool).await? {
        errors.add("ingredients", format!("Ingredient {id} does not exist."));
    }
    for id in missing_tags(tag_ids, pool).await? {
        errors.add("tags", format!("Tag {id} does not exist."));
    }

    errors.into_result()
}

async fn insert_recipe_ingredients(
    recipe_id: Uuid,
    ingredients: &[IngredientAmount],
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");

    query.push_values(ingredients, |mut b, ingredient| {
        b.push_bind(recipe_id)
            .push_bind(ingredient.id)
            .push_bind(ingredient.amount);
    });

    query
        .build()
        .execute(&mut **tx)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe_tags(
    recipe_id: Uuid,
    tags: &[Uuid],
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

    query.push_values(tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });

    query
        .build()
        .execute(&mut **tx)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

/// Stores the recipe with its ingredient amounts and tags in one transaction.
pub async fn create_recipe(
    author_id: Uuid,
    recipe: &NewRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Uuid, Error> {
    let mut tx = pool.begin().await.map_err(QueryError::from)?;

    let id: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(image)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    insert_recipe_ingredients(id.0, &recipe.ingredients, &mut tx).await?;
    insert_recipe_tags(id.0, &recipe.tags, &mut tx).await?;

    tx.commit().await.map_err(QueryError::from)?;

    Ok(id.0)
}

/// Applies the supplied fields. A supplied ingredient or tag list replaces the
/// stored one completely.
pub async fn update_recipe(
    id: Uuid,
    changes: &RecipeChanges,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let mut tx = pool.begin().await.map_err(QueryError::from)?;

    sqlx::query(
        "
        UPDATE recipes SET
            name = COALESCE($1, name),
            image = COALESCE($2, image),
            text = COALESCE($3, text),
            cooking_time = COALESCE($4, cooking_time)
        WHERE id = $5
    ",
    )
    .bind(&changes.name)
    .bind(image)
    .bind(&changes.text)
    .bind(changes.cooking_time)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    if let Some(ingredients) = &changes.ingredients {
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;

        insert_recipe_ingredients(id, ingredients, &mut tx).await?;
    }

    if let Some(tags) = &changes.tags {
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;

        insert_recipe_tags(id, tags, &mut tx).await?;
    }

    tx.commit().await.map_err(QueryError::from)?;

    Ok(())
}

/// Ingredient amounts, tags and memberships go with it through the foreign keys.
pub async fn delete_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::actions::{
        add_membership,
        testing::{new_recipe, seed_ingredient, seed_recipe, seed_tag, seed_user, session_for, test_pool},
    };

    use super::*;

    fn ingredient_set(details: &RecipeDetails) -> HashSet<(Uuid, i32)> {
        details
            .ingredients
            .iter()
            .map(|part| (part.ingredient_id, part.amount))
            .collect()
    }

    fn tag_set(details: &RecipeDetails) -> HashSet<Uuid> {
        details.tags.iter().map(|tag| tag.id).collect()
    }

    #[tokio::test]
    async fn created_recipe_reads_back_its_parts() {
        let Some(pool) = test_pool().await else { return };
        let author = seed_user("author", &pool).await;
        let flour = seed_ingredient("flour", "g", &pool).await;
        let milk = seed_ingredient("milk", "ml", &pool).await;
        let breakfast = seed_tag("breakfast", "#E26C2D", &pool).await;
        let lunch = seed_tag("lunch", "#49B64E", &pool).await;

        let id = seed_recipe(
            author,
            &new_recipe("pancakes", &[(flour, 200), (milk, 300)], &[breakfast, lunch]),
            &pool,
        )
        .await;

        let details = get_recipe_details(id, None, &pool).await.unwrap().unwrap();

        assert_eq!(details.row.name, "pancakes");
        assert_eq!(details.row.author_id, author);
        assert_eq!(ingredient_set(&details), HashSet::from([(flour, 200), (milk, 300)]));
        assert_eq!(tag_set(&details), HashSet::from([breakfast, lunch]));
        assert!(!details.row.is_favorited);
        assert!(!details.row.is_in_shopping_cart);
    }

    #[tokio::test]
    async fn update_replaces_ingredients_and_tags() {
        let Some(pool) = test_pool().await else { return };
        let author = seed_user("author", &pool).await;
        let flour = seed_ingredient("flour", "g", &pool).await;
        let milk = seed_ingredient("milk", "ml", &pool).await;
        let eggs = seed_ingredient("eggs", "pcs", &pool).await;
        let breakfast = seed_tag("breakfast", "#E26C2D", &pool).await;
        let dinner = seed_tag("dinner", "#8775D2", &pool).await;
        let id = seed_recipe(
            author,
            &new_recipe("pancakes", &[(flour, 200), (milk, 300)], &[breakfast]),
            &pool,
        )
        .await;

        let changes = RecipeChanges {
            ingredients: Some(vec![IngredientAmount { id: eggs, amount: 2 }]),
            tags: Some(vec![dinner]),
            ..Default::default()
        };
        update_recipe(id, &changes, None, &pool).await.unwrap();

        let details = get_recipe_details(id, None, &pool).await.unwrap().unwrap();
        assert_eq!(details.row.name, "pancakes");
        assert_eq!(ingredient_set(&details), HashSet::from([(eggs, 2)]));
        assert_eq!(tag_set(&details), HashSet::from([dinner]));
    }

    #[tokio::test]
    async fn only_the_author_may_change_a_recipe() {
        let Some(pool) = test_pool().await else { return };
        let author = seed_user("author", &pool).await;
        let stranger = seed_user("stranger", &pool).await;
        let flour = seed_ingredient("flour", "g", &pool).await;
        let id = seed_recipe(author, &new_recipe("bread", &[(flour, 500)], &[]), &pool).await;

        let denied = get_recipe_mut(id, &session_for(stranger, "stranger"), &pool)
            .await
            .unwrap_err();
        assert_eq!(denied.kind, HttpError::Forbidden);

        let recipe = get_recipe_mut(id, &session_for(author, "author"), &pool)
            .await
            .unwrap();
        assert_eq!(recipe.id, id);

        let missing = get_recipe_mut(id + 1000, &session_for(author, "author"), &pool)
            .await
            .unwrap_err();
        assert_eq!(missing.kind, HttpError::NotFound);
    }

    #[tokio::test]
    async fn missing_references_are_field_errors() {
        let Some(pool) = test_pool().await else { return };
        let flour = seed_ingredient("flour", "g", &pool).await;

        let error = check_recipe_references(&[flour, flour + 100], &[7], &pool)
            .await
            .unwrap_err();

        assert_eq!(error.kind, HttpError::InvalidRequest);
        let details = error.details.unwrap();
        assert!(details.get("ingredients").is_some());
        assert!(details.get("tags").is_some());
    }

    #[tokio::test]
    async fn pages_past_the_end_keep_the_total() {
        let Some(pool) = test_pool().await else { return };
        let author = seed_user("author", &pool).await;
        let flour = seed_ingredient("flour", "g", &pool).await;
        for name in ["one", "two", "three"] {
            seed_recipe(author, &new_recipe(name, &[(flour, 1)], &[]), &pool).await;
        }

        let query = vec![(String::from("offset"), String::from("100"))];
        let page = Page::from_query("/api/recipes/", &query);
        let listed = list_recipes(&RecipeFilter::default(), None, &page, &pool)
            .await
            .unwrap();

        assert_eq!(listed.count, 3);
        assert!(listed.results.is_empty());
        assert!(listed.next.is_none());
        assert!(listed.previous.is_some());
    }

    #[tokio::test]
    async fn favorite_filter_splits_members_from_the_rest() {
        let Some(pool) = test_pool().await else { return };
        let author = seed_user("author", &pool).await;
        let reader = seed_user("reader", &pool).await;
        let flour = seed_ingredient("flour", "g", &pool).await;
        let liked = seed_recipe(author, &new_recipe("liked", &[(flour, 1)], &[]), &pool).await;
        let other = seed_recipe(author, &new_recipe("other", &[(flour, 1)], &[]), &pool).await;
        add_membership(Membership::Favorites, liked, reader, &pool)
            .await
            .unwrap();

        let page = Page::from_query("/api/recipes/", &[]);
        let ids = |filter: RecipeFilter, viewer: Option<Uuid>| {
            let pool = pool.clone();
            let page = page.clone();
            async move {
                list_recipes(&filter, viewer, &page, &pool)
                    .await
                    .unwrap()
                    .results
                    .into_iter()
                    .map(|details| details.row.id)
                    .collect::<Vec<_>>()
            }
        };

        let favorited = RecipeFilter {
            is_favorited: Some(true),
            ..Default::default()
        };
        let not_favorited = RecipeFilter {
            is_favorited: Some(false),
            ..Default::default()
        };

        assert_eq!(ids(favorited.clone(), Some(reader)).await, vec![liked]);
        assert_eq!(ids(not_favorited, Some(reader)).await, vec![other]);
        assert_eq!(ids(favorited, None).await, vec![liked, other]);
    }
}
