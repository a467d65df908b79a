//! Database fixtures for store tests.
//!
//! Each call provisions a fresh, migrated database on the server named by
//! `DATABASE_URL`, so tests never see each other's rows. Without the variable
//! the store tests are skipped.

use std::env;

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Pool, Postgres,
};

use crate::{
    form::{IngredientAmount, NewRecipe, NewUser},
    jwt::SessionData,
    media::ImagePayload,
    schema::Uuid,
};

use super::{create_recipe, register_user};

pub(crate) async fn test_pool() -> Option<Pool<Postgres>> {
    let Ok(url) = env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping store test");
        return None;
    };

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("failed to connect to DATABASE_URL");

    let name = format!("foodgram_test_{}", uuid::Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE DATABASE {name}"))
        .execute(&admin)
        .await
        .expect("failed to create test database");

    let options = url
        .parse::<PgConnectOptions>()
        .expect("DATABASE_URL is not a postgres url")
        .database(&name);
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to migrate test database");

    Some(pool)
}

pub(crate) async fn seed_user(username: &str, pool: &Pool<Postgres>) -> Uuid {
    let user = NewUser {
        email: format!("{username}@example.com"),
        username: username.to_string(),
        first_name: username.to_string(),
        last_name: String::from("Tester"),
        password: String::from("correct-horse-battery"),
    };

    register_user(&user, pool)
        .await
        .expect("failed to register user")
        .id
}

pub(crate) fn session_for(user_id: Uuid, username: &str) -> SessionData {
    SessionData {
        user_id,
        username: username.to_string(),
        token_id: uuid::Uuid::new_v4().to_string(),
        expires_at: i64::MAX,
    }
}

pub(crate) async fn seed_tag(slug: &str, color: &str, pool: &Pool<Postgres>) -> Uuid {
    let (id,): (Uuid,) =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $1) RETURNING id")
            .bind(slug)
            .bind(color)
            .fetch_one(pool)
            .await
            .expect("failed to insert tag");
    id
}

pub(crate) async fn seed_ingredient(name: &str, unit: &str, pool: &Pool<Postgres>) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(unit)
    .fetch_one(pool)
    .await
    .expect("failed to insert ingredient");
    id
}

pub(crate) fn new_recipe(name: &str, ingredients: &[(Uuid, i32)], tags: &[Uuid]) -> NewRecipe {
    NewRecipe {
        name: name.to_string(),
        image: ImagePayload {
            bytes: vec![],
            extension: String::from("png"),
        },
        text: String::from("Mix and serve."),
        cooking_time: 10,
        ingredients: ingredients
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
        tags: tags.to_vec(),
    }
}

pub(crate) async fn seed_recipe(
    author_id: Uuid,
    recipe: &NewRecipe,
    pool: &Pool<Postgres>,
) -> Uuid {
    create_recipe(author_id, recipe, "recipes/images/test.png", pool)
        .await
        .expect("failed to create recipe")
}
