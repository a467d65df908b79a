use chrono::Duration;
use warp::{
    http::StatusCode,
    reply::{json, with_header, with_status},
    Rejection, Reply,
};

use crate::{
    actions,
    cache::cache::{revoke_session, CacheKeyType, RedisValue},
    constants::SHOPPING_LIST_FILENAME,
    error::{Error, HttpError},
    filters::{ingredient_prefix, recipes_limit, RecipeFilter},
    form::{
        validate_login, validate_new_recipe, validate_password_change, validate_profile_changes,
        validate_recipe_changes, validate_registration, LoginPayload, ProfilePayload,
        RecipePayload, RegisterPayload, SetPasswordPayload,
    },
    jwt::SessionData,
    media::{remove_image, store_image},
    pagination::Page,
    permissions::require_session,
    report::{aggregate, render_shopping_list},
    schema::{Ingredient, Membership, Tag, Uuid},
};

use super::{
    serializers::{
        RecipeSerializer, RecipeShortSerializer, RegisteredUserSerializer,
        SubscriptionSerializer, TokenSerializer, UserSerializer,
    },
    state::AppState,
};

type Query = Vec<(String, String)>;

fn no_content() -> impl Reply {
    with_status(warp::reply(), StatusCode::NO_CONTENT)
}

fn viewer(session: &Option<SessionData>) -> Option<Uuid> {
    session.as_ref().map(|session| session.user_id)
}

// Recipes

async fn read_recipe(id: Uuid, viewer: Option<Uuid>, state: &AppState) -> Result<RecipeSerializer, Error> {
    let details = actions::get_recipe_details(id, viewer, &state.pool)
        .await?
        .ok_or_else(|| HttpError::NotFound.new("No recipe exists with specified id"))?;

    Ok(RecipeSerializer::new(details, &state.config.media_url))
}

pub async fn list_recipes(
    query: Query,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let filter = RecipeFilter::from_query(&query)?;
    let page = Page::from_query("/api/recipes/", &query);

    let recipes = actions::list_recipes(&filter, viewer(&session), &page, &state.pool).await?;

    Ok(json(&recipes.map(|details| {
        RecipeSerializer::new(details, &state.config.media_url)
    })))
}

pub async fn get_recipe(
    id: Uuid,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    Ok(json(&read_recipe(id, viewer(&session), &state).await?))
}

pub async fn create_recipe(
    session: SessionData,
    payload: RecipePayload,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let recipe = validate_new_recipe(payload)?;
    actions::check_recipe_references(&recipe.ingredient_ids(), &recipe.tags, &state.pool).await?;

    let image = store_image(&state.config.media_root, &recipe.image).await?;
    let id = match actions::create_recipe(session.user_id, &recipe, &image, &state.pool).await {
        Ok(id) => id,
        Err(e) => {
            remove_image(&state.config.media_root, &image).await;
            return Err(e.into());
        }
    };

    log::info!("> User {} created recipe {id}", session.user_id);
    let recipe = read_recipe(id, Some(session.user_id), &state).await?;

    Ok(with_status(json(&recipe), StatusCode::CREATED))
}

pub async fn update_recipe(
    id: Uuid,
    session: SessionData,
    payload: RecipePayload,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let recipe = actions::get_recipe_mut(id, &session, &state.pool).await?;

    let changes = validate_recipe_changes(payload)?;
    actions::check_recipe_references(
        &changes.ingredient_ids(),
        changes.tags.as_deref().unwrap_or_default(),
        &state.pool,
    )
    .await?;

    let image = match &changes.image {
        Some(image) => Some(store_image(&state.config.media_root, image).await?),
        None => None,
    };

    if let Err(e) = actions::update_recipe(id, &changes, image.as_deref(), &state.pool).await {
        if let Some(image) = &image {
            remove_image(&state.config.media_root, image).await;
        }
        return Err(e.into());
    }

    if image.is_some() {
        remove_image(&state.config.media_root, &recipe.image).await;
    }

    Ok(json(&read_recipe(id, Some(session.user_id), &state).await?))
}

pub async fn delete_recipe(
    id: Uuid,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    let recipe = actions::get_recipe_mut(id, &session, &state.pool).await?;

    actions::delete_recipe(recipe.id, &state.pool).await?;
    remove_image(&state.config.media_root, &recipe.image).await;

    log::info!("> User {} deleted recipe {id}", session.user_id);
    Ok(no_content())
}

pub async fn add_membership(
    id: Uuid,
    membership: Membership,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    let recipe = actions::add_membership(membership, id, session.user_id, &state.pool).await?;

    Ok(with_status(
        json(&RecipeShortSerializer::new(recipe, &state.config.media_url)),
        StatusCode::CREATED,
    ))
}

pub async fn remove_membership(
    id: Uuid,
    membership: Membership,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    actions::remove_membership(membership, id, session.user_id, &state.pool).await?;

    Ok(no_content())
}

pub async fn download_shopping_cart(
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    let lines = aggregate(actions::list_shopping_list_parts(session.user_id, &state.pool).await?);

    let font = state.config.pdf_font.clone();
    let pdf = tokio::task::spawn_blocking(move || render_shopping_list(&lines, font.as_deref()))
        .await
        .map_err(|e| HttpError::InternalServerError.new(&format!("Report task failed: {e}")))??;

    let reply = with_header(pdf, "content-type", "application/pdf");
    Ok(with_header(
        reply,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    ))
}

// Catalog

pub async fn list_tags(state: AppState) -> Result<impl Reply, Rejection> {
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let tags = RedisValue::<Vec<Tag>>::get_or(CacheKeyType::Tags.new("all"), &mut cache, move || async move {
        actions::list_tags(&pool).await
    })
    .await?;

    Ok(json(&tags.value))
}

pub async fn get_tag(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let tag = RedisValue::<Tag>::get_or_optional(CacheKeyType::Tag.new(id), &mut cache, move || async move {
        actions::get_tag(id, &pool).await
    })
    .await?
    .ok_or_else(|| HttpError::NotFound.new("Tag not found"))?;

    Ok(json(&tag.value))
}

pub async fn list_ingredients(query: Query, state: AppState) -> Result<impl Reply, Rejection> {
    let prefix = ingredient_prefix(&query);
    let key = CacheKeyType::IngredientSearch.new(prefix.as_deref().unwrap_or_default().to_lowercase());
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let ingredients = RedisValue::<Vec<Ingredient>>::get_or(key, &mut cache, move || async move {
        actions::search_ingredients(prefix.as_deref(), &pool).await
    })
    .await?;

    Ok(json(&ingredients.value))
}

pub async fn get_ingredient(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let ingredient = RedisValue::<Ingredient>::get_or_optional(
        CacheKeyType::Ingredient.new(id),
        &mut cache,
        move || async move { actions::get_ingredient(id, &pool).await },
    )
    .await?
    .ok_or_else(|| HttpError::NotFound.new("Ingredient not found"))?;

    Ok(json(&ingredient.value))
}

// Users

pub async fn list_users(
    query: Query,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let page = Page::from_query("/api/users/", &query);
    let users = actions::list_users(viewer(&session), &page, &state.pool).await?;

    Ok(json(&users.map(UserSerializer::from)))
}

pub async fn register(payload: RegisterPayload, state: AppState) -> Result<impl Reply, Rejection> {
    let user = validate_registration(payload)?;
    let user = actions::register_user(&user, &state.pool).await?;

    log::info!("> Registered user {}", user.id);
    Ok(with_status(
        json(&RegisteredUserSerializer::from(user)),
        StatusCode::CREATED,
    ))
}

async fn read_user(id: Uuid, viewer: Option<Uuid>, state: &AppState) -> Result<UserSerializer, Error> {
    actions::get_user_row(id, viewer, &state.pool)
        .await?
        .map(UserSerializer::from)
        .ok_or_else(|| HttpError::NotFound.new("User not found"))
}

pub async fn get_user(
    id: Uuid,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    Ok(json(&read_user(id, viewer(&session), &state).await?))
}

pub async fn me(session: Option<SessionData>, state: AppState) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;

    Ok(json(&read_user(session.user_id, Some(session.user_id), &state).await?))
}

pub async fn update_me(
    session: SessionData,
    payload: ProfilePayload,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let changes = validate_profile_changes(payload)?;
    actions::update_user_profile(session.user_id, &changes, &state.pool).await?;

    Ok(json(&read_user(session.user_id, Some(session.user_id), &state).await?))
}

pub async fn set_password(
    session: SessionData,
    payload: SetPasswordPayload,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let (current, new) = validate_password_change(payload)?;
    actions::set_password(session.user_id, &current, &new, &state.pool).await?;

    Ok(no_content())
}

// Subscriptions

pub async fn list_subscriptions(
    query: Query,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    let limit = recipes_limit(&query)?;
    let page = Page::from_query("/api/users/subscriptions/", &query);

    let authors = actions::list_subscriptions(session.user_id, &page, &state.pool).await?;
    let ids: Vec<Uuid> = authors.results.iter().map(|author| author.id).collect();
    let recipes = actions::list_author_recipes(&ids, limit, &state.pool).await?;

    let mut by_author = SubscriptionSerializer::recipes_by_author(recipes, &state.config.media_url);

    Ok(json(&authors.map(|author| {
        SubscriptionSerializer::new(author, &mut by_author)
    })))
}

pub async fn subscribe(
    id: Uuid,
    query: Query,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    let limit = recipes_limit(&query)?;
    actions::follow_user(session.user_id, id, &state.pool).await?;

    let author = actions::get_subscription(session.user_id, id, &state.pool)
        .await?
        .ok_or_else(|| HttpError::NotFound.new("User not found"))?;
    let recipes = actions::list_author_recipes(&[id], limit, &state.pool).await?;

    let mut by_author = SubscriptionSerializer::recipes_by_author(recipes, &state.config.media_url);
    let subscription = SubscriptionSerializer::new(author, &mut by_author);

    Ok(with_status(json(&subscription), StatusCode::CREATED))
}

pub async fn unsubscribe(
    id: Uuid,
    session: Option<SessionData>,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    actions::unfollow_user(session.user_id, id, &state.pool).await?;

    Ok(no_content())
}

// Sessions

pub async fn login(payload: LoginPayload, state: AppState) -> Result<impl Reply, Rejection> {
    let (email, password) = validate_login(payload)?;

    let auth_token = actions::login_user(
        &email,
        &password,
        state.config.jwt_secret.as_bytes(),
        Duration::hours(state.config.token_lifetime_hours),
        &state.pool,
    )
    .await?;

    Ok(json(&TokenSerializer { auth_token }))
}

pub async fn logout(session: Option<SessionData>, state: AppState) -> Result<impl Reply, Rejection> {
    let session = require_session(session)?;
    let mut cache = state.cache.clone();

    revoke_session(&session.token_id, session.remaining_lifetime(), &mut cache).await?;

    log::info!("> User {} logged out", session.user_id);
    Ok(no_content())
}
