use std::convert::Infallible;

use serde::de::DeserializeOwned;
use warp::{Filter, Rejection, Reply};

use crate::{
    constants::MAX_REQUEST_BODY,
    middleware::{with_possible_session, with_session},
    schema::{Membership, Uuid},
};

use super::{
    handlers,
    rejection::handle_rejection,
    state::{with_state, AppState},
};

type Query = Vec<(String, String)>;

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_REQUEST_BODY).and(warp::body::json())
}

fn query() -> impl Filter<Extract = (Query,), Error = Rejection> + Clone {
    warp::query::<Query>()
}

fn membership(
    membership: Membership,
) -> impl Filter<Extract = (Membership,), Error = Infallible> + Clone {
    warp::any().map(move || membership)
}

fn recipes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let session = with_possible_session(state.clone());
    let signed_in = with_session(state.clone());
    let state = with_state(state);

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(query())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(signed_in.clone())
        .and(json_body())
        .and(state.clone())
        .and_then(handlers::create_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::download_shopping_cart);

    let get = warp::path!("recipes" / Uuid)
        .and(warp::get())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::get_recipe);

    let update = warp::path!("recipes" / Uuid)
        .and(warp::patch())
        .and(signed_in)
        .and(json_body())
        .and(state.clone())
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Uuid)
        .and(warp::delete())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::delete_recipe);

    let favorite = warp::path!("recipes" / Uuid / "favorite").and(membership(Membership::Favorites));
    let cart =
        warp::path!("recipes" / Uuid / "shopping_cart").and(membership(Membership::ShoppingCart));
    let member = favorite.or(cart).unify();

    let add = member
        .clone()
        .and(warp::post())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::add_membership);

    let remove = member
        .and(warp::delete())
        .and(session)
        .and(state)
        .and_then(handlers::remove_membership);

    list.or(create)
        .or(download)
        .or(get)
        .or(update)
        .or(delete)
        .or(add)
        .or(remove)
}

fn catalog(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let state = with_state(state);

    let tags = warp::path!("tags")
        .and(warp::get())
        .and(state.clone())
        .and_then(handlers::list_tags);

    let tag = warp::path!("tags" / Uuid)
        .and(warp::get())
        .and(state.clone())
        .and_then(handlers::get_tag);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(query())
        .and(state.clone())
        .and_then(handlers::list_ingredients);

    let ingredient = warp::path!("ingredients" / Uuid)
        .and(warp::get())
        .and(state)
        .and_then(handlers::get_ingredient);

    tags.or(tag).or(ingredients).or(ingredient)
}

fn users(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let session = with_possible_session(state.clone());
    let signed_in = with_session(state.clone());
    let state = with_state(state);

    let list = warp::path!("users")
        .and(warp::get())
        .and(query())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::list_users);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(state.clone())
        .and_then(handlers::register);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::me);

    let update_me = warp::path!("users" / "me")
        .and(warp::patch())
        .and(signed_in.clone())
        .and(json_body())
        .and(state.clone())
        .and_then(handlers::update_me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(signed_in)
        .and(json_body())
        .and(state.clone())
        .and_then(handlers::set_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(query())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::list_subscriptions);

    let get = warp::path!("users" / Uuid)
        .and(warp::get())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::get_user);

    let subscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::post())
        .and(query())
        .and(session.clone())
        .and(state.clone())
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(session)
        .and(state)
        .and_then(handlers::unsubscribe);

    list.or(register)
        .or(me)
        .or(update_me)
        .or(set_password)
        .or(subscriptions)
        .or(get)
        .or(subscribe)
        .or(unsubscribe)
}

fn auth(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let session = with_possible_session(state.clone());
    let state = with_state(state);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(state.clone())
        .and_then(handlers::login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(session)
        .and(state)
        .and_then(handlers::logout);

    login.or(logout)
}

/// The whole service: JSON API under `/api`, stored images under `/media`.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let media = warp::path("media").and(warp::fs::dir(state.config.media_root.clone()));

    let api = warp::path("api").and(
        recipes(state.clone())
            .or(catalog(state.clone()))
            .or(users(state.clone()))
            .or(auth(state)),
    );

    api.or(media)
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}
