use std::{convert::Infallible, sync::Arc};

use potion::Error;
use serde::de::DeserializeOwned;
use serde_json::json;
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, Rejection,
        UnsupportedMediaType,
    },
    Filter, Reply,
};

use crate::{
    api::{
        handlers,
        state::{with_state, State},
    },
    composition::Membership,
    error::ApiError,
    middleware::{with_possible_session, with_session},
    pagination::PageQuery,
    schema::{Id, IngredientSearch, SubscriptionQuery},
    MAX_BODY_BYTES,
};

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn with_relation(
    relation: Membership,
) -> impl Filter<Extract = (Membership,), Error = Infallible> + Clone {
    warp::any().map(move || relation)
}

fn users(state: Arc<State>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("users")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_users);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::register);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::set_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(warp::query::<SubscriptionQuery>())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_subscriptions);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post())
        .and(warp::query::<SubscriptionQuery>())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::unsubscribe);

    let profile = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_possible_session(state.clone()))
        .and(with_state(state))
        .and_then(handlers::get_user);

    list.or(register)
        .or(me)
        .or(set_password)
        .or(subscriptions)
        .or(subscribe)
        .or(unsubscribe)
        .or(profile)
}

fn auth(state: Arc<State>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(with_state(state))
        .and_then(handlers::logout);

    login.or(logout)
}

fn reference_data(
    state: Arc<State>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_tags);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_tag);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<IngredientSearch>())
        .and(with_state(state.clone()))
        .and_then(handlers::list_ingredients);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_ingredient);

    tags.or(tag).or(ingredients).or(ingredient)
}

fn recipes(state: Arc<State>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(warp::query::<PageQuery>())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::download_shopping_cart);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_recipe);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_recipe);

    let favorite = membership("favorite", Membership::Favorite, state.clone());
    let shopping_cart = membership("shopping_cart", Membership::ShoppingCart, state);

    list.or(create)
        .or(download)
        .or(detail)
        .or(update)
        .or(delete)
        .or(favorite)
        .or(shopping_cart)
}

/// `POST` adds the recipe to the relation, `DELETE` removes it.
fn membership(
    segment: &'static str,
    relation: Membership,
    state: Arc<State>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let path = warp::path("recipes")
        .and(warp::path::param::<Id>())
        .and(warp::path(segment))
        .and(warp::path::end());

    let add = path
        .clone()
        .and(warp::post())
        .and(with_relation(relation))
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::add_to_relation);

    let remove = path
        .and(warp::delete())
        .and(with_relation(relation))
        .and(with_session(state.clone()))
        .and(with_state(state))
        .and_then(handlers::remove_from_relation);

    add.or(remove)
}

fn error_reply(error: Error) -> warp::reply::Response {
    let status =
        StatusCode::from_u16(error.code as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    warp::reply::with_status(
        warp::reply::json(&json!({ "detail": error.info })),
        status,
    )
    .into_response()
}

async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let status_error = |code, info: &str| Error {
        code,
        info: Some(info.to_string()),
        redirect: None,
    };

    let error: Error = if let Some(e) = err.find::<ApiError>() {
        e.clone().into()
    } else if err.is_not_found() {
        status_error(404, "Not found")
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        status_error(400, &e.to_string())
    } else if err.find::<InvalidQuery>().is_some() {
        status_error(400, "Invalid query string")
    } else if err.find::<UnsupportedMediaType>().is_some() {
        status_error(415, "Expected a JSON body")
    } else if err.find::<LengthRequired>().is_some() {
        status_error(411, "Content-Length required")
    } else if err.find::<PayloadTooLarge>().is_some() {
        status_error(413, "Payload too large")
    } else if err.find::<MethodNotAllowed>().is_some() {
        status_error(405, "Method not allowed")
    } else {
        log::error!("Unhandled rejection: {err:?}");
        status_error(500, "Internal server error")
    };

    Ok(error_reply(error))
}

/// Every endpoint under `/api`, stored images under `/media`, and the
/// rejection handler that turns errors into `{"detail": ...}` bodies.
pub fn routes(state: Arc<State>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = warp::path("api").and(
        users(state.clone())
            .or(auth(state.clone()))
            .or(reference_data(state.clone()))
            .or(recipes(state.clone())),
    );

    let media = warp::path("media").and(warp::fs::dir(state.config.media_root.clone()));

    api.or(media)
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}
