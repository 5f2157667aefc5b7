use std::sync::Arc;

use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    reply::{self, Reply, Response},
};

use crate::{
    actions,
    composition::Membership,
    jwt::SessionData,
    pagination::PageQuery,
    permissions::ActionType,
    schema::{
        AuthToken, Credentials, Id, IngredientSearch, NewUser, PasswordChange, RecipeFilter,
        RecipePatch, RecipePayload, SubscriptionQuery,
    },
    State, SHOPPING_LIST_FILENAME,
};

type HandlerResult = Result<Response, Rejection>;

fn viewer_of(session: &Option<SessionData>) -> Option<Id> {
    session.as_ref().map(|session| session.user_id)
}

fn created<T: serde::Serialize>(body: &T) -> Response {
    reply::with_status(reply::json(body), StatusCode::CREATED).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub async fn list_users(
    query: PageQuery,
    session: Option<SessionData>,
    state: Arc<State>,
) -> HandlerResult {
    let page = actions::fetch_users(viewer_of(&session), query, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&page).into_response())
}

pub async fn register(user: NewUser, state: Arc<State>) -> HandlerResult {
    let user = actions::register_user(user, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(created(&user))
}

pub async fn get_user(
    user_id: Id,
    session: Option<SessionData>,
    state: Arc<State>,
) -> HandlerResult {
    let profile = actions::get_profile(user_id, viewer_of(&session), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&profile).into_response())
}

pub async fn me(session: SessionData, state: Arc<State>) -> HandlerResult {
    let profile = actions::get_profile(session.user_id, Some(session.user_id), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&profile).into_response())
}

pub async fn set_password(
    session: SessionData,
    change: PasswordChange,
    state: Arc<State>,
) -> HandlerResult {
    actions::set_password(session.user_id, &change, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(no_content())
}

pub async fn login(credentials: Credentials, state: Arc<State>) -> HandlerResult {
    let auth_token = actions::issue_token(
        &credentials,
        &state.config.secret,
        state.config.token_ttl,
        &state.pool,
    )
    .await
    .map_err(reject::custom)?;

    Ok(reply::json(&AuthToken { auth_token }).into_response())
}

pub async fn logout(session: SessionData, state: Arc<State>) -> HandlerResult {
    actions::revoke_tokens(session.user_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(no_content())
}

pub async fn list_subscriptions(
    query: SubscriptionQuery,
    session: SessionData,
    state: Arc<State>,
) -> HandlerResult {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    };

    let subscriptions =
        actions::list_subscriptions(session.user_id, query.recipes_limit, page, &state.pool)
            .await
            .map_err(reject::custom)?;

    Ok(reply::json(&subscriptions).into_response())
}

pub async fn subscribe(
    author_id: Id,
    query: SubscriptionQuery,
    session: SessionData,
    state: Arc<State>,
) -> HandlerResult {
    let subscription =
        actions::subscribe(session.user_id, author_id, query.recipes_limit, &state.pool)
            .await
            .map_err(reject::custom)?;

    Ok(created(&subscription))
}

pub async fn unsubscribe(author_id: Id, session: SessionData, state: Arc<State>) -> HandlerResult {
    actions::unsubscribe(session.user_id, author_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(no_content())
}

pub async fn list_tags(state: Arc<State>) -> HandlerResult {
    let tags = actions::list_tags(&state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&tags).into_response())
}

pub async fn get_tag(tag_id: Id, state: Arc<State>) -> HandlerResult {
    let tag = actions::get_tag(tag_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&tag).into_response())
}

pub async fn list_ingredients(search: IngredientSearch, state: Arc<State>) -> HandlerResult {
    let ingredients = actions::list_ingredients(search.name.as_deref(), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&ingredients).into_response())
}

pub async fn get_ingredient(ingredient_id: Id, state: Arc<State>) -> HandlerResult {
    let ingredient = actions::get_ingredient(ingredient_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&ingredient).into_response())
}

pub async fn list_recipes(
    pairs: Vec<(String, String)>,
    query: PageQuery,
    session: Option<SessionData>,
    state: Arc<State>,
) -> HandlerResult {
    let filter = RecipeFilter::from_query(&pairs).map_err(reject::custom)?;

    let page = actions::fetch_recipes(&filter, viewer_of(&session), query, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&page).into_response())
}

pub async fn get_recipe(
    recipe_id: Id,
    session: Option<SessionData>,
    state: Arc<State>,
) -> HandlerResult {
    let recipe = actions::get_recipe_detail(recipe_id, viewer_of(&session), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&recipe).into_response())
}

pub async fn create_recipe(
    session: SessionData,
    payload: RecipePayload,
    state: Arc<State>,
) -> HandlerResult {
    // Reject bad drafts before anything lands on disk.
    payload.validate().map_err(reject::custom)?;

    let image = state
        .images
        .save(&payload.image)
        .await
        .map_err(reject::custom)?;

    let recipe_id =
        match actions::create_recipe(session.user_id, &payload, image.clone(), &state.pool).await {
            Ok(recipe_id) => recipe_id,
            Err(e) => {
                state.images.discard(&image).await;
                return Err(reject::custom(e));
            }
        };

    let recipe = actions::get_recipe_detail(recipe_id, Some(session.user_id), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(created(&recipe))
}

pub async fn update_recipe(
    recipe_id: Id,
    session: SessionData,
    patch: RecipePatch,
    state: Arc<State>,
) -> HandlerResult {
    let recipe = actions::get_recipe(recipe_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    ActionType::UpdateRecipe
        .authenticate(&session, recipe.author_id)
        .map_err(reject::custom)?;

    patch.validate().map_err(reject::custom)?;

    let image = match &patch.image {
        Some(data) => Some(state.images.save(data).await.map_err(reject::custom)?),
        None => None,
    };

    if let Err(e) = actions::update_recipe(recipe_id, &patch, image.clone(), &state.pool).await {
        if let Some(image) = &image {
            state.images.discard(image).await;
        }
        return Err(reject::custom(e));
    }

    let recipe = actions::get_recipe_detail(recipe_id, Some(session.user_id), &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(reply::json(&recipe).into_response())
}

pub async fn delete_recipe(recipe_id: Id, session: SessionData, state: Arc<State>) -> HandlerResult {
    let recipe = actions::get_recipe(recipe_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    ActionType::DeleteRecipe
        .authenticate(&session, recipe.author_id)
        .map_err(reject::custom)?;

    actions::delete_recipe(recipe_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(no_content())
}

pub async fn add_to_relation(
    recipe_id: Id,
    relation: Membership,
    session: SessionData,
    state: Arc<State>,
) -> HandlerResult {
    let recipe = actions::add_membership(relation, session.user_id, recipe_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(created(&recipe))
}

pub async fn remove_from_relation(
    recipe_id: Id,
    relation: Membership,
    session: SessionData,
    state: Arc<State>,
) -> HandlerResult {
    actions::remove_membership(relation, session.user_id, recipe_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    Ok(no_content())
}

pub async fn download_shopping_cart(session: SessionData, state: Arc<State>) -> HandlerResult {
    let body = actions::download_shopping_list(session.user_id, &state.pool)
        .await
        .map_err(reject::custom)?;

    let response = reply::with_header(body, "content-type", "text/plain; charset=UTF-8");
    let response = reply::with_header(
        response,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    );

    Ok(response.into_response())
}

