use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    pagination::{Page, PageQuery},
    schema::{Id, Subscription, UserProfile},
    USER_COUNT_PER_PAGE,
};

use super::{count_author_recipes, get_profile, list_author_recipes};

/// Nobody may follow themselves, whatever the current relation state.
pub fn check_follow_target(user_id: Id, author_id: Id) -> Result<(), ApiError> {
    if user_id == author_id {
        return Err(ApiError::validation("You cannot subscribe to yourself"));
    }
    Ok(())
}

async fn subscription_of(
    author: UserProfile,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, ApiError> {
    let recipes = list_author_recipes(author.id, recipes_limit, pool).await?;
    let recipes_count = count_author_recipes(author.id, pool).await?;

    Ok(Subscription {
        id: author.id,
        email: author.email,
        username: author.username,
        first_name: author.first_name,
        last_name: author.last_name,
        is_subscribed: author.is_subscribed,
        recipes,
        recipes_count,
    })
}

pub async fn subscribe(
    user_id: Id,
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, ApiError> {
    check_follow_target(user_id, author_id)?;

    get_profile(author_id, Some(user_id), pool).await?;

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("You are already subscribed to this user"));
    }

    log::debug!("User {user_id} subscribed to {author_id}");

    let author = get_profile(author_id, Some(user_id), pool).await?;
    subscription_of(author, recipes_limit, pool).await
}

pub async fn unsubscribe(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("You are not subscribed to this user"));
    }

    Ok(())
}

/// Authors `user_id` follows, each with a preview of their newest recipes.
pub async fn list_subscriptions(
    user_id: Id,
    recipes_limit: Option<i64>,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<Subscription>, ApiError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Ok(Page::no_rows());
    }

    let authors: Vec<UserProfile> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, TRUE AS is_subscribed
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(query.limit(USER_COUNT_PER_PAGE))
    .bind(query.offset(USER_COUNT_PER_PAGE))
    .fetch_all(pool)
    .await?;

    let mut results = Vec::with_capacity(authors.len());
    for author in authors {
        results.push(subscription_of(author, recipes_limit, pool).await?);
    }

    Ok(Page::from_rows(results, count, query, USER_COUNT_PER_PAGE))
}
