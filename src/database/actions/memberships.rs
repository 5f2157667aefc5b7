use std::collections::HashSet;

use sqlx::{Pool, Postgres};

use crate::{
    composition::Membership,
    error::ApiError,
    schema::{Id, ShortRecipe},
};

use super::get_short_recipe;

/// Which of `recipe_ids` the user has in the relation.
pub async fn member_recipes(
    relation: Membership,
    user_id: Id,
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Id>, ApiError> {
    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        relation.table()
    ))
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(recipe_id,)| recipe_id).collect())
}

/// Marks the recipe for the user and returns its short form. Adding the same
/// pair twice is a conflict.
pub async fn add_membership(
    relation: Membership,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, ApiError> {
    let recipe = get_short_recipe(recipe_id, pool).await?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        relation.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(relation.already_added()));
    }

    Ok(recipe)
}

pub async fn remove_membership(
    relation: Membership,
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    get_short_recipe(recipe_id, pool).await?;

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        relation.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(relation.not_present()));
    }

    Ok(())
}
