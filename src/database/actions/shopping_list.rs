use sqlx::{Pool, Postgres};

use crate::{
    composition::{aggregate_cart, render_shopping_list},
    error::ApiError,
    schema::{CartLine, Id, ShoppingListEntry},
};

/// Every ingredient line of every recipe in the user's cart, unaggregated.
pub async fn list_cart_lines(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<CartLine>, ApiError> {
    let rows: Vec<CartLine> = sqlx::query_as(
        "
        SELECT i.id AS ingredient_id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM shopping_cart sc
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn build_shopping_list(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListEntry>, ApiError> {
    let lines = list_cart_lines(user_id, pool).await?;
    Ok(aggregate_cart(lines))
}

/// The shopping list as the body of a text attachment.
pub async fn download_shopping_list(user_id: Id, pool: &Pool<Postgres>) -> Result<String, ApiError> {
    let entries = build_shopping_list(user_id, pool).await?;

    log::debug!(
        "Built shopping list of {} entries for user {user_id}",
        entries.len()
    );

    Ok(render_shopping_list(&entries))
}
