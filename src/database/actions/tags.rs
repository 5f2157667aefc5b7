use std::collections::HashMap;

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::ApiError,
    schema::{Id, Tag},
};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Tag, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    tag.ok_or_else(|| ApiError::not_found("No tag exists with specified id"))
}

pub async fn list_recipe_tags(recipe_id: Id, pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.*
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(list)
}

#[derive(sqlx::FromRow)]
struct TaggedRecipe {
    recipe_id: Id,
    #[sqlx(flatten)]
    tag: Tag,
}

/// Tags of every recipe in `recipe_ids`, keyed by recipe.
pub async fn list_tags_by_recipe(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<Tag>>, ApiError> {
    let rows: Vec<TaggedRecipe> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY rt.recipe_id, t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Id, Vec<Tag>> = HashMap::new();
    for row in rows {
        grouped.entry(row.recipe_id).or_default().push(row.tag);
    }

    Ok(grouped)
}

pub async fn ensure_tags_exist(ids: &[Id], conn: &mut PgConnection) -> Result<(), ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    if let Some(missing) = ids.iter().find(|id| !found.iter().any(|(f,)| f == *id)) {
        return Err(ApiError::validation(format!("tags: no tag with id {missing}")));
    }

    Ok(())
}

/// Makes the recipe's tag set exactly `tag_ids`: tags outside the set are
/// detached, new ones attached, shared ones left untouched.
pub async fn replace_recipe_tags(
    recipe_id: Id,
    tag_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1 AND NOT (tag_id = ANY($2))")
        .bind(recipe_id)
        .bind(tag_ids)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "
        INSERT INTO recipe_tags (recipe_id, tag_id)
        SELECT $1, tag_id FROM UNNEST($2::INTEGER[]) AS tag_id
        ON CONFLICT DO NOTHING
    ",
    )
    .bind(recipe_id)
    .bind(tag_ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
