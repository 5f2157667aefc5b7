use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::ApiError,
    schema::{Id, Ingredient},
};

/// Escapes LIKE wildcards so user input only ever matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Lists ingredients, optionally only those whose name starts with
/// `name_prefix` (case-insensitive).
pub async fn list_ingredients(
    name_prefix: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows: Vec<Ingredient> = match name_prefix.filter(|prefix| !prefix.is_empty()) {
        Some(prefix) => {
            sqlx::query_as("SELECT * FROM ingredients WHERE name ILIKE $1 || '%' ORDER BY name, id")
                .bind(escape_like(prefix))
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM ingredients ORDER BY name, id")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Ingredient, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| ApiError::not_found("No ingredient exists with specified id"))
}

/// Fails with a validation error naming the first id that has no ingredient.
pub async fn ensure_ingredients_exist(ids: &[Id], conn: &mut PgConnection) -> Result<(), ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    if let Some(missing) = ids.iter().find(|id| !found.iter().any(|(f,)| f == *id)) {
        return Err(ApiError::validation(format!(
            "ingredients: no ingredient with id {missing}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_are_escaped() {
        assert_eq!(escape_like("sal"), "sal");
        assert_eq!(escape_like("100%_\\"), "100\\%\\_\\\\");
    }
}
