use std::collections::{HashMap, HashSet};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    composition::Membership,
    error::ApiError,
    pagination::{Page, PageQuery},
    schema::{
        Id, IngredientAmount, Recipe, RecipeDetail, RecipeFilter, RecipeIngredientLine,
        RecipePatch, RecipePayload, ShortRecipe, Tag, UserProfile,
    },
    RECIPE_COUNT_PER_PAGE,
};

use super::{
    ensure_ingredients_exist, ensure_tags_exist, get_profiles, list_tags_by_recipe,
    member_recipes, replace_recipe_tags,
};

fn parse_flag(key: &str, value: &str) -> Result<bool, ApiError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ApiError::validation(format!("{key}: expected 0 or 1"))),
    }
}

impl RecipeFilter {
    /// Builds a filter from raw query pairs; `tags` may repeat.
    pub fn from_query(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut filter = RecipeFilter::default();

        for (key, value) in pairs {
            match key.as_str() {
                "tags" => filter.tags.push(value.to_owned()),
                "author" => {
                    filter.author = Some(
                        value
                            .parse()
                            .map_err(|_| ApiError::validation("author: expected a user id"))?,
                    )
                }
                "is_favorited" => filter.is_favorited = parse_flag(key, value)?,
                "is_in_shopping_cart" => filter.is_in_shopping_cart = parse_flag(key, value)?,
                _ => {}
            }
        }

        Ok(filter)
    }
}

/// Bulk-inserts one line per pair.
async fn insert_recipe_lines(
    recipe_id: Id,
    lines: &[IngredientAmount],
    conn: &mut PgConnection,
) -> Result<u64, ApiError> {
    if lines.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    builder.push_values(lines, |mut row, line| {
        row.push_bind(recipe_id)
            .push_bind(line.id)
            .push_bind(line.amount);
    });

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Swaps the recipe's whole ingredient list for `lines`.
pub async fn replace_recipe_lines(
    recipe_id: Id,
    lines: &[IngredientAmount],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await?;

    insert_recipe_lines(recipe_id, lines, conn).await?;

    Ok(())
}

/// Creates a recipe together with its tags and ingredient lines. Either all
/// of it is stored or none of it.
pub async fn create_recipe(
    author_id: Id,
    payload: &RecipePayload,
    image: String,
    pool: &Pool<Postgres>,
) -> Result<Id, ApiError> {
    payload.validate()?;

    let ingredient_ids: Vec<Id> = payload.ingredients.iter().map(|line| line.id).collect();

    let mut tr = pool.begin().await?;

    ensure_tags_exist(&payload.tags, &mut tr).await?;
    ensure_ingredients_exist(&ingredient_ids, &mut tr).await?;

    let (recipe_id,): (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&payload.name)
    .bind(image)
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .fetch_one(&mut *tr)
    .await?;

    replace_recipe_tags(recipe_id, &payload.tags, &mut tr).await?;
    insert_recipe_lines(recipe_id, &payload.ingredients, &mut tr).await?;

    tr.commit().await?;

    log::debug!("Created recipe {recipe_id} for user {author_id}");

    Ok(recipe_id)
}

/// Applies a partial update. Supplied tags and ingredients replace the
/// current ones wholesale; everything runs in one transaction.
/// ATTENTION: DOES NOT CHECK FOR AUTHORSHIP BY ITSELF
pub async fn update_recipe(
    recipe_id: Id,
    patch: &RecipePatch,
    image: Option<String>,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    patch.validate()?;

    let mut tr = pool.begin().await?;

    let locked: Option<(Id,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(recipe_id)
        .fetch_optional(&mut *tr)
        .await?;
    if locked.is_none() {
        return Err(ApiError::not_found("No recipe exists with specified id"));
    }

    sqlx::query(
        "
        UPDATE recipes SET
        name = COALESCE($1, name),
        image = COALESCE($2, image),
        text = COALESCE($3, text),
        cooking_time = COALESCE($4, cooking_time)
        WHERE id = $5
    ",
    )
    .bind(&patch.name)
    .bind(image)
    .bind(&patch.text)
    .bind(patch.cooking_time)
    .bind(recipe_id)
    .execute(&mut *tr)
    .await?;

    if let Some(tags) = &patch.tags {
        ensure_tags_exist(tags, &mut tr).await?;
        replace_recipe_tags(recipe_id, tags, &mut tr).await?;
    }

    if let Some(lines) = &patch.ingredients {
        let ingredient_ids: Vec<Id> = lines.iter().map(|line| line.id).collect();
        ensure_ingredients_exist(&ingredient_ids, &mut tr).await?;
        replace_recipe_lines(recipe_id, lines, &mut tr).await?;
    }

    tr.commit().await?;

    log::debug!("Updated recipe {recipe_id}");

    Ok(())
}

/// ATTENTION: DOES NOT CHECK FOR AUTHORSHIP BY ITSELF
pub async fn delete_recipe(recipe_id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("No recipe exists with specified id"));
    }

    log::debug!("Deleted recipe {recipe_id}");

    Ok(())
}

pub async fn get_recipe(recipe_id: Id, pool: &Pool<Postgres>) -> Result<Recipe, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| ApiError::not_found("No recipe exists with specified id"))
}

pub async fn get_short_recipe(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, ApiError> {
    let row: Option<ShortRecipe> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(|| ApiError::not_found("No recipe exists with specified id"))
}

pub async fn list_recipe_lines(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeIngredientLine>, ApiError> {
    let rows: Vec<RecipeIngredientLine> = sqlx::query_as(
        "
        SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name, i.id
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Newest first, at most `limit` of them.
pub async fn list_author_recipes(
    author_id: Id,
    limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShortRecipe>, ApiError> {
    let rows: Vec<ShortRecipe> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    .bind(limit.map(|limit| limit.max(0)))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn count_author_recipes(author_id: Id, pool: &Pool<Postgres>) -> Result<i64, ApiError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

#[derive(sqlx::FromRow)]
struct RecipeLine {
    recipe_id: Id,
    #[sqlx(flatten)]
    line: RecipeIngredientLine,
}

/// Ingredient lines of every recipe in `recipe_ids`, keyed by recipe.
pub async fn list_lines_by_recipe(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<HashMap<Id, Vec<RecipeIngredientLine>>, ApiError> {
    let rows: Vec<RecipeLine> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.recipe_id, i.name, i.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Id, Vec<RecipeIngredientLine>> = HashMap::new();
    for row in rows {
        grouped.entry(row.recipe_id).or_default().push(row.line);
    }

    Ok(grouped)
}

/// Everything a page of recipes refers to, loaded in one query per kind.
#[derive(Debug, Default)]
struct RecipeContext {
    authors: HashMap<Id, UserProfile>,
    tags: HashMap<Id, Vec<Tag>>,
    lines: HashMap<Id, Vec<RecipeIngredientLine>>,
    favorites: HashSet<Id>,
    cart: HashSet<Id>,
}

impl RecipeContext {
    async fn load(
        recipes: &[Recipe],
        viewer: Option<Id>,
        pool: &Pool<Postgres>,
    ) -> Result<Self, ApiError> {
        let recipe_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
        let mut author_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let authors = get_profiles(&author_ids, viewer, pool)
            .await?
            .into_iter()
            .map(|profile| (profile.id, profile))
            .collect();

        let (favorites, cart) = match viewer {
            Some(user_id) => (
                member_recipes(Membership::Favorite, user_id, &recipe_ids, pool).await?,
                member_recipes(Membership::ShoppingCart, user_id, &recipe_ids, pool).await?,
            ),
            None => (HashSet::new(), HashSet::new()),
        };

        Ok(Self {
            authors,
            tags: list_tags_by_recipe(&recipe_ids, pool).await?,
            lines: list_lines_by_recipe(&recipe_ids, pool).await?,
            favorites,
            cart,
        })
    }

    fn detail(&mut self, recipe: Recipe) -> Result<RecipeDetail, ApiError> {
        let author = self
            .authors
            .get(&recipe.author_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("No user exists with specified id"))?;

        Ok(RecipeDetail {
            id: recipe.id,
            tags: self.tags.remove(&recipe.id).unwrap_or_default(),
            author,
            ingredients: self.lines.remove(&recipe.id).unwrap_or_default(),
            is_favorited: self.favorites.contains(&recipe.id),
            is_in_shopping_cart: self.cart.contains(&recipe.id),
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        })
    }
}

async fn recipe_details(
    recipes: Vec<Recipe>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, ApiError> {
    let mut context = RecipeContext::load(&recipes, viewer, pool).await?;

    recipes
        .into_iter()
        .map(|recipe| context.detail(recipe))
        .collect()
}

pub async fn get_recipe_detail(
    recipe_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, ApiError> {
    let recipe = get_recipe(recipe_id, pool).await?;

    recipe_details(vec![recipe], viewer, pool)
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("No recipe exists with specified id"))
}

fn push_recipe_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    filter: &RecipeFilter,
    viewer: Option<Id>,
) {
    builder.push(" WHERE TRUE");

    if !filter.tags.is_empty() {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(author) = filter.author {
        builder.push(" AND r.author_id = ").push_bind(author);
    }

    for (wanted, relation) in [
        (filter.is_favorited, Membership::Favorite),
        (filter.is_in_shopping_cart, Membership::ShoppingCart),
    ] {
        if !wanted {
            continue;
        }

        // Anonymous callers have neither favorites nor a cart.
        match viewer {
            Some(user_id) => {
                builder
                    .push(format!(
                        " AND EXISTS (SELECT 1 FROM {} m WHERE m.recipe_id = r.id AND m.user_id = ",
                        relation.table()
                    ))
                    .push_bind(user_id)
                    .push(")");
            }
            None => {
                builder.push(" AND FALSE");
            }
        }
    }
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Id>,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<RecipeDetail>, ApiError> {
    let mut count_query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
    push_recipe_filters(&mut count_query, filter, viewer);
    let count: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    if count == 0 {
        return Ok(Page::no_rows());
    }

    let mut select: QueryBuilder<Postgres> = QueryBuilder::new("SELECT r.* FROM recipes r");
    push_recipe_filters(&mut select, filter, viewer);
    select
        .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
        .push_bind(query.limit(RECIPE_COUNT_PER_PAGE))
        .push(" OFFSET ")
        .push_bind(query.offset(RECIPE_COUNT_PER_PAGE));

    let recipes: Vec<Recipe> = select.build_query_as().fetch_all(pool).await?;
    let results = recipe_details(recipes, viewer, pool).await?;

    Ok(Page::from_rows(results, count, query, RECIPE_COUNT_PER_PAGE))
}
