//! Rules that keep a recipe's ingredient lines and tags consistent, and the
//! shopping-list fold over the lines of every recipe in a user's cart.
//!
//! Nothing in here touches the database; the actions in `recipes`,
//! `memberships` and `shopping_list` run these checks before (and the fold
//! after) their queries.

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Display},
    hash::Hash,
};

use crate::{
    error::ApiError,
    schema::{CartLine, Id, IngredientAmount, RecipePatch, RecipePayload, ShoppingListEntry},
    MAX_RECIPE_NAME_LEN, MAX_RECIPE_TEXT_LEN,
};

fn has_duplicates<T: Eq + Hash>(items: impl IntoIterator<Item = T>) -> bool {
    let mut seen = HashSet::new();
    !items.into_iter().all(|item| seen.insert(item))
}

pub fn check_ingredients(lines: &[IngredientAmount]) -> Result<(), ApiError> {
    if lines.is_empty() {
        return Err(ApiError::validation(
            "ingredients: at least one ingredient is required",
        ));
    }

    if let Some(line) = lines.iter().find(|line| line.amount < 1) {
        return Err(ApiError::validation(format!(
            "ingredients: amount of ingredient {} must be at least 1",
            line.id
        )));
    }

    if has_duplicates(lines.iter().map(|line| line.id)) {
        return Err(ApiError::validation(
            "ingredients: an ingredient is listed more than once",
        ));
    }

    Ok(())
}

pub fn check_tags(tags: &[Id]) -> Result<(), ApiError> {
    if tags.is_empty() {
        return Err(ApiError::validation("tags: at least one tag is required"));
    }

    if has_duplicates(tags.iter()) {
        return Err(ApiError::validation("tags: a tag is listed more than once"));
    }

    Ok(())
}

pub fn check_cooking_time(minutes: i32) -> Result<(), ApiError> {
    if minutes < 1 {
        return Err(ApiError::validation(
            "cooking_time: must be at least 1 minute",
        ));
    }
    Ok(())
}

fn check_text(field: &str, value: &str, max_len: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field}: may not be blank")));
    }
    if value.chars().count() > max_len {
        return Err(ApiError::validation(format!(
            "{field}: at most {max_len} characters"
        )));
    }
    Ok(())
}

impl RecipePayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        check_text("name", &self.name, MAX_RECIPE_NAME_LEN)?;
        check_text("text", &self.text, MAX_RECIPE_TEXT_LEN)?;
        check_cooking_time(self.cooking_time)?;
        check_ingredients(&self.ingredients)?;
        check_tags(&self.tags)?;
        Ok(())
    }
}

impl RecipePatch {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            check_text("name", name, MAX_RECIPE_NAME_LEN)?;
        }
        if let Some(text) = &self.text {
            check_text("text", text, MAX_RECIPE_TEXT_LEN)?;
        }
        if let Some(minutes) = self.cooking_time {
            check_cooking_time(minutes)?;
        }
        if let Some(lines) = &self.ingredients {
            check_ingredients(lines)?;
        }
        if let Some(tags) = &self.tags {
            check_tags(tags)?;
        }
        Ok(())
    }
}

/// Groups cart lines by ingredient id and sums their amounts.
///
/// Two ingredients that share a display name stay separate. The result is
/// ordered by name, then id, so repeated downloads are byte-identical.
pub fn aggregate_cart(lines: impl IntoIterator<Item = CartLine>) -> Vec<ShoppingListEntry> {
    let mut totals: HashMap<Id, ShoppingListEntry> = HashMap::new();

    for line in lines {
        totals
            .entry(line.ingredient_id)
            .and_modify(|entry| entry.total_amount += i64::from(line.amount))
            .or_insert_with(|| ShoppingListEntry {
                ingredient_id: line.ingredient_id,
                total_amount: i64::from(line.amount),
                name: line.name,
                measurement_unit: line.measurement_unit,
            });
    }

    let mut entries: Vec<ShoppingListEntry> = totals.into_values().collect();
    entries.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
    });
    entries
}

impl Display for ShoppingListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} {}.",
            self.name, self.total_amount, self.measurement_unit
        )
    }
}

/// Plain-text attachment body, one ingredient per line.
pub fn render_shopping_list(entries: &[ShoppingListEntry]) -> String {
    entries.iter().map(|entry| format!("{entry}\n")).collect()
}

/// A user → recipe marker relation. Favorites and the shopping cart share the
/// same add/remove contract and differ only in table and wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    Favorite,
    ShoppingCart,
}

impl Membership {
    pub fn table(self) -> &'static str {
        match self {
            Membership::Favorite => "favorites",
            Membership::ShoppingCart => "shopping_cart",
        }
    }

    pub fn already_added(self) -> &'static str {
        match self {
            Membership::Favorite => "Recipe is already in favorites",
            Membership::ShoppingCart => "Recipe is already in the shopping cart",
        }
    }

    pub fn not_present(self) -> &'static str {
        match self {
            Membership::Favorite => "Recipe is not in favorites",
            Membership::ShoppingCart => "Recipe is not in the shopping cart",
        }
    }
}
