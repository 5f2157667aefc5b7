use crate::{error::ApiError, jwt::SessionData, schema::Id};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ActionType {
    UpdateRecipe,
    DeleteRecipe,
}

impl ActionType {
    fn describe(self) -> &'static str {
        match self {
            ActionType::UpdateRecipe => "update",
            ActionType::DeleteRecipe => "delete",
        }
    }

    /// Recipes are managed by their author only.
    pub fn authenticate(self, session: &SessionData, author_id: Id) -> Result<(), ApiError> {
        if session.user_id != author_id {
            return Err(ApiError::Permission(format!(
                "You don't have permission to {} this recipe",
                self.describe()
            )));
        }
        Ok(())
    }
}
