use potion::Error;
use warp::reject::Reject;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{info}")]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            e => Self::new(format!("{e}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Permission,
    Unauthorized,
    Internal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Database error: {0}")]
    Query(#[from] QueryError),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn validation(info: impl Into<String>) -> Self {
        Self::Validation(info.into())
    }

    pub fn conflict(info: impl Into<String>) -> Self {
        Self::Conflict(info.into())
    }

    pub fn not_found(info: impl Into<String>) -> Self {
        Self::NotFound(info.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Permission(_) => ErrorKind::Permission,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::Query(_) | ApiError::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// Store-level constraint violations map onto the same kinds as the
/// explicit pre-checks.
impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        if let sqlx::Error::Database(e) = &value {
            if e.is_unique_violation() {
                return ApiError::conflict("Entry already exists");
            }
            if e.is_check_violation() {
                return ApiError::validation(format!("Constraint violated: {}", e.message()));
            }
            if e.is_foreign_key_violation() {
                return ApiError::not_found("Referenced entry does not exist");
            }
        }

        if let sqlx::Error::RowNotFound = value {
            return ApiError::not_found("Not found");
        }

        ApiError::Query(QueryError::from(value))
    }
}

impl Reject for ApiError {}

impl Into<Error> for ApiError {
    fn into(self) -> Error {
        let info = match &self {
            // Internals are logged, not echoed to clients.
            ApiError::Query(e) => {
                log::error!("{e}");
                String::from("Internal server error")
            }
            ApiError::Storage(e) => {
                log::error!("{e}");
                String::from("Internal server error")
            }
            e => e.to_string(),
        };

        let code = match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Permission => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        };

        Error {
            code,
            info: Some(info),
            redirect: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_status_codes() {
        let conflict: Error = ApiError::conflict("Recipe is already in favorites").into();
        let missing: Error = ApiError::not_found("Recipe is not in favorites").into();
        let invalid: Error = ApiError::validation("tags: duplicate").into();
        let denied: Error = ApiError::Permission("nope".into()).into();

        assert_eq!(conflict.code, 409);
        assert_eq!(missing.code, 404);
        assert_eq!(invalid.code, 400);
        assert_eq!(denied.code, 403);
        assert_eq!(
            conflict.info.as_deref(),
            Some("Recipe is already in favorites")
        );
    }

    #[test]
    fn internal_errors_are_not_echoed() {
        let err: Error = ApiError::Query(QueryError::new("relation \"x\" does not exist".into())).into();

        assert_eq!(err.code, 500);
        assert_eq!(err.info.as_deref(), Some("Internal server error"));
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ApiError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
