use chrono::Duration;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, JwtSessionData},
    },
    error::ApiError,
    pagination::{Page, PageQuery},
    schema::{Credentials, Id, NewUser, PasswordChange, RegisteredUser, User, UserProfile},
    MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_USERNAME_LEN, USER_COUNT_PER_PAGE,
};

const PROFILE_COLUMNS: &str = "
    u.id, u.email, u.username, u.first_name, u.last_name,
    EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id) AS is_subscribed
";

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::validation(format!(
            "username: must be 1 to {MAX_USERNAME_LEN} characters"
        )));
    }

    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || matches!(c, '.' | '@' | '+' | '-'));
    if !valid {
        return Err(ApiError::validation(
            "username: letters, digits and @/./+/-/_ only",
        ));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let shape_ok = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        .unwrap_or(false);

    if !shape_ok || email.len() > MAX_EMAIL_LEN || email.contains(char::is_whitespace) {
        return Err(ApiError::validation("email: enter a valid email address"));
    }
    Ok(())
}

fn validate_new_user(user: &NewUser) -> Result<(), ApiError> {
    validate_username(&user.username)?;
    validate_email(&user.email)?;

    for (field, value) in [("first_name", &user.first_name), ("last_name", &user.last_name)] {
        if value.as_deref().is_some_and(|v| v.chars().count() > MAX_NAME_LEN) {
            return Err(ApiError::validation(format!(
                "{field}: at most {MAX_NAME_LEN} characters"
            )));
        }
    }

    if user.password.is_empty() {
        return Err(ApiError::validation("password: may not be blank"));
    }

    Ok(())
}

pub async fn get_user_by_id(user_id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Creates a user; the password is stored as an argon2 hash.
pub async fn register_user(user: NewUser, pool: &Pool<Postgres>) -> Result<RegisteredUser, ApiError> {
    validate_new_user(&user)?;

    let (username_taken, email_taken): (bool, bool) = sqlx::query_as(
        "
        SELECT EXISTS (SELECT 1 FROM users WHERE username = $1),
               EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($2))
    ",
    )
    .bind(&user.username)
    .bind(&user.email)
    .fetch_one(pool)
    .await?;

    if username_taken {
        return Err(ApiError::conflict(
            "A user with that username is already registered",
        ));
    }
    if email_taken {
        return Err(ApiError::conflict(
            "A user with that email is already registered",
        ));
    }

    let password = hash_password(&user.password)?;

    let row: RegisteredUser = sqlx::query_as(
        "
        INSERT INTO users (username, email, password, first_name, last_name)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, email, username, first_name, last_name
    ",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(password)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .fetch_one(pool)
    .await?;

    log::info!("Registered user {}", row.id);

    Ok(row)
}

pub async fn get_profile(
    user_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ApiError> {
    let row: Option<UserProfile> =
        sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = $2"))
            .bind(viewer)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    row.ok_or_else(|| ApiError::not_found("No user exists with specified id"))
}

/// Profiles of all `user_ids` that exist, in no particular order.
pub async fn get_profiles(
    user_ids: &[Id],
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserProfile>, ApiError> {
    let rows: Vec<UserProfile> =
        sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM users u WHERE u.id = ANY($2)"))
            .bind(viewer)
            .bind(user_ids)
            .fetch_all(pool)
            .await?;

    Ok(rows)
}

pub async fn fetch_users(
    viewer: Option<Id>,
    query: PageQuery,
    pool: &Pool<Postgres>,
) -> Result<Page<UserProfile>, ApiError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Ok(Page::no_rows());
    }

    let rows: Vec<UserProfile> = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(viewer)
    .bind(query.limit(USER_COUNT_PER_PAGE))
    .bind(query.offset(USER_COUNT_PER_PAGE))
    .fetch_all(pool)
    .await?;

    Ok(Page::from_rows(rows, count, query, USER_COUNT_PER_PAGE))
}

/// Verifies the credentials and issues a signed token bound to a fresh
/// `auth_sessions` row.
pub async fn issue_token(
    credentials: &Credentials,
    secret: &str,
    ttl: Duration,
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    let user = get_user_by_email(&credentials.email, pool)
        .await?
        .filter(|user| verify_password(&credentials.password, &user.password))
        .ok_or_else(|| ApiError::validation("Invalid credentials"))?;

    let session_id = Uuid::new_v4();
    sqlx::query("INSERT INTO auth_sessions (id, user_id) VALUES ($1, $2)")
        .bind(session_id)
        .bind(user.id)
        .execute(pool)
        .await?;

    let claims = JwtSessionData::new(user.id, user.username, session_id, ttl);
    generate_jwt_session(&claims, secret)
}

pub async fn session_exists(
    session_id: Uuid,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM auth_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

/// Logs the user out everywhere.
pub async fn revoke_tokens(user_id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM auth_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    log::debug!("Revoked {} session(s) of user {user_id}", result.rows_affected());

    Ok(())
}

pub async fn set_password(
    user_id: Id,
    change: &PasswordChange,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    if change.new_password.is_empty() {
        return Err(ApiError::validation("new_password: may not be blank"));
    }

    let user = get_user_by_id(user_id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("No user exists with specified id"))?;

    if !verify_password(&change.current_password, &user.password) {
        return Err(ApiError::validation("current_password: wrong password"));
    }

    let password = hash_password(&change.new_password)?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_follow_the_allowed_pattern() {
        assert!(validate_username("chef.anna+1@home-kitchen_").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("semi;colon").is_err());
        assert!(validate_username(&"a".repeat(MAX_USERNAME_LEN + 1)).is_err());
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email("anna@example.com").is_ok());
        assert!(validate_email("anna@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("anna example@x.com").is_err());
    }

    #[test]
    fn new_user_needs_a_password() {
        let user = NewUser {
            email: String::from("anna@example.com"),
            username: String::from("anna"),
            first_name: Some(String::from("Anna")),
            last_name: None,
            password: String::new(),
        };

        assert!(validate_new_user(&user).is_err());
    }
}
