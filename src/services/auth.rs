use crate::models::User;
use crate::services::ValidationError;
use crate::Database;
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, Rng};
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_USERNAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;

const TOKEN_PREFIX: &str = "jt_";
const TOKEN_BYTE_LENGTH: usize = 32;

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.is_staff, u.created_at, u.updated_at";

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    ValidationError(msg.into()).into()
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(invalid("Username cannot be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(invalid(format!(
            "Username must be {} characters or less",
            MAX_USERNAME_LENGTH
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '+'))
    {
        return Err(invalid(
            "Username can only contain letters, numbers, and @/./+/-/_ characters",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    // Email is optional for accounts.
    if email.is_empty() {
        return Ok(());
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid(format!(
            "Email must be {} characters or less",
            MAX_EMAIL_LENGTH
        )));
    }
    if !email.contains('@') || !email.contains('.') {
        return Err(invalid("Invalid email format"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(invalid(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid("Password must contain at least one number"));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    validate_password(password)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dW5rbm93bg$0000000000000000000000000000000000000000000";

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => {
            if let Ok(dummy) = PasswordHash::new(DUMMY_HASH) {
                let _ = Argon2::default().verify_password(password.as_bytes(), &dummy);
            }
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn create_user(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
    is_staff: bool,
) -> Result<i64> {
    validate_username(username)?;
    validate_email(email)?;
    let password_hash = hash_password(password)?;
    let conn = db.get()?;

    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)",
        [username],
        |row| row.get(0),
    )?;
    if taken {
        return Err(invalid("A user with that username already exists"));
    }

    conn.execute(
        "INSERT INTO users (username, email, password_hash, is_staff) VALUES (?, ?, ?, ?)",
        (username, email, &password_hash, is_staff),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Change a password and revoke every token issued under the old one.
pub fn update_password(db: &Database, username: &str, password: &str) -> Result<bool> {
    let password_hash = hash_password(password)?;
    let conn = db.get()?;
    let affected = conn.execute(
        "UPDATE users SET password_hash = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE username = ?",
        (&password_hash, username),
    )?;
    if affected > 0 {
        conn.execute(
            "DELETE FROM auth_tokens WHERE user_id = (SELECT id FROM users WHERE username = ?)",
            [username],
        )?;
    }
    Ok(affected > 0)
}

pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<Option<User>> {
    let user = get_user_by_username(db, username)?;
    match user {
        Some(u) if verify_password(password, &u.password_hash) => Ok(Some(u)),
        Some(_) => Ok(None),
        None => {
            // Keep timing comparable to a real verification.
            verify_password(password, DUMMY_HASH);
            Ok(None)
        }
    }
}

pub fn get_user(db: &Database, id: i64) -> Result<Option<User>> {
    let conn = db.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users u WHERE u.id = ?", USER_COLUMNS),
            [id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_username(db: &Database, username: &str) -> Result<Option<User>> {
    let conn = db.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users u WHERE u.username = ?", USER_COLUMNS),
            [username],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(db: &Database) -> Result<Vec<User>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users u ORDER BY u.username",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn delete_user(db: &Database, username: &str) -> Result<bool> {
    let conn = db.get()?;
    let affected = conn.execute("DELETE FROM users WHERE username = ?", [username])?;
    Ok(affected > 0)
}

fn generate_raw_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTE_LENGTH];
    rand::thread_rng().fill(&mut bytes);
    format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn extract_prefix(raw: &str) -> String {
    let without_prefix = raw.strip_prefix(TOKEN_PREFIX).unwrap_or(raw);
    let end = without_prefix.len().min(8);
    format!("{}{}...", TOKEN_PREFIX, &without_prefix[..end])
}

/// Issue a new token for `user_id`. The raw token is only ever returned here.
pub fn issue_token(db: &Database, user_id: i64) -> Result<String> {
    let raw_token = generate_raw_token();
    let conn = db.get()?;
    conn.execute(
        "INSERT INTO auth_tokens (user_id, token_hash, prefix) VALUES (?, ?, ?)",
        (user_id, hash_token(&raw_token), extract_prefix(&raw_token)),
    )?;
    Ok(raw_token)
}

/// Resolve a raw token to its user, recording the use.
pub fn validate_token(db: &Database, raw_token: &str) -> Result<Option<User>> {
    if !raw_token.starts_with(TOKEN_PREFIX) {
        return Ok(None);
    }

    let token_hash = hash_token(raw_token);
    let conn = db.get()?;
    let found = conn
        .query_row(
            &format!(
                "SELECT t.id, {} FROM auth_tokens t JOIN users u ON u.id = t.user_id WHERE t.token_hash = ?",
                USER_COLUMNS
            ),
            [&token_hash],
            |row| {
                let token_id: i64 = row.get(0)?;
                let user = User {
                    id: row.get(1)?,
                    username: row.get(2)?,
                    email: row.get(3)?,
                    password_hash: row.get(4)?,
                    is_staff: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                };
                Ok((token_id, user))
            },
        )
        .optional()?;

    let Some((token_id, user)) = found else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE auth_tokens SET last_used_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
        [token_id],
    )?;

    Ok(Some(user))
}

pub fn revoke_token(db: &Database, raw_token: &str) -> Result<bool> {
    let conn = db.get()?;
    let affected = conn.execute(
        "DELETE FROM auth_tokens WHERE token_hash = ?",
        [hash_token(raw_token)],
    )?;
    Ok(affected > 0)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_staff: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
