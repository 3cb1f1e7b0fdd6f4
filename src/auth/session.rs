use chrono::{DateTime, NaiveDateTime, Utc};
use rand::{Rng, distr::Alphanumeric};

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl From<DbUserSession> for UserSession {
    fn from(session: DbUserSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            token: session.token,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

impl UserSession {
    pub const LIFETIME_DAYS: i64 = 7;

    /// Opaque token from the thread-local CSPRNG.
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        let expires_at = DateTime::<Utc>::from_naive_utc_and_offset(self.expires_at, Utc);
        expires_at > Utc::now()
    }
}
