use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;

const TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl UserSession {
    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().naive_utc())
    }

    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at > now
    }
}
