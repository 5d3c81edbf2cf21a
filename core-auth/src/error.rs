use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No {platform} credentials stored for user {user_id}")]
    NotAuthenticated { user_id: String, platform: String },

    #[error("{platform} access token for user {user_id} expired at {expires_at}")]
    TokenExpired {
        user_id: String,
        platform: String,
        expires_at: String,
    },

    #[error("Credential storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
