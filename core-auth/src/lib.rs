//! # Authentication Module
//!
//! Access-token lookup for the music platforms an export can target.
//!
//! ## Overview
//!
//! The export worker never performs OAuth itself. It asks a
//! [`CredentialProvider`] for a currently valid token and fails the job when
//! none is available. Token refresh belongs to the account-linking flow.

pub mod credentials;
pub mod error;
pub mod types;

pub use credentials::{CredentialProvider, SqliteCredentialProvider};
pub use error::{AuthError, Result};
pub use types::{AccessToken, UserId};
