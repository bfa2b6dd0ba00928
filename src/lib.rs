#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod session;
pub mod storage;
pub mod traits;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "client")]
pub use client::{ApiConfig, AuthApiClient};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use payload::{LoginCredentials, LoginOutcome, MfaChallenge, MfaSetup, MfaStatus, TokenGrant};
pub use session::{AuthView, ErrorHook, SessionBuilder, SessionManager, SessionStatus};
pub use storage::{
    ACCESS_TOKEN_KEY, MFA_CHALLENGE_TOKEN_KEY, MemoryStorage, REFRESH_TOKEN_KEY, SessionStorage,
};
pub use traits::{Navigator, ProfileFetcher};
pub use types::{
    AccessToken, MfaChallengeToken, NotificationPreferences, RefreshToken, UserId, UserProfile,
};
