use serde::{Deserialize, Serialize};

use crate::types::{AccessToken, MfaChallengeToken, RefreshToken, UserProfile};

/// Username/password pair for the primary login step.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Token pair issued once the principal is fully authenticated.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    /// Present when the backend embeds the profile in the login response.
    #[serde(default, alias = "profile")]
    pub user: Option<UserProfile>,
}

impl TokenGrant {
    #[must_use]
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
            user: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }
}

/// Issued after the password step when the account requires a second factor.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct MfaChallenge {
    #[serde(alias = "mfa_challenge_token")]
    pub mfa_token: MfaChallengeToken,
}

impl MfaChallenge {
    #[must_use]
    pub fn new(mfa_token: MfaChallengeToken) -> Self {
        Self { mfa_token }
    }
}

/// Success payload of `login`, `verify_mfa` and `complete_mfa_recovery`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    MfaRequired(MfaChallenge),
    Authenticated(TokenGrant),
}

/// Enrolment material returned by `setup_mfa`.
#[derive(Clone, Deserialize)]
#[non_exhaustive]
pub struct MfaSetup {
    pub secret: String,
    #[serde(alias = "qr_code_uri")]
    pub provisioning_uri: String,
    #[serde(default)]
    pub backup_codes: Vec<String>,
}

impl std::fmt::Debug for MfaSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfaSetup")
            .field("secret", &"***")
            .field("backup_codes", &self.backup_codes.len())
            .finish_non_exhaustive()
    }
}

/// MFA enrolment state after `enable_mfa` / `disable_mfa`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct MfaStatus {
    pub mfa_enabled: bool,
    #[serde(default)]
    pub recovery_codes: Vec<String>,
}
