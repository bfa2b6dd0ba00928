use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::payload::{LoginCredentials, LoginOutcome, MfaChallenge, MfaSetup, MfaStatus};
use crate::traits::ProfileFetcher;
use crate::types::{AccessToken, MfaChallengeToken, UserProfile};

/// NetGuard API endpoints.
///
/// The base URL is a constructor parameter; every endpoint defaults to a
/// path relative to it.
///
/// ```rust,ignore
/// use netguard_session::ApiConfig;
///
/// let config = ApiConfig::new("https://netguard.example.com/api/".parse()?)
///     .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
    pub(crate) login_path: String,
    pub(crate) verify_mfa_path: String,
    pub(crate) setup_mfa_path: String,
    pub(crate) enable_mfa_path: String,
    pub(crate) disable_mfa_path: String,
    pub(crate) initiate_recovery_path: String,
    pub(crate) complete_recovery_path: String,
    pub(crate) current_user_path: String,
    pub(crate) timeout: Option<Duration>,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: "auth/login".into(),
            verify_mfa_path: "auth/mfa/verify".into(),
            setup_mfa_path: "auth/mfa/setup".into(),
            enable_mfa_path: "auth/mfa/enable".into(),
            disable_mfa_path: "auth/mfa/disable".into(),
            initiate_recovery_path: "auth/mfa/recovery/initiate".into(),
            complete_recovery_path: "auth/mfa/recovery/complete".into(),
            current_user_path: "users/me".into(),
            timeout: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `NETGUARD_API_URL`: API base URL
    ///
    /// # Optional env vars
    /// - `NETGUARD_API_TIMEOUT_SECS`: per-request timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or either value
    /// fails to parse.
    pub fn from_env() -> Result<Self, Error> {
        let base = std::env::var("NETGUARD_API_URL")
            .map_err(|_| Error::Config("NETGUARD_API_URL is required".into()))?;
        let base_url: Url = base
            .parse()
            .map_err(|e| Error::Config(format!("NETGUARD_API_URL: {e}")))?;

        let mut config = Self::new(base_url);
        if let Ok(secs) = std::env::var("NETGUARD_API_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("NETGUARD_API_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_verify_mfa_path(mut self, path: impl Into<String>) -> Self {
        self.verify_mfa_path = path.into();
        self
    }

    #[must_use]
    pub fn with_current_user_path(mut self, path: impl Into<String>) -> Self {
        self.current_user_path = path.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }
}

#[derive(Serialize)]
struct VerifyMfaRequest<'a> {
    mfa_token: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct CodeRequest<'a> {
    code: &'a str,
}

#[derive(Serialize)]
struct ChallengeRequest<'a> {
    mfa_token: &'a str,
}

#[derive(Serialize)]
struct RecoveryRequest<'a> {
    mfa_token: &'a str,
    recovery_code: &'a str,
}

/// HTTP client for the NetGuard authentication endpoints.
///
/// Every method is a plain request/response exchange; none of them touch
/// session state. Feed successful outcomes to
/// [`SessionManager::apply_login_outcome`](crate::SessionManager::apply_login_outcome).
#[derive(Debug, Clone)]
pub struct AuthApiClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl AuthApiClient {
    /// Like [`try_new`](Self::try_new), but falls back to a default HTTP
    /// client (without the configured timeout) if the builder fails.
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        let http = match Self::build_http(&config) {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!(error = %e, "HTTP client build failed; using defaults without timeout");
                reqwest::Client::default()
            }
        };
        Self { config, http }
    }

    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn try_new(config: ApiConfig) -> Result<Self, Error> {
        let http = Self::build_http(&config)?;
        Ok(Self { config, http })
    }

    fn build_http(config: &ApiConfig) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Primary credential check. May answer with a token pair or an MFA challenge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] if the
    /// credentials are rejected.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginOutcome, Error> {
        self.post("login", &self.config.login_path, None, credentials)
            .await
    }

    /// Answer an MFA challenge with a one-time code.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] with status 400/401 when the code is wrong or the
    /// challenge expired; show it to the user.
    pub async fn verify_mfa(
        &self,
        challenge: &MfaChallengeToken,
        code: &str,
    ) -> Result<LoginOutcome, Error> {
        let body = VerifyMfaRequest {
            mfa_token: challenge.as_str(),
            code,
        };
        self.post("mfa verify", &self.config.verify_mfa_path, None, &body)
            .await
    }

    /// Start MFA enrolment for the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Api`].
    pub async fn setup_mfa(&self, access_token: &AccessToken) -> Result<MfaSetup, Error> {
        self.post(
            "mfa setup",
            &self.config.setup_mfa_path,
            Some(access_token),
            &serde_json::json!({}),
        )
        .await
    }

    /// Confirm enrolment with a code from the authenticator app.
    ///
    /// The session's cached profile keeps its old `mfa_enabled` flag; call
    /// [`SessionManager::refresh_user`](crate::SessionManager::refresh_user)
    /// afterwards to pick up the change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Api`].
    pub async fn enable_mfa(
        &self,
        access_token: &AccessToken,
        code: &str,
    ) -> Result<MfaStatus, Error> {
        self.post(
            "mfa enable",
            &self.config.enable_mfa_path,
            Some(access_token),
            &CodeRequest { code },
        )
        .await
    }

    /// Turn MFA off for the authenticated user.
    ///
    /// As with [`enable_mfa`](Self::enable_mfa), refresh the session profile
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Api`].
    pub async fn disable_mfa(
        &self,
        access_token: &AccessToken,
        code: &str,
    ) -> Result<MfaStatus, Error> {
        self.post(
            "mfa disable",
            &self.config.disable_mfa_path,
            Some(access_token),
            &CodeRequest { code },
        )
        .await
    }

    /// Swap the pending challenge for a recovery challenge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Api`].
    pub async fn initiate_mfa_recovery(
        &self,
        challenge: &MfaChallengeToken,
    ) -> Result<MfaChallenge, Error> {
        let body = ChallengeRequest {
            mfa_token: challenge.as_str(),
        };
        self.post(
            "mfa recovery initiate",
            &self.config.initiate_recovery_path,
            None,
            &body,
        )
        .await
    }

    /// Finish recovery with a backup code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Api`].
    pub async fn complete_mfa_recovery(
        &self,
        challenge: &MfaChallengeToken,
        recovery_code: &str,
    ) -> Result<LoginOutcome, Error> {
        let body = RecoveryRequest {
            mfa_token: challenge.as_str(),
            recovery_code,
        };
        self.post(
            "mfa recovery complete",
            &self.config.complete_recovery_path,
            None,
            &body,
        )
        .await
    }

    /// Fetch the profile behind an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`]
    /// (401/403 when the token is no longer valid).
    pub async fn get_current_user(&self, access_token: &AccessToken) -> Result<UserProfile, Error> {
        let url = self.config.endpoint(&self.config.current_user_path)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token.as_str())
            .send()
            .await?;

        let response = Self::ensure_success(response, "profile fetch").await?;
        Self::decode(response).await
    }

    async fn post<B, T>(
        &self,
        operation: &'static str,
        path: &str,
        access_token: Option<&AccessToken>,
        body: &B,
    ) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path)?;
        let mut request = self.http.post(url).json(body);
        if let Some(token) = access_token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        let response = Self::ensure_success(response, operation).await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(operation, status, "Auth API request rejected");
        Err(Error::Api {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

impl ProfileFetcher for AuthApiClient {
    async fn fetch_current_user(&self, access_token: &AccessToken) -> Result<UserProfile, Error> {
        self.get_current_user(access_token).await
    }
}
