/// Session manager settings.
///
/// Every field has a default. Override with `with_*` methods or read them
/// from the environment with [`from_env()`](SessionConfig::from_env).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SessionConfig {
    pub(crate) login_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".into(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `NETGUARD_LOGIN_PATH`: route `logout()` navigates to (default `/login`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the login path is
    /// set but is not an absolute route.
    pub fn from_env() -> Result<Self, crate::Error> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("NETGUARD_LOGIN_PATH") {
            if !path.starts_with('/') {
                return Err(crate::Error::Config(format!(
                    "NETGUARD_LOGIN_PATH must start with '/': {path}"
                )));
            }
            config = config.with_login_path(path);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Login entry point used after logout.
    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_login_path() {
        assert_eq!(SessionConfig::default().login_path(), "/login");
    }

    #[test]
    fn override_login_path() {
        let config = SessionConfig::new().with_login_path("/auth/sign-in");
        assert_eq!(config.login_path(), "/auth/sign-in");
    }
}
