use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

macro_rules! credential {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Serialize, Deserialize, From, Into)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Raw bearer string, for building requests only.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        // Redacted: session state is logged with `?` in places.
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(concat!(stringify!($name), "(***)"))
            }
        }
    };
}

credential!(
    /// Short-lived bearer credential authorizing API calls.
    AccessToken
);
credential!(
    /// Longer-lived credential used by the backend to mint new access tokens.
    RefreshToken
);
credential!(
    /// Identifies an in-progress MFA challenge between the password step and
    /// full authentication.
    MfaChallengeToken
);

/// Backend user identifier (opaque string).
///
/// Integer primary keys are accepted on the wire and kept in decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Unsigned(n) => Self(n.to_string()),
            Raw::Signed(n) => Self(n.to_string()),
        })
    }
}

/// Per-user alert delivery settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub email_alerts: bool,
    pub browser_alerts: bool,
    pub critical_alerts: bool,
}

/// Cached profile of the authenticated principal.
///
/// Owned by the backend. The copy held by the session may be stale; call
/// [`SessionManager::refresh_user`](crate::SessionManager::refresh_user) to
/// re-read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<UserId>,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

fn active_by_default() -> bool {
    true
}

impl UserProfile {
    /// Create an active profile with only the identity fields set.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Some(UserId(id.into())),
            email: email.into(),
            username: username.into(),
            first_name: None,
            last_name: None,
            department: None,
            job_title: None,
            role: None,
            is_active: true,
            mfa_enabled: false,
            notification_preferences: NotificationPreferences::default(),
            last_login: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    #[must_use]
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    #[must_use]
    pub fn with_job_title(mut self, job_title: impl Into<String>) -> Self {
        self.job_title = Some(job_title.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_notification_preferences(mut self, prefs: NotificationPreferences) -> Self {
        self.notification_preferences = prefs;
        self
    }

    /// "First Last" when both names are known, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                format!("{first} {last}")
            }
            _ => self.username.clone(),
        }
    }
}
