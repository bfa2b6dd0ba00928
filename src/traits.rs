use std::future::Future;
use std::pin::Pin;

use crate::error::Error;
use crate::types::{AccessToken, UserProfile};

/// Resolves the profile of the principal behind an access token.
///
/// [`AuthApiClient`](crate::AuthApiClient) implements this over HTTP. Any
/// error is treated by the session manager as "not authenticated" during
/// bootstrap.
///
/// # Example
///
/// ```rust,ignore
/// impl ProfileFetcher for MyApi {
///     async fn fetch_current_user(&self, token: &AccessToken) -> Result<UserProfile, Error> {
///         self.get_json("users/me", token).await
///     }
/// }
/// ```
pub trait ProfileFetcher: Send + Sync + 'static {
    fn fetch_current_user(
        &self,
        access_token: &AccessToken,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send;
}

impl<T: ProfileFetcher> ProfileFetcher for std::sync::Arc<T> {
    fn fetch_current_user(
        &self,
        access_token: &AccessToken,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send {
        (**self).fetch_current_user(access_token)
    }
}

/// Moves the UI to another route. Called by `logout()` with the login entry path.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn navigate(&self, path: &str) {
        self(path);
    }
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for ProfileFetcher (needed for Arc<dyn>).
pub(crate) trait ProfileFetcherDyn: Send + Sync {
    fn fetch_dyn<'a>(
        &'a self,
        access_token: &'a AccessToken,
    ) -> BoxFuture<'a, Result<UserProfile, Error>>;
}

impl<T: ProfileFetcher> ProfileFetcherDyn for T {
    fn fetch_dyn<'a>(
        &'a self,
        access_token: &'a AccessToken,
    ) -> BoxFuture<'a, Result<UserProfile, Error>> {
        Box::pin(self.fetch_current_user(access_token))
    }
}
