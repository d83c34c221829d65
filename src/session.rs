use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Logged-in client; the cookie store carries the session between requests.
pub struct Session {
    client: Client,
    base_url: String,
}

impl Session {
    /// POST the login form. The service answers a good login with a redirect,
    /// so redirects are not followed and only 302 counts as success.
    pub async fn login(settings: &Settings) -> Result<Session> {
        let (email, password) = settings.credentials()?;
        let base_url = settings.overcast_base_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(Error::AuthRequest)?;

        info!("Logging in at {}/login", base_url);
        let response = client
            .post(format!("{}/login", base_url))
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .map_err(Error::AuthRequest)?;

        if response.status() != StatusCode::FOUND {
            return Err(Error::AuthRejected(response.status()));
        }
        debug!("Login accepted");

        Ok(Session { client, base_url })
    }

    /// Fetch the episode listing page as text.
    pub async fn fetch_listing(&self) -> Result<String> {
        let url = format!("{}/podcasts", self.base_url);
        info!("Fetching listing: {}", url);

        let response = self.client.get(&url).send().await.map_err(Error::Fetch)?;
        if response.status() != StatusCode::OK {
            return Err(Error::FetchStatus(response.status()));
        }

        let html = response.text().await.map_err(Error::Fetch)?;
        debug!("Listing is {} bytes", html.len());
        Ok(html)
    }
}
