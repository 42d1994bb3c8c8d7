use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, ORIGIN, REFERER},
    Client, RequestBuilder, StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderIdentity};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("login rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("login response carried no access token")]
    MissingToken,
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct CaptchaPlaceholder {
    captcha: &'static str,
    token: &'static str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    grant_type: &'static str,
    scope: &'a str,
    #[serde(rename = "ThongTinCaptcha")]
    captcha: CaptchaPlaceholder,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
}

/// Authenticated provider session; every request carries the bearer token.
#[derive(Clone)]
pub struct Session {
    client: Client,
    access_token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Log in once. Failures are fatal for the run and never retried.
    pub async fn authenticate(provider: &ProviderConfig, identity: &ProviderIdentity) -> Result<Self, AuthError> {
        let client = build_client(provider)?;

        let payload = LoginRequest {
            username: &identity.username,
            password: &identity.password,
            grant_type: "password",
            scope: &provider.scope,
            captcha: CaptchaPlaceholder {
                captcha: "undefined",
                token: "undefined",
            },
        };

        tracing::info!(user = %identity.username, "logging in to provider");
        let resp = client.post(&provider.login_url).json(&payload).send().await?;
        let status = resp.status();

        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "provider login rejected");
            return Err(AuthError::Rejected { status, body });
        }

        let body = resp.text().await?;
        let token = serde_json::from_str::<LoginResponse>(&body)
            .ok()
            .and_then(|r| r.access_token)
            .filter(|t| !t.is_empty());

        match token {
            Some(access_token) => {
                tracing::info!("provider login succeeded");
                Ok(Self { client, access_token })
            }
            None => {
                tracing::error!(%status, %body, "provider login returned no access token");
                Err(AuthError::MissingToken)
            }
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).bearer_auth(&self.access_token)
    }
}

fn build_client(provider: &ProviderConfig) -> Result<Client, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json;charset=UTF-8"));

    let origin = provider.origin.trim_end_matches('/');
    let header = |v: &str| HeaderValue::from_str(v).map_err(|e| AuthError::Client(format!("invalid origin header: {e}")));
    headers.insert(ORIGIN, header(origin)?);
    headers.insert(REFERER, header(&format!("{origin}/"))?);

    Client::builder()
        .default_headers(headers)
        .timeout(provider.request_timeout())
        .build()
        .map_err(|e| AuthError::Client(e.to_string()))
}
