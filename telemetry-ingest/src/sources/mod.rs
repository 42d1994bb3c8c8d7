pub mod provider_http;
pub mod retry;
pub mod session;

pub use provider_http::ProviderSource;
pub use retry::{RetryAction, RetryPolicy};
pub use session::{AuthError, Session};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{ProviderConfig, ProviderIdentity};

    /// Provider settings pointing at a mock server.
    pub fn provider_for(server: &mockito::Server) -> (ProviderConfig, ProviderIdentity) {
        let provider = ProviderConfig {
            origin: "https://portal.example".to_string(),
            login_url: format!("{}/api/login", server.url()),
            data_url: format!("{}/api/data", server.url()),
            ..ProviderConfig::default()
        };
        let identity = ProviderIdentity {
            username: "meter-user".to_string(),
            password: "secret".to_string(),
            customer_code: "PC01".to_string(),
            customer_point: "PC01-P1".to_string(),
        };
        (provider, identity)
    }
}
