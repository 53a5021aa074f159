use axum::http::{header, HeaderName, HeaderValue, Method};
use log::{info, warn};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::config::ServerConfig;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<HeaderName>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl CorsConfig {
    pub fn production() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allowed_headers: vec![header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT],
            allow_credentials: true,
            max_age_secs: 7200,
        }
    }

    /// Local frontend dev servers.
    pub fn development() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            max_age_secs: 3600,
            ..Self::production()
        }
    }

    /// Configured origins when present, development defaults otherwise.
    pub fn for_server(server: &ServerConfig) -> Self {
        if server.cors_allowed_origins.is_empty() {
            info!("No CORS origins configured, allowing local development origins");
            Self::development()
        } else {
            info!(
                "CORS configured with {} allowed origins",
                server.cors_allowed_origins.len()
            );
            Self::production().with_origins(server.cors_allowed_origins.clone())
        }
    }

    pub fn with_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter(|o| {
                let ok = is_valid_origin_format(o);
                if !ok {
                    warn!("Ignoring malformed CORS origin {o:?}");
                }
                ok
            })
            .filter_map(|o| o.parse().ok())
            .collect();

        let mut cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(self.allowed_methods)
            .allow_headers(self.allowed_headers)
            .max_age(Duration::from_secs(self.max_age_secs));

        if self.allow_credentials {
            cors = cors.allow_credentials(true);
        }
        cors
    }
}

pub fn create_cors_layer(server: &ServerConfig) -> CorsLayer {
    CorsConfig::for_server(server).build()
}

fn is_valid_origin_format(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };

    if rest.is_empty() || rest.contains("//") || rest.contains("..") || rest.ends_with('/') {
        return false;
    }

    let lower = origin.to_lowercase();
    !["<script", "javascript:", "data:", "%3c", "%3e"]
        .iter()
        .any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_format() {
        assert!(is_valid_origin_format("https://ideas.city.gov"));
        assert!(is_valid_origin_format("http://localhost:3000"));
        assert!(!is_valid_origin_format("ftp://ideas.city.gov"));
        assert!(!is_valid_origin_format("https://"));
        assert!(!is_valid_origin_format("https://ideas.city.gov/"));
        assert!(!is_valid_origin_format("https://evil.com/<script>"));
    }

    #[test]
    fn test_configured_origins_win() {
        let server = ServerConfig {
            cors_allowed_origins: vec!["https://ideas.city.gov".to_string()],
            ..Default::default()
        };
        let config = CorsConfig::for_server(&server);
        assert_eq!(config.allowed_origins, vec!["https://ideas.city.gov"]);

        let dev = CorsConfig::for_server(&ServerConfig::default());
        assert!(dev
            .allowed_origins
            .iter()
            .any(|o| o == "http://localhost:3000"));
    }
}
