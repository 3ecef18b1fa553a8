//! HTTP(S) listener for the dashboard API

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use std::{net::SocketAddr, path::PathBuf};
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{api_router, ApiState};

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub enabled: bool,
    pub port: u16,
    /// Path to certificate PEM file (cert + CA bundle)
    pub cert_path: PathBuf,
    /// Path to private key PEM file
    pub key_path: PathBuf,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5000,
            cert_path: PathBuf::from("certs/cert.pem"),
            key_path: PathBuf::from("certs/key.pem"),
        }
    }
}

impl WebServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: parse_enabled(std::env::var("WEB_ENABLED").ok().as_deref()),
            port: std::env::var("WEB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cert_path: std::env::var("TLS_CERT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cert_path),
            key_path: std::env::var("TLS_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
        }
    }

    /// Serve HTTPS only when both PEM files are present
    pub fn tls_available(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }
}

fn parse_enabled(value: Option<&str>) -> bool {
    !matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("0") | Some("false") | Some("no") | Some("off")
    )
}

fn build_app(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health))
        .nest("/api", api_router(state))
        .layer(CorsLayer::permissive())
}

/// Run the dashboard API until the listener fails
pub async fn start_web_server(config: WebServerConfig, state: ApiState) -> anyhow::Result<()> {
    let app = build_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    if config.tls_available() {
        let tls_config = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
            .await
            .map_err(|e| anyhow::anyhow!(
                "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}\n\nHint: The private key must be in PKCS#8 PEM format.",
                e, config.cert_path.display(), config.key_path.display()
            ))?;

        info!("Web server listening on https://0.0.0.0:{}", config.port);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!(
            "No TLS certificates at {}, serving plain HTTP",
            config.cert_path.display()
        );
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Web server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app).await?;
    }

    Ok(())
}

/// Health check endpoint
async fn health() -> &'static str {
    "Roblox Verifier API Running"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_by_default() {
        assert!(parse_enabled(None));
        assert!(parse_enabled(Some("true")));
        assert!(!parse_enabled(Some("false")));
        assert!(!parse_enabled(Some(" 0 ")));
    }

    #[test]
    fn test_tls_needs_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "cert").unwrap();

        let config = WebServerConfig {
            cert_path: cert,
            key_path: dir.path().join("key.pem"),
            ..Default::default()
        };
        assert!(!config.tls_available());

        std::fs::write(&config.key_path, "key").unwrap();
        assert!(config.tls_available());
    }
}
