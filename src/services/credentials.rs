use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::api::middleware::AppError;

/// Service-account login for one database server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Read-only credential table keyed by host and port.
#[derive(Debug, Clone, Default)]
pub struct ServiceAccountConnections {
    by_host_port: HashMap<(String, u16), Credential>,
}

impl ServiceAccountConnections {
    pub fn new(credentials: Vec<Credential>) -> Self {
        let by_host_port = credentials
            .into_iter()
            .map(|c| ((c.server.to_lowercase(), c.port), c))
            .collect();
        Self { by_host_port }
    }

    /// Load a JSON array of credentials.
    pub async fn from_file(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let credentials: Vec<Credential> = serde_json::from_slice(&bytes)?;
        tracing::info!("Loaded {} service account credentials", credentials.len());
        Ok(Self::new(credentials))
    }

    pub fn len(&self) -> usize {
        self.by_host_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host_port.is_empty()
    }

    pub fn lookup(&self, host: &str, port: u16) -> Option<&Credential> {
        self.by_host_port.get(&(host.to_lowercase(), port))
    }

    /// Connection URL for `database_uri` with the matching credential filled
    /// in. Without a match the URI is returned unchanged and the engine sees
    /// an anonymous login.
    pub fn connection_url(&self, database_uri: &str) -> Result<String, AppError> {
        let mut url = url::Url::parse(database_uri)
            .map_err(|e| AppError::Connection(format!("Invalid database URI {}: {}", database_uri, e)))?;

        let host = url.host_str().unwrap_or_default().to_string();
        let port = url
            .port_or_known_default()
            .or_else(|| default_port(url.scheme()))
            .unwrap_or(0);

        tracing::debug!("Getting connection for URI: {}", mask_credentials(database_uri));
        let Some(credential) = self.lookup(&host, port) else {
            return Ok(url.to_string());
        };

        if let Some(username) = &credential.username {
            url.set_username(username)
                .map_err(|_| AppError::Connection(format!("Cannot set user on {}", database_uri)))?;
        }
        if let Some(password) = &credential.password {
            url.set_password(Some(password))
                .map_err(|_| AppError::Connection(format!("Cannot set password on {}", database_uri)))?;
        }
        Ok(url.to_string())
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "mysql" | "mariadb" => Some(3306),
        "postgres" | "postgresql" => Some(5432),
        _ => None,
    }
}

/// Mask credentials in connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}
