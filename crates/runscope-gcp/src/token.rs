//! Access token caching for Cloud Logging
//!
//! Caches tokens from `gcloud auth print-access-token` to avoid a slow
//! subprocess call on every startup. Tokens are cached per project with a
//! 10-minute TTL (gcloud tokens are valid for an hour).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::GcpError;

/// Default TTL for cached tokens (10 minutes)
const TOKEN_CACHE_TTL_SECS: u64 = 600;

/// Environment variable holding a pre-issued access token
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Cached token entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    pub expiration_timestamp: u64,
}

impl CachedToken {
    /// Check if the token is still valid (not expired)
    pub fn is_valid(&self) -> bool {
        // Add 30 second buffer before expiration
        self.expiration_timestamp > now_secs() + 30
    }
}

/// Token cache stored on disk
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenCache {
    /// Map of project id to cached token
    pub tokens: HashMap<String, CachedToken>,
}

impl TokenCache {
    /// Default cache file path
    pub fn default_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(home.join(".runscope").join("token-cache.json"))
    }

    /// Load the token cache, treating a missing or corrupt file as empty
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Save the token cache, best effort
    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(content) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, content);
        }
    }

    /// Get a cached token for a project if valid
    pub fn get(&self, key: &str) -> Option<&CachedToken> {
        self.tokens.get(key).filter(|t| t.is_valid())
    }

    /// Store a token in the cache
    pub fn set(&mut self, key: String, token: String) {
        self.tokens.insert(
            key,
            CachedToken {
                token,
                expiration_timestamp: now_secs() + TOKEN_CACHE_TTL_SECS,
            },
        );
    }

    /// Clean up expired tokens
    pub fn cleanup(&mut self) {
        self.tokens.retain(|_, t| t.is_valid());
    }
}

/// Supplies bearer tokens for API calls
pub struct TokenSource {
    key: String,
    cache_path: Option<PathBuf>,
    env_token: Option<String>,
    current: Mutex<Option<String>>,
}

impl TokenSource {
    /// Token source for a project, using the env override or the gcloud CLI
    pub fn for_project(project_id: &str) -> Self {
        Self {
            key: project_id.to_string(),
            cache_path: TokenCache::default_path(),
            env_token: std::env::var(ACCESS_TOKEN_ENV)
                .ok()
                .filter(|t| !t.trim().is_empty()),
            current: Mutex::new(None),
        }
    }

    /// Token source that always returns `token`
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            key: String::new(),
            cache_path: None,
            env_token: Some(token.into()),
            current: Mutex::new(None),
        }
    }

    /// Use a different cache file
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Current token, from memory, disk cache, or a fresh gcloud call
    pub async fn token(&self) -> Result<String, GcpError> {
        if let Some(token) = &self.env_token {
            return Ok(token.clone());
        }
        let current = self.current.lock().clone();
        if let Some(token) = current {
            return Ok(token);
        }
        if let Some(token) = self.cached() {
            *self.current.lock() = Some(token.clone());
            return Ok(token);
        }
        self.refresh().await
    }

    /// Fetch a new token and cache it
    pub async fn refresh(&self) -> Result<String, GcpError> {
        if self.env_token.is_some() {
            return Err(GcpError::Token(format!(
                "token from {} was rejected",
                ACCESS_TOKEN_ENV
            )));
        }

        let token = print_access_token().await?;
        *self.current.lock() = Some(token.clone());
        if let Some(path) = &self.cache_path {
            let mut cache = TokenCache::load(path);
            cache.set(self.key.clone(), token.clone());
            cache.cleanup();
            cache.save(path);
        }
        Ok(token)
    }

    /// Forget the current token (used when the API rejects it)
    pub fn invalidate(&self) {
        *self.current.lock() = None;
        if let Some(path) = &self.cache_path {
            let mut cache = TokenCache::load(path);
            cache.tokens.remove(&self.key);
            cache.cleanup();
            cache.save(path);
        }
    }

    fn cached(&self) -> Option<String> {
        let path = self.cache_path.as_ref()?;
        TokenCache::load(path).get(&self.key).map(|t| t.token.clone())
    }
}

/// Ask the gcloud CLI for an access token
async fn print_access_token() -> Result<String, GcpError> {
    debug!("requesting access token from gcloud");
    let output = tokio::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| GcpError::Token(format!("failed to run gcloud: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GcpError::Token(stderr.trim().to_string()));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(GcpError::Token("gcloud returned an empty token".to_string()));
    }
    Ok(token)
}
