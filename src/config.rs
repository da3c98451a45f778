use dotenv::dotenv;
use std::{env, path::Path};

/// Environment variable holding the backend base URL.
pub const BACKEND_URL_ENV: &str = "VISUAL_CHAT_BACKEND_URL";

/// Base URL used when [`BACKEND_URL_ENV`] is unset or blank.
pub const DEFAULT_BACKEND_URL: &str = "https://your-backend.example.com";

/// Where the remote inference service lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    base_url: String,
}

impl BackendConfig {
    /// Uses `base_url` as given, minus any trailing slashes.
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves the base URL from [`BACKEND_URL_ENV`], falling back to
    /// [`DEFAULT_BACKEND_URL`].
    ///
    /// A `.env` file in the working directory (or any parent) is loaded
    /// first; variables already set in the process take precedence.
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_value(env::var(BACKEND_URL_ENV).ok())
    }

    /// Like [`from_env`](Self::from_env), but loads the given `.env` file.
    ///
    /// # Arguments
    /// * `path` - The dotenv file to load before resolving
    pub fn from_env_file(path: impl AsRef<Path>) -> Self {
        if let Err(e) = dotenv::from_path(path.as_ref()) {
            log::warn!("Could not load {}: {e}", path.as_ref().display());
        }
        Self::from_value(env::var(BACKEND_URL_ENV).ok())
    }

    fn from_value(value: Option<String>) -> Self {
        match value.filter(|v| !v.trim().is_empty()) {
            Some(url) => Self::new(url),
            None => {
                log::warn!("{BACKEND_URL_ENV} is not set, using {DEFAULT_BACKEND_URL}");
                Self::new(DEFAULT_BACKEND_URL)
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/ask`
    pub fn ask_url(&self) -> String {
        format!("{}/ask", self.base_url)
    }

    /// `{base}/`
    pub fn status_url(&self) -> String {
        format!("{}/", self.base_url)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}
