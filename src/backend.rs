use crate::{config::BackendConfig, image::ImageFile};
use reqwest::blocking::{Client, multipart};
use serde::{Deserialize, Serialize};

/// One question about one image.
#[derive(Clone, Debug)]
pub struct AskRequest {
    pub image: ImageFile,
    pub question: String,
}

/// Something that can answer an [`AskRequest`].
///
/// Implementations return the parsed response body as-is; interpreting
/// `answer`/`error` fields is left to the caller. `Err` is reserved for
/// requests that never produced a body.
pub trait AskBackend {
    /// Transport-level failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends `request` and returns the parsed response body.
    fn ask(&mut self, request: AskRequest) -> Result<serde_json::Value, Self::Error>;
}

/// A request that never produced a response body.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Health payload served at `GET {base}/`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BackendStatus {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Talks to the remote service over HTTP.
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Creates a backend for the service at `config`.
    ///
    /// The HTTP client has no request timeout: inference can take minutes,
    /// and the request runs until the service answers or the connection
    /// fails.
    ///
    /// # Arguments
    /// * `config` - Where the remote service lives
    ///
    /// # Returns
    /// The backend, or the error raised while building the HTTP client
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(None).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a backend that sends through a caller-built `client`.
    ///
    /// # Arguments
    /// * `client` - The blocking HTTP client to send with
    /// * `config` - Where the remote service lives
    pub fn with_client(client: Client, config: BackendConfig) -> Self {
        Self { client, config }
    }

    /// Returns the service location this backend talks to.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Fetches the service health payload.
    pub fn status(&self) -> Result<BackendStatus, BackendError> {
        let status = self
            .client
            .get(self.config.status_url())
            .send()?
            .error_for_status()?
            .json::<BackendStatus>()?;
        Ok(status)
    }
}

impl AskBackend for HttpBackend {
    type Error = BackendError;

    fn ask(&mut self, request: AskRequest) -> Result<serde_json::Value, Self::Error> {
        let AskRequest { image, question } = request;
        let image_len = image.len();

        let part = multipart::Part::bytes(image.bytes)
            .file_name(image.name)
            .mime_str(image.mime)?;
        let form = multipart::Form::new()
            .part("image", part)
            .text("question", question);

        let url = self.config.ask_url();
        log::debug!("POST {url} ({image_len} image bytes)");

        let response = self.client.post(&url).multipart(form).send()?;

        // error payloads come back with non-2xx codes and are still bodies
        let status = response.status();
        if !status.is_success() {
            log::debug!("{url} answered {status}");
        }

        let text = response.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}
