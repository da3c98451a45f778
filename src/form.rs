use crate::{
    answer::{render_answer, render_failure},
    backend::{AskBackend, AskRequest, BackendError, HttpBackend},
    config::BackendConfig,
    engine::{AskEngine, AskEngineResponse, AskEngineResult, AskEngineState},
    image::{ImageFile, PreviewUrl},
};
use std::{
    path::Path,
    time::{Duration, Instant},
};

/// Label of the submit action while idle.
pub const ASK_LABEL: &str = "Ask";
/// Label of the submit action while a request is outstanding.
pub const BUSY_LABEL: &str = "Thinking...";

/// Errors raised synchronously by form actions.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Please upload an image and ask a question.")]
    MissingInput,

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the user sees on the form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    image: Option<ImageFile>,
    preview_url: Option<PreviewUrl>,
    question: String,
    answer: String,
    loading: bool,
}

impl SessionState {
    pub fn image(&self) -> Option<&ImageFile> {
        self.image.as_ref()
    }

    pub fn preview_url(&self) -> Option<&PreviewUrl> {
        self.preview_url.as_ref()
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    token: u64,
    // set by reset: the request still clears `loading`, but its answer is dropped
    discard_answer: bool,
}

/// The query form controller.
///
/// Owns the session state and an [`AskEngine`] that sends requests off the
/// calling thread. Completions are applied by [`poll`](Self::poll) or
/// [`wait`](Self::wait); only the completion of the most recent submit can
/// change the session.
pub struct QueryForm<B: AskBackend + Send + 'static> {
    session: SessionState,
    engine: AskEngine<B>,
    last_token: u64,
    in_flight: Option<InFlight>,
}

impl QueryForm<HttpBackend> {
    /// Creates a form backed by the HTTP service at `config`.
    ///
    /// # Arguments
    /// * `config` - Where the remote service lives
    ///
    /// # Returns
    /// The form, or the error raised while building the HTTP client
    pub fn connect(config: BackendConfig) -> Result<Self, BackendError> {
        Ok(Self::new(HttpBackend::new(config)?))
    }
}

impl<B: AskBackend + Send + 'static> QueryForm<B> {
    /// Creates an empty form whose requests go to `backend`.
    ///
    /// # Arguments
    /// * `backend` - The backend, moved onto the engine's worker thread
    ///
    /// # Returns
    /// A form with every field empty and nothing in flight
    pub fn new(backend: B) -> Self {
        Self {
            session: SessionState::default(),
            engine: AskEngine::new(backend),
            last_token: 0,
            in_flight: None,
        }
    }

    /// Returns everything the user currently sees.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// The selected image, if any.
    pub fn image(&self) -> Option<&ImageFile> {
        self.session.image()
    }

    /// Preview reference of the selected image; set exactly when an image is.
    pub fn preview_url(&self) -> Option<&PreviewUrl> {
        self.session.preview_url()
    }

    pub fn question(&self) -> &str {
        self.session.question()
    }

    /// The answer text, or a rendered error. Empty until a request settles.
    pub fn answer(&self) -> &str {
        self.session.answer()
    }

    /// Whether the latest request is still outstanding.
    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Text for the submit action.
    pub fn ask_label(&self) -> &'static str {
        if self.session.loading { BUSY_LABEL } else { ASK_LABEL }
    }

    /// Whether the submit action should be enabled.
    pub fn can_submit(&self) -> bool {
        !self.session.loading
    }

    /// Whether the worker is currently waiting on the backend.
    pub fn engine_state(&self) -> AskEngineState {
        self.engine.state()
    }

    /// Stores `image`, gives it a fresh preview and clears the previous answer.
    pub fn select_image(&mut self, image: ImageFile) {
        log::debug!("Selected {} ({} bytes)", image.name, image.len());
        self.session.preview_url = Some(PreviewUrl::for_image(&image));
        self.session.image = Some(image);
        self.session.answer.clear();
    }

    /// Reads `path` and selects it. State is untouched if the read fails.
    pub fn select_image_path(&mut self, path: impl AsRef<Path>) -> Result<(), FormError> {
        let image = ImageFile::from_path(path)?;
        self.select_image(image);
        Ok(())
    }

    /// Replaces the question text.
    pub fn set_question(&mut self, question: impl Into<String>) {
        self.session.question = question.into();
    }

    /// Sends the current image and question.
    ///
    /// Fails with [`FormError::MissingInput`] without sending anything when
    /// either is missing. A submit while another request is outstanding
    /// supersedes it. Returns the token of the new request.
    pub fn submit(&mut self) -> Result<u64, FormError> {
        let image = match &self.session.image {
            Some(image) if !self.session.question.is_empty() => image.clone(),
            _ => return Err(FormError::MissingInput),
        };

        self.last_token += 1;
        let token = self.last_token;
        let superseded = self.in_flight.replace(InFlight {
            token,
            discard_answer: false,
        });
        if let Some(previous) = superseded {
            log::debug!("Request #{} superseded by #{token}", previous.token);
        }

        self.session.loading = true;
        self.engine.schedule(
            token,
            AskRequest {
                image,
                question: self.session.question.clone(),
            },
        );

        Ok(token)
    }

    /// Clears image, preview, question and answer.
    ///
    /// An outstanding request keeps running and still ends the loading state
    /// when it settles, but its answer is not shown.
    pub fn reset(&mut self) {
        self.session.image = None;
        self.session.preview_url = None;
        self.session.question.clear();
        self.session.answer.clear();
        if let Some(in_flight) = &mut self.in_flight {
            in_flight.discard_answer = true;
        }
    }

    /// Applies every completion that has arrived, without blocking.
    ///
    /// Returns `true` if the latest request settled.
    pub fn poll(&mut self) -> bool {
        let mut settled = false;
        loop {
            match self.engine.try_poll_response() {
                AskEngineResult::Settled(response) => settled |= self.settle(response),
                AskEngineResult::Empty(_) => return settled,
                AskEngineResult::Error(message) => return settled | self.abandon(&message),
            }
        }
    }

    /// Blocks until the latest request settles or `timeout` elapses.
    ///
    /// Returns `true` if it settled (or nothing was outstanding).
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.engine.wait_response(remaining) {
                AskEngineResult::Settled(response) => {
                    if self.settle(response) {
                        return true;
                    }
                }
                AskEngineResult::Empty(_) => return false,
                AskEngineResult::Error(message) => return self.abandon(&message),
            }
        }
        true
    }

    fn settle(&mut self, response: AskEngineResponse<B::Error>) -> bool {
        let discard_answer = match self.in_flight {
            Some(in_flight) if in_flight.token == response.id => in_flight.discard_answer,
            _ => {
                log::debug!("Discarding stale response #{}", response.id);
                return false;
            }
        };

        log::debug!(
            "Request #{} ({:?}) settled after {:?}",
            response.id,
            response.question,
            response.duration
        );

        self.in_flight = None;
        self.session.loading = false;

        if discard_answer {
            log::debug!("Form was reset, answer for #{} dropped", response.id);
            return true;
        }

        self.session.answer = match response.outcome {
            Ok(body) => render_answer(&body),
            Err(e) => {
                log::warn!("Request #{} failed: {e}", response.id);
                render_failure(e)
            }
        };
        true
    }

    // The worker is gone; nothing in flight will ever settle on its own.
    fn abandon(&mut self, message: &str) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        self.session.loading = false;
        if !in_flight.discard_answer {
            self.session.answer = render_failure(message);
        }
        true
    }
}
