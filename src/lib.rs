//! Ask a remote vision model a question about an image.
//!
//! [`QueryForm`] holds what the user has entered (an image, a question) and
//! what came back (an answer, or an error rendered as text). Requests are sent
//! by an [`AskEngine`] on a worker thread, so the thread driving the form
//! never blocks on the network; completions are applied with
//! [`QueryForm::poll`] or [`QueryForm::wait`].
//!
//! ```no_run
//! use std::time::Duration;
//! use visual_chat::{BackendConfig, QueryForm};
//!
//! let mut form = QueryForm::connect(BackendConfig::from_env())?;
//! form.select_image_path("cat.jpg")?;
//! form.set_question("What is on the table?");
//! form.submit()?;
//! form.wait(Duration::from_secs(120));
//! println!("{}", form.answer());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod answer;
pub mod backend;
pub mod config;
pub mod engine;
pub mod form;
pub mod image;

pub use answer::{render_answer, render_failure};
pub use backend::{AskBackend, AskRequest, BackendError, BackendStatus, HttpBackend};
pub use config::{BACKEND_URL_ENV, BackendConfig, DEFAULT_BACKEND_URL};
pub use engine::{AskEngine, AskEngineResponse, AskEngineResult, AskEngineState};
pub use form::{FormError, QueryForm, SessionState};
pub use image::{ImageFile, PreviewUrl};
