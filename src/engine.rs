use crate::backend::{AskBackend, AskRequest};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

type Outcome<B> = Result<serde_json::Value, <B as AskBackend>::Error>;

/// Represents the current state of the dispatch engine.
#[derive(Clone, Debug, PartialEq)]
pub enum AskEngineState {
    /// The worker is idle and ready to send a new request.
    Idle,
    /// The worker is waiting on the backend.
    Processing,
}

impl AskEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AskEngineState::Idle => "idle",
            AskEngineState::Processing => "processing",
        }
    }
}

struct AskEngineRequest {
    id: u64,
    request: AskRequest,
}

/// A settled request, as delivered back to the thread that scheduled it.
pub struct AskEngineResponse<E> {
    /// Identifier given to [`AskEngine::schedule`].
    pub id: u64,
    /// Timestamp when the request was handed to the backend.
    pub start_time: Instant,
    /// Time the backend took to settle the request.
    pub duration: Duration,
    /// The question that was asked.
    pub question: String,
    /// Parsed response body, or the transport failure.
    pub outcome: Result<serde_json::Value, E>,
}

/// Result type returned when polling for completions.
pub enum AskEngineResult<E> {
    /// A request settled.
    Settled(AskEngineResponse<E>),
    /// Nothing available yet, with current engine state.
    Empty(AskEngineState),
    /// The worker is gone.
    Error(String),
}

/// Runs an [`AskBackend`] on a worker thread.
///
/// Requests are sent over a channel. When several are queued by the time the
/// worker is free, only the newest is sent and the older ones are dropped
/// without a completion. Completions come back over a second channel and are
/// picked up with
/// [`try_poll_response`](Self::try_poll_response) or
/// [`wait_response`](Self::wait_response). The engine never blocks the
/// thread that schedules work.
pub struct AskEngine<B: AskBackend + Send + 'static>
where
    B::Error: Send + 'static,
{
    state: Arc<Mutex<AskEngineState>>,
    req_tx: Option<mpsc::Sender<AskEngineRequest>>,
    rep_rx: Mutex<mpsc::Receiver<AskEngineResponse<B::Error>>>,
    worker_handle: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl<B: AskBackend + Send + 'static> AskEngine<B>
where
    B::Error: Send + 'static,
{
    /// Creates a new engine, moving `backend` onto a freshly spawned worker
    /// thread.
    ///
    /// # Arguments
    /// * `backend` - The backend that will send every scheduled request
    ///
    /// # Returns
    /// A new `AskEngine` ready to accept requests
    pub fn new(mut backend: B) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<AskEngineRequest>();
        let (rep_tx, rep_rx) = mpsc::channel::<AskEngineResponse<B::Error>>();
        let state = Arc::new(Mutex::new(AskEngineState::Idle));
        let stopping = Arc::new(AtomicBool::new(false));

        let worker_handle = std::thread::spawn({
            let state = state.clone();
            let stopping = stopping.clone();
            move || {
                while let Ok(mut req) = req_rx.recv() {
                    if stopping.load(Ordering::Acquire) {
                        log::debug!("Engine stopping, request #{} dropped", req.id);
                        break;
                    }

                    // only the newest queued request is worth sending
                    while let Ok(newer) = req_rx.try_recv() {
                        log::debug!("Request #{} superseded by #{}", req.id, newer.id);
                        req = newer;
                    }

                    log::debug!("Sending request #{}", req.id);

                    let question = req.request.question.clone();

                    set_state(&state, AskEngineState::Processing);
                    let start_time = Instant::now();

                    let outcome: Outcome<B> = backend.ask(req.request);

                    log::debug!(
                        "Request #{} settled in {:?}",
                        req.id,
                        start_time.elapsed()
                    );

                    set_state(&state, AskEngineState::Idle);

                    let settled = AskEngineResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        question,
                        outcome,
                    };
                    if rep_tx.send(settled).is_err() {
                        log::warn!("Completion receiver dropped, stopping worker");
                        break;
                    }
                }
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            rep_rx: Mutex::new(rep_rx),
            worker_handle: Some(worker_handle),
            stopping,
        }
    }

    /// Returns the current state of the worker.
    pub fn state(&self) -> AskEngineState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Queues `request` under the caller-chosen `id`.
    pub fn schedule(&self, id: u64, request: AskRequest) {
        match &self.req_tx {
            Some(tx) => {
                if tx.send(AskEngineRequest { id, request }).is_err() {
                    log::error!("Worker is gone, request #{id} dropped");
                }
            }
            None => log::error!("Engine stopped, request #{id} dropped"),
        }
    }

    /// Retrieves a completion without blocking.
    pub fn try_poll_response(&self) -> AskEngineResult<B::Error> {
        let rx = match self.rep_rx.lock() {
            Ok(rx) => rx,
            Err(poisoned) => poisoned.into_inner(),
        };
        match rx.try_recv() {
            Ok(response) => AskEngineResult::Settled(response),
            Err(mpsc::TryRecvError::Empty) => AskEngineResult::Empty(self.state()),
            Err(mpsc::TryRecvError::Disconnected) => {
                log::error!("Completion channel disconnected");
                AskEngineResult::Error("Completion channel disconnected".to_string())
            }
        }
    }

    /// Waits up to `timeout` for the next completion.
    pub fn wait_response(&self, timeout: Duration) -> AskEngineResult<B::Error> {
        let rx = match self.rep_rx.lock() {
            Ok(rx) => rx,
            Err(poisoned) => poisoned.into_inner(),
        };
        match rx.recv_timeout(timeout) {
            Ok(response) => AskEngineResult::Settled(response),
            Err(mpsc::RecvTimeoutError::Timeout) => AskEngineResult::Empty(self.state()),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::error!("Completion channel disconnected");
                AskEngineResult::Error("Completion channel disconnected".to_string())
            }
        }
    }

    /// Closes the request channel and joins the worker.
    ///
    /// Queued requests are dropped unsent; a request the backend is already
    /// working on is waited for.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        self.req_tx.take();
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

impl<B: AskBackend + Send + 'static> Drop for AskEngine<B>
where
    B::Error: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<AskEngineState>, next: AskEngineState) {
    match state.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageFile;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("unreachable")]
    struct Never;

    struct Echo;

    impl AskBackend for Echo {
        type Error = Never;

        fn ask(&mut self, request: AskRequest) -> Result<serde_json::Value, Self::Error> {
            Ok(json!({ "answer": request.question }))
        }
    }

    // Records each question, then holds it until the test releases it.
    struct Gate {
        release: mpsc::Receiver<()>,
        asked: Arc<Mutex<Vec<String>>>,
    }

    impl AskBackend for Gate {
        type Error = Never;

        fn ask(&mut self, request: AskRequest) -> Result<serde_json::Value, Self::Error> {
            self.asked.lock().unwrap().push(request.question.clone());
            let _ = self.release.recv();
            Ok(json!({ "answer": request.question }))
        }
    }

    fn gated() -> (AskEngine<Gate>, mpsc::Sender<()>, Arc<Mutex<Vec<String>>>) {
        let (release_tx, release) = mpsc::channel();
        let asked = Arc::new(Mutex::new(Vec::new()));
        let engine = AskEngine::new(Gate {
            release,
            asked: asked.clone(),
        });
        (engine, release_tx, asked)
    }

    fn wait_for_asks(asked: &Mutex<Vec<String>>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while asked.lock().unwrap().len() < count {
            assert!(Instant::now() < deadline, "backend never saw request {count}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn settled_id<E>(result: AskEngineResult<E>) -> u64 {
        match result {
            AskEngineResult::Settled(response) => response.id,
            _ => panic!("expected a completion"),
        }
    }

    fn request(question: &str) -> AskRequest {
        AskRequest {
            image: ImageFile::from_bytes("cat.png", vec![1, 2, 3]),
            question: question.to_string(),
        }
    }

    #[test]
    fn completions_keep_ids() {
        let engine = AskEngine::new(Echo);

        for (id, question) in [(7, "first"), (8, "second")] {
            engine.schedule(id, request(question));
            match engine.wait_response(Duration::from_secs(5)) {
                AskEngineResult::Settled(response) => {
                    assert_eq!(response.id, id);
                    assert_eq!(response.question, question);
                    assert_eq!(response.outcome.unwrap(), json!({ "answer": question }));
                }
                _ => panic!("expected a completion for #{id}"),
            }
        }
    }

    #[test]
    fn queued_requests_collapse_to_newest() {
        let (engine, release, asked) = gated();
        engine.schedule(1, request("first"));
        wait_for_asks(&asked, 1);
        assert_eq!(engine.state(), AskEngineState::Processing);

        engine.schedule(2, request("second"));
        engine.schedule(3, request("third"));
        release.send(()).unwrap();
        release.send(()).unwrap();

        assert_eq!(settled_id(engine.wait_response(Duration::from_secs(5))), 1);
        assert_eq!(settled_id(engine.wait_response(Duration::from_secs(5))), 3);
        assert_eq!(*asked.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn stop_drops_queued_requests() {
        let (mut engine, release, asked) = gated();
        engine.schedule(1, request("first"));
        wait_for_asks(&asked, 1);
        engine.schedule(2, request("second"));
        engine.schedule(3, request("third"));

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = release.send(());
        });
        engine.stop();
        releaser.join().unwrap();

        assert_eq!(*asked.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn empty_poll_reports_idle() {
        let engine = AskEngine::new(Echo);
        match engine.try_poll_response() {
            AskEngineResult::Empty(state) => assert_eq!(state, AskEngineState::Idle),
            _ => panic!("nothing was scheduled"),
        }
    }

    #[test]
    fn schedule_after_stop_is_dropped() {
        let mut engine = AskEngine::new(Echo);
        engine.stop();
        engine.schedule(1, request("late"));
        assert!(matches!(
            engine.try_poll_response(),
            AskEngineResult::Error(_)
        ));
    }
}
