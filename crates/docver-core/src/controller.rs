//! DocumentController: load latest / save as new version for one document.
//!
//! State moves through an explicit `Phase`:
//!
//! ```text
//! Uninitialized -> Loading -> Ready -> Saving -> Ready
//!                     \                   \
//!                      -> Failed(Load)     -> Failed(Save)
//! ```
//!
//! `Failed` behaves like `Ready` for every operation, so the user retries by
//! calling `open` or `save` again. Loading and saving are serialized by the
//! phase itself: a second load or save is refused before any request goes
//! out. Saving covers both the create request and the reload that follows.
//!
//! The state lock is never held across an `.await`. If an in-flight `open` or
//! `save` future is dropped, the phase it replaced is restored.

use crate::client::{ApiClient, ApiError, RequestBody, RequestOptions};
use crate::events::{ControllerEvent, EventBus, Subscription};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::version::{latest_version_path, versions_path, Version, VersionDescriptor};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Operation a controller can have in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Save,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Load => write!(f, "load"),
            Operation::Save => write!(f, "save"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing loaded yet.
    Uninitialized,
    Loading,
    Ready,
    Saving,
    /// The last operation failed. Same permissions as `Ready`.
    Failed(Operation),
}

impl Phase {
    /// The operation in flight, if any.
    pub fn busy_with(&self) -> Option<Operation> {
        match self {
            Phase::Loading => Some(Operation::Load),
            Phase::Saving => Some(Operation::Save),
            Phase::Uninitialized | Phase::Ready | Phase::Failed(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Failed to load document content: {0}")]
    LoadFailed(#[source] ApiError),

    #[error("Save failed: {0}")]
    SaveFailed(#[source] ApiError),

    #[error("Content cannot be empty")]
    Validation,

    #[error("Document has not been loaded yet")]
    NotLoaded,

    #[error("Document is in view mode")]
    ReadOnly,

    #[error("A {0} is already in progress")]
    Busy(Operation),

    #[error("Document view has been closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Copy of the controller state for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub phase: Phase,
    pub text: String,
    pub latest: Option<VersionDescriptor>,
    pub view_mode: bool,
}

struct State {
    phase: Phase,
    buffer: String,
    latest: Option<VersionDescriptor>,
    /// At least one load succeeded, so the buffer is safe to submit.
    loaded: bool,
    view_mode: bool,
    closed: bool,
}

/// Restores the previous phase if an in-flight operation is dropped.
struct InFlight<'a> {
    state: &'a Mutex<State>,
    resume: Phase,
    armed: bool,
}

impl InFlight<'_> {
    /// Completion path: the caller sets the final phase itself.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.phase.busy_with().is_some() {
                state.phase = self.resume;
            }
        }
    }
}

/// Per-document load/edit/save state.
///
/// Share behind `Arc` to drive it from several tasks; the phase guard keeps
/// at most one load or save outstanding.
pub struct DocumentController<T: HttpTransport = ReqwestTransport> {
    document_id: String,
    client: Arc<ApiClient<T>>,
    state: Mutex<State>,
    events: Arc<EventBus>,
}

impl<T: HttpTransport> DocumentController<T> {
    pub fn new(document_id: impl Into<String>, client: Arc<ApiClient<T>>) -> Self {
        Self {
            document_id: document_id.into(),
            client,
            state: Mutex::new(State {
                phase: Phase::Uninitialized,
                buffer: String::new(),
                latest: None,
                loaded: false,
                view_mode: false,
                closed: false,
            }),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn client(&self) -> &Arc<ApiClient<T>> {
        &self.client
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(ControllerEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(callback)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Current edit buffer.
    pub fn text(&self) -> String {
        self.lock().buffer.clone()
    }

    pub fn latest(&self) -> Option<VersionDescriptor> {
        self.lock().latest.clone()
    }

    pub fn is_view_mode(&self) -> bool {
        self.lock().view_mode
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        let state = self.lock();
        DocumentSnapshot {
            phase: state.phase,
            text: state.buffer.clone(),
            latest: state.latest.clone(),
            view_mode: state.view_mode,
        }
    }

    /// Load the latest version into the buffer.
    ///
    /// A document with no versions yet loads as an empty buffer with no
    /// descriptor. Calling this while a load is running does nothing.
    pub async fn open(&self) -> Result<()> {
        let guard = {
            let mut state = self.lock();
            if state.closed {
                return Err(ControllerError::Closed);
            }
            match state.phase.busy_with() {
                Some(Operation::Load) => {
                    debug!("Load already in progress for {}, ignoring", self.document_id);
                    return Ok(());
                }
                Some(Operation::Save) => return Err(ControllerError::Busy(Operation::Save)),
                None => {}
            }
            self.begin(&mut state, Phase::Loading)
        };

        let fetched = self.fetch_latest().await;

        let mut state = self.lock();
        guard.disarm();
        if state.closed {
            debug!("Discarding load result for closed document {}", self.document_id);
            return Err(ControllerError::Closed);
        }

        match fetched {
            Ok(version) => {
                match version {
                    Some(version) => {
                        state.latest = Some(version.descriptor());
                        state.buffer = version.text().to_string();
                    }
                    None => {
                        state.latest = None;
                        state.buffer.clear();
                    }
                }
                state.phase = Phase::Ready;
                state.loaded = true;
                let latest = state.latest.clone();
                drop(state);

                match &latest {
                    Some(descriptor) => info!("Loaded {} ({})", self.document_id, descriptor),
                    None => info!("Document {} has no versions yet", self.document_id),
                }
                self.events.emit(ControllerEvent::Loaded {
                    document_id: self.document_id.clone(),
                    latest,
                });
                Ok(())
            }
            Err(e) => {
                state.phase = Phase::Failed(Operation::Load);
                drop(state);
                Err(self.load_failed(e))
            }
        }
    }

    /// Replace the edit buffer verbatim.
    pub fn edit(&self, text: impl Into<String>) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(ControllerError::Closed);
        }
        if let Some(operation) = state.phase.busy_with() {
            return Err(ControllerError::Busy(operation));
        }
        if state.view_mode {
            return Err(ControllerError::ReadOnly);
        }
        state.buffer = text.into();
        Ok(())
    }

    /// Submit the buffer as a new version, then reload the latest version.
    ///
    /// Returns the descriptor of the version the service now reports as
    /// latest. On any failure, including a reload that fails after the
    /// version was created, the buffer is left untouched so the save can be
    /// retried.
    pub async fn save(&self) -> Result<Option<VersionDescriptor>> {
        let (guard, text) = {
            let mut state = self.lock();
            if state.closed {
                return Err(ControllerError::Closed);
            }
            if let Some(operation) = state.phase.busy_with() {
                debug!("{} in progress for {}, refusing save", operation, self.document_id);
                return Err(ControllerError::Busy(operation));
            }
            if state.buffer.trim().is_empty() {
                warn!("Refusing to save empty content for {}", self.document_id);
                return Err(ControllerError::Validation);
            }
            if !state.loaded {
                return Err(ControllerError::NotLoaded);
            }
            let text = state.buffer.clone();
            (self.begin(&mut state, Phase::Saving), text)
        };

        let created = self
            .client
            .request(
                &versions_path(&self.document_id),
                RequestOptions::post(RequestBody::Json(serde_json::json!({ "text": text }))),
            )
            .await;

        if let Err(e) = created {
            let mut state = self.lock();
            guard.disarm();
            if state.closed {
                return Err(ControllerError::Closed);
            }
            state.phase = Phase::Failed(Operation::Save);
            drop(state);
            return Err(self.save_failed(e));
        }

        info!("Saved! New version created for {}", self.document_id);
        self.events.emit(ControllerEvent::VersionCreated {
            document_id: self.document_id.clone(),
        });

        // Still Saving: the reload is part of the save
        let reloaded = self.fetch_latest().await;

        let mut state = self.lock();
        guard.disarm();
        if state.closed {
            return Err(ControllerError::Closed);
        }

        match reloaded {
            Ok(version) => {
                match version {
                    Some(version) => {
                        state.latest = Some(version.descriptor());
                        state.buffer = version.text().to_string();
                    }
                    None => warn!(
                        "Service reported no versions for {} right after a save",
                        self.document_id
                    ),
                }
                state.phase = Phase::Ready;
                let latest = state.latest.clone();
                drop(state);

                self.events.emit(ControllerEvent::Saved {
                    document_id: self.document_id.clone(),
                    latest: latest.clone(),
                });
                Ok(latest)
            }
            Err(e) => {
                // The version exists, but the buffer can't be reconciled with it
                state.phase = Phase::Failed(Operation::Save);
                drop(state);
                Err(self.save_failed(e))
            }
        }
    }

    /// Flip view (read-only) mode. Returns the new value.
    pub fn toggle_view_mode(&self) -> bool {
        let view_mode = !self.is_view_mode();
        self.set_view_mode(view_mode);
        view_mode
    }

    pub fn set_view_mode(&self, view_mode: bool) {
        let changed = {
            let mut state = self.lock();
            let changed = state.view_mode != view_mode;
            state.view_mode = view_mode;
            changed
        };
        if changed {
            self.events.emit(ControllerEvent::ViewModeChanged {
                document_id: self.document_id.clone(),
                view_mode,
            });
        }
    }

    /// Tear down the view. In-flight requests still complete, but their
    /// results are discarded and every later call fails with `Closed`.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            debug!("Closed document {}", self.document_id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, state: &mut State, phase: Phase) -> InFlight<'_> {
        let resume = std::mem::replace(&mut state.phase, phase);
        InFlight {
            state: &self.state,
            resume,
            armed: true,
        }
    }

    async fn fetch_latest(&self) -> std::result::Result<Option<Version>, ApiError> {
        let endpoint = latest_version_path(&self.document_id);
        let payload = self.client.get(&endpoint).await?;
        payload
            .into_json::<Version>()
            .map_err(|source| ApiError::Decode { endpoint, source })
    }

    fn save_failed(&self, e: ApiError) -> ControllerError {
        error!("Save failed for {}: {}", self.document_id, e);
        self.events.emit(ControllerEvent::SaveFailed {
            document_id: self.document_id.clone(),
            message: e.to_string(),
        });
        ControllerError::SaveFailed(e)
    }

    fn load_failed(&self, e: ApiError) -> ControllerError {
        error!("Failed to load document content for {}: {}", self.document_id, e);
        self.events.emit(ControllerEvent::LoadFailed {
            document_id: self.document_id.clone(),
            message: e.to_string(),
        });
        ControllerError::LoadFailed(e)
    }
}
