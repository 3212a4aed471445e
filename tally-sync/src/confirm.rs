//! Confirmation gate.
//!
//! An async "are you sure?" prompt. Callers `confirm` and await a decision;
//! a bound UI reads the displayed prompt through [`ConfirmationGate::view`]
//! or [`ConfirmationGate::subscribe`] and answers with `accept` or
//! `decline`. Each prompt is resolved exactly once.
//!
//! Only one prompt is displayed at a time. What happens to a `confirm` that
//! arrives while one is displayed is set by [`GatePolicy`].

use crate::error::{SyncError, SyncResult};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tally_types::PromptId;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Visual style of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Danger,
    Warning,
    Info,
    Success,
    #[default]
    Default,
}

/// Side effect run when a prompt is accepted. An `Err` keeps the prompt open.
pub type ConfirmAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Side effect run when a prompt is declined.
pub type CancelAction = Arc<dyn Fn() + Send + Sync>;

/// What to ask, and what to do with the answer.
#[derive(Clone, Default)]
pub struct ConfirmOptions {
    pub title: Option<String>,
    pub message: String,
    pub confirm_text: Option<String>,
    pub cancel_text: Option<String>,
    pub variant: Variant,
    pub on_confirm: Option<ConfirmAction>,
    pub on_cancel: Option<CancelAction>,
}

impl ConfirmOptions {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn confirm_text(mut self, text: impl Into<String>) -> Self {
        self.confirm_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn cancel_text(mut self, text: impl Into<String>) -> Self {
        self.cancel_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Runs `action` on accept, before the caller is resolved.
    #[must_use]
    pub fn on_confirm<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.on_confirm = Some(Arc::new(move || action().boxed()));
        self
    }

    #[must_use]
    pub fn on_cancel<F>(mut self, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancel = Some(Arc::new(action));
        self
    }

    /// The displayable part of these options.
    pub fn display(&self) -> PromptDisplay {
        PromptDisplay {
            title: self.title.clone(),
            message: self.message.clone(),
            confirm_text: self.confirm_text.clone(),
            cancel_text: self.cancel_text.clone(),
            variant: self.variant,
        }
    }
}

impl fmt::Debug for ConfirmOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmOptions")
            .field("title", &self.title)
            .field("message", &self.message)
            .field("variant", &self.variant)
            .field("on_confirm", &self.on_confirm.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// Prompt content as rendered by a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDisplay {
    pub title: Option<String>,
    pub message: String,
    pub confirm_text: Option<String>,
    pub cancel_text: Option<String>,
    pub variant: Variant,
}

/// What a bound UI shows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptView {
    pub id: Option<PromptId>,
    pub is_open: bool,
    pub options: Option<PromptDisplay>,
    /// The accept side effect is running.
    pub loading: bool,
    /// Prompts waiting behind the displayed one.
    pub queued: usize,
}

/// Handling of a `confirm` that arrives while a prompt is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePolicy {
    /// Wait in line; prompts are shown in arrival order.
    #[default]
    Queue,
    /// Fail with [`SyncError::GateBusy`].
    Reject,
}

/// Configuration for a confirmation gate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub policy: GatePolicy,
}

struct Prompt {
    id: PromptId,
    options: ConfirmOptions,
    resolve: oneshot::Sender<bool>,
}

#[derive(Default)]
struct GateState {
    current: Option<Prompt>,
    queue: VecDeque<Prompt>,
    loading: bool,
}

impl GateState {
    /// Shows the next queued prompt whose caller is still waiting.
    fn promote(&mut self) {
        while self.current.is_none() {
            match self.queue.pop_front() {
                Some(prompt) if prompt.resolve.is_closed() => {
                    debug!("Skipping prompt {} abandoned by its caller", prompt.id);
                }
                Some(prompt) => self.current = Some(prompt),
                None => break,
            }
        }
    }

    fn view(&self) -> PromptView {
        match &self.current {
            Some(prompt) => PromptView {
                id: Some(prompt.id),
                is_open: true,
                options: Some(prompt.options.display()),
                loading: self.loading,
                queued: self.queue.len(),
            },
            None => PromptView::default(),
        }
    }
}

struct Inner {
    config: GateConfig,
    state: Mutex<GateState>,
    view: watch::Sender<PromptView>,
}

/// Handle to a confirmation gate. Clones share the same prompts.
#[derive(Clone)]
pub struct ConfirmationGate {
    inner: Arc<Inner>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

impl ConfirmationGate {
    pub fn new(config: GateConfig) -> Self {
        let (view, _) = watch::channel(PromptView::default());
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(GateState::default()),
                view,
            }),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Asks for a decision and waits for it.
    ///
    /// Resolves `true` once accepted (after `on_confirm` succeeded) and
    /// `false` once declined. Dropping the returned future withdraws the
    /// prompt if it is still queued.
    pub async fn confirm(&self, options: ConfirmOptions) -> SyncResult<bool> {
        let (resolve, decision) = oneshot::channel();
        let prompt = Prompt {
            id: PromptId::generate(),
            options,
            resolve,
        };

        {
            let mut state = self.inner.state.lock();
            state.promote();
            if state.current.is_some() {
                if self.inner.config.policy == GatePolicy::Reject {
                    debug!("Rejecting prompt {}, another is displayed", prompt.id);
                    return Err(SyncError::GateBusy);
                }
                debug!("Queueing prompt {}", prompt.id);
                state.queue.push_back(prompt);
            } else {
                debug!("Displaying prompt {}", prompt.id);
                state.current = Some(prompt);
            }
            self.publish(&state);
        }

        decision.await.map_err(|_| SyncError::GateClosed)
    }

    /// Accepts the displayed prompt.
    ///
    /// Returns `Ok(false)` when nothing was resolved: no prompt is displayed
    /// or an accept is already running. If `on_confirm` fails the prompt
    /// stays open and its error is returned.
    pub async fn accept(&self) -> SyncResult<bool> {
        self.accept_matching(None).await
    }

    /// Declines the displayed prompt. Returns whether a prompt was resolved.
    ///
    /// Ignored while no prompt is displayed or an accept is running.
    pub fn decline(&self) -> bool {
        self.decline_matching(None)
    }

    /// Accepts or declines prompt `id`, if it is the displayed one.
    pub async fn respond(&self, id: PromptId, accept: bool) -> SyncResult<bool> {
        if accept {
            self.accept_matching(Some(id)).await
        } else {
            Ok(self.decline_matching(Some(id)))
        }
    }

    /// The current prompt as a UI should show it.
    pub fn view(&self) -> PromptView {
        self.inner.state.lock().view()
    }

    /// Receives every change of [`view`](Self::view).
    pub fn subscribe(&self) -> watch::Receiver<PromptView> {
        self.inner.view.subscribe()
    }

    /// Drops every prompt without a decision. Their callers get
    /// [`SyncError::GateClosed`].
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.queue.len() + usize::from(state.current.is_some());
        *state = GateState::default();
        debug!("Gate reset, {} prompts dropped", dropped);
        self.publish(&state);
    }

    async fn accept_matching(&self, expected: Option<PromptId>) -> SyncResult<bool> {
        let (id, action) = {
            let mut state = self.inner.state.lock();
            let Some(prompt) = state.current.as_ref() else {
                return Ok(false);
            };
            if state.loading || expected.is_some_and(|e| e != prompt.id) {
                return Ok(false);
            }
            let id = prompt.id;
            let action = prompt.options.on_confirm.clone();
            if action.is_some() {
                state.loading = true;
                self.publish(&state);
            }
            (id, action)
        };

        if let Some(action) = action {
            let mut running = Loading {
                gate: self,
                armed: true,
            };
            if let Err(message) = action().await {
                drop(running);
                warn!("Confirm action for prompt {} failed: {}", id, message);
                return Err(SyncError::ConfirmFailed(message));
            }
            // Loading is cleared below, in the same critical section that
            // resolves the prompt.
            running.armed = false;
        }

        let prompt = {
            let mut state = self.inner.state.lock();
            state.loading = false;
            let prompt = match state.current.take() {
                Some(prompt) if prompt.id == id => {
                    state.promote();
                    Some(prompt)
                }
                other => {
                    state.current = other;
                    None
                }
            };
            self.publish(&state);
            match prompt {
                Some(prompt) => prompt,
                None => return Ok(false),
            }
        };
        debug!("Prompt {} accepted", id);
        let _ = prompt.resolve.send(true);
        Ok(true)
    }

    fn decline_matching(&self, expected: Option<PromptId>) -> bool {
        let prompt = {
            let mut state = self.inner.state.lock();
            if state.loading {
                debug!("Ignoring decline while the confirm action runs");
                return false;
            }
            match state.current.take() {
                Some(prompt) if expected.is_none_or(|e| e == prompt.id) => {
                    state.promote();
                    self.publish(&state);
                    prompt
                }
                other => {
                    state.current = other;
                    return false;
                }
            }
        };

        debug!("Prompt {} declined", prompt.id);
        if let Some(action) = &prompt.options.on_cancel {
            action();
        }
        let _ = prompt.resolve.send(false);
        true
    }

    fn publish(&self, state: &GateState) {
        self.inner.view.send_replace(state.view());
    }
}

/// Clears the loading flag when the confirm action ends or is dropped.
struct Loading<'a> {
    gate: &'a ConfirmationGate,
    armed: bool,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.gate.inner.state.lock();
        state.loading = false;
        self.gate.publish(&state);
    }
}
