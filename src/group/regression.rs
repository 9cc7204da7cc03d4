//! Regression capability — lets the active task's external actor send
//! execution back to tasks that already started.
//!
//! A `RegressionHandle` is created for one scheduler iteration. It knows the
//! eligible targets at the time it was installed and carries an explicit
//! validity window: the scheduler closes it when the iteration ends, after
//! which every request is rejected with `RegressionError::Expired`.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::error::RegressionError;

/// Internal event carrying the ordered targets of an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressionSignal {
    pub targets: Vec<String>,
}

/// A task the active task may regress to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleTask {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Default)]
struct Slot {
    closed: bool,
    triggered: bool,
    signal: Option<RegressionSignal>,
}

struct Shared {
    task_id: String,
    eligible: Vec<EligibleTask>,
    dedupe: bool,
    slot: Mutex<Slot>,
    notify: Notify,
}

/// Per-iteration regression capability, cheap to clone.
#[derive(Clone)]
pub struct RegressionHandle {
    shared: Arc<Shared>,
}

impl RegressionHandle {
    pub(crate) fn new(task_id: impl Into<String>, eligible: Vec<EligibleTask>, dedupe: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                task_id: task_id.into(),
                eligible,
                dedupe,
                slot: Mutex::new(Slot::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Id of the task this capability is bound to.
    pub fn task_id(&self) -> &str {
        &self.shared.task_id
    }

    /// Targets that were eligible when the capability was installed.
    pub fn eligible(&self) -> &[EligibleTask] {
        &self.shared.eligible
    }

    /// Whether the iteration this handle belongs to is still running and no
    /// request has been accepted yet.
    pub async fn is_active(&self) -> bool {
        let slot = self.shared.slot.lock().await;
        !slot.closed && !slot.triggered
    }

    /// Request a regression to `targets`, in order.
    ///
    /// Every target must be eligible; the first one that is not is named in
    /// the error. Rejected requests leave the scheduler untouched and the
    /// task keeps running.
    pub async fn request<I, S>(&self, targets: I) -> Result<(), RegressionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut targets: Vec<String> = targets.into_iter().map(Into::into).collect();

        let mut slot = self.shared.slot.lock().await;
        if slot.closed {
            return Err(RegressionError::Expired {
                task_id: self.shared.task_id.clone(),
            });
        }
        if slot.triggered {
            return Err(RegressionError::AlreadyRequested {
                task_id: self.shared.task_id.clone(),
            });
        }
        if targets.is_empty() {
            return Err(RegressionError::EmptyRequest);
        }
        if let Some(invalid) = targets
            .iter()
            .find(|t| !self.shared.eligible.iter().any(|e| &e.id == *t))
        {
            tracing::warn!(
                task = %self.shared.task_id,
                target = %invalid,
                "Rejected regression request"
            );
            return Err(RegressionError::InvalidTarget {
                id: invalid.clone(),
                eligible: self.shared.eligible.iter().map(|e| e.id.clone()).collect(),
            });
        }
        if self.shared.dedupe {
            let mut seen = std::collections::HashSet::new();
            targets.retain(|t| seen.insert(t.clone()));
        }

        tracing::info!(
            task = %self.shared.task_id,
            targets = ?targets,
            "Regression requested"
        );
        slot.triggered = true;
        slot.signal = Some(RegressionSignal { targets });
        drop(slot);
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Wait until a request is accepted.
    pub(crate) async fn triggered(&self) -> RegressionSignal {
        loop {
            self.shared.notify.notified().await;
            if let Some(signal) = self.take_signal().await {
                return signal;
            }
        }
    }

    /// Take an accepted signal that has not been consumed yet.
    pub(crate) async fn take_signal(&self) -> Option<RegressionSignal> {
        self.shared.slot.lock().await.signal.take()
    }

    /// End the validity window and take any signal accepted before it
    /// closed. Both happen under one lock, so a request either lands in the
    /// returned signal or is rejected as expired.
    pub(crate) async fn finish(&self) -> Option<RegressionSignal> {
        let mut slot = self.shared.slot.lock().await;
        slot.closed = true;
        slot.signal.take()
    }

    /// End the validity window.
    pub(crate) async fn close(&self) {
        self.shared.slot.lock().await.closed = true;
    }
}
