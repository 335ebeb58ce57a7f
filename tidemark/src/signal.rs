use std::{cell::RefCell, fmt, rc::Rc};

use tokio_util::sync::CancellationToken;

use crate::{scheduler::Scheduler, Reason};

/// An abort signal that fires at a scheduled tick.
///
/// The flag transitions exactly once. Before its tick the signal is not
/// aborted; from the completion of that tick's drain onward
/// [`is_aborted`](Self::is_aborted) is true and
/// [`reason`](Self::reason) carries the configured reason.
///
/// # Example
///
/// ```ignore
/// let signal = harness.signal("---!", Some("shutdown".into()))?;
///
/// harness.run(async move {
///     assert!(!signal.is_aborted());
///     signal.aborted().await;
///     assert_eq!(signal.reason().unwrap().as_str(), "shutdown");
///     Ok(())
/// }).await?;
/// ```
#[derive(Clone)]
pub struct Signal {
    token: CancellationToken,
    reason: Rc<RefCell<Option<Reason>>>,
    scheduler: Scheduler,
}

impl Signal {
    pub(crate) fn new(scheduler: Scheduler) -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Rc::new(RefCell::new(None)),
            scheduler,
        }
    }

    /// True once the signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The abort reason, once fired.
    pub fn reason(&self) -> Option<Reason> {
        self.reason.borrow().clone()
    }

    /// Suspend until the signal fires. Resolves immediately if it already
    /// has.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn fire(&self, reason: Option<Reason>) {
        if self.token.is_cancelled() {
            return;
        }
        *self.reason.borrow_mut() = reason;
        self.token.cancel();
        self.scheduler.note_activity();
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("aborted", &self.is_aborted())
            .field("reason", &self.reason.borrow())
            .finish()
    }
}
