//! Prompt supersession
//!
//! Only one prompt may be listening at a time. `begin()` bumps the prompt id
//! and publishes it on a `watch` channel before the new session subscribes to
//! the bus; every earlier [`SessionTicket`] observes the change and stops.
//! Because the publish is synchronous and each session re-checks its ticket
//! before dispatching, an event that arrives after prompt N+1 began can never
//! reach a handler of prompt N.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::logging;

struct SupervisorInner {
    current: watch::Sender<u64>,
    next_id: AtomicU64,
    tab_index: AtomicUsize,
}

/// Owns the prompt id sequence and the "end previous" signal
#[derive(Clone)]
pub struct PromptSupervisor {
    inner: Arc<SupervisorInner>,
}

/// Which prompt and tab an async result was started for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Epoch {
    pub prompt_id: u64,
    pub tab_index: usize,
}

impl Default for PromptSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptSupervisor {
    pub fn new() -> Self {
        let (current, _) = watch::channel(0);
        PromptSupervisor {
            inner: Arc::new(SupervisorInner {
                current,
                next_id: AtomicU64::new(0),
                tab_index: AtomicUsize::new(0),
            }),
        }
    }

    /// End every earlier session and hand out the ticket for a new one.
    ///
    /// Callers must subscribe to the bus only after this returns.
    pub fn begin(&self) -> SessionTicket {
        let prompt_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.inner.current.send_replace(prompt_id);
        if previous != 0 {
            logging::log_prompt_event(previous, "superseded", None);
        }
        logging::log_prompt_event(prompt_id, "begin", None);

        SessionTicket {
            prompt_id,
            rx: self.inner.current.subscribe(),
        }
    }

    pub fn current_prompt_id(&self) -> u64 {
        *self.inner.current.borrow()
    }

    pub fn tab_index(&self) -> usize {
        self.inner.tab_index.load(Ordering::SeqCst)
    }

    pub fn set_tab_index(&self, index: usize) {
        self.inner.tab_index.store(index, Ordering::SeqCst);
    }

    pub fn epoch(&self) -> Epoch {
        Epoch {
            prompt_id: self.current_prompt_id(),
            tab_index: self.tab_index(),
        }
    }

    /// False once a newer prompt began or the tab switched
    pub fn is_epoch_current(&self, epoch: Epoch) -> bool {
        self.epoch() == epoch
    }
}

/// One session's claim on the prompt; goes stale when a newer prompt begins
#[derive(Clone)]
pub struct SessionTicket {
    prompt_id: u64,
    rx: watch::Receiver<u64>,
}

impl SessionTicket {
    pub fn prompt_id(&self) -> u64 {
        self.prompt_id
    }

    pub fn is_current(&self) -> bool {
        *self.rx.borrow() == self.prompt_id
    }

    /// Resolves once a newer prompt has begun
    pub async fn ended(&self) {
        let mut rx = self.rx.clone();
        let prompt_id = self.prompt_id;
        let superseded = rx.wait_for(|current| *current != prompt_id).await.is_ok();
        if !superseded {
            // Supervisor dropped: nothing can supersede us anymore
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_begin_ends_previous_ticket() {
        let supervisor = PromptSupervisor::new();
        let first = supervisor.begin();
        assert!(first.is_current());

        let second = supervisor.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(second.prompt_id(), first.prompt_id() + 1);
        assert_eq!(supervisor.current_prompt_id(), second.prompt_id());
    }

    #[tokio::test]
    async fn test_ended_resolves_on_supersession() {
        let supervisor = PromptSupervisor::new();
        let first = supervisor.begin();

        let waiter = {
            let first = first.clone();
            tokio::spawn(async move { first.ended().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let _second = supervisor.begin();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("ticket should end")
            .unwrap();
    }

    #[tokio::test]
    async fn test_ended_is_immediate_for_stale_ticket() {
        let supervisor = PromptSupervisor::new();
        let stale = supervisor.begin();
        supervisor.begin();
        tokio::time::timeout(Duration::from_millis(100), stale.ended())
            .await
            .expect("stale ticket ends immediately");
    }

    #[test]
    fn test_epoch_tracks_tab_switches() {
        let supervisor = PromptSupervisor::new();
        supervisor.begin();
        let epoch = supervisor.epoch();
        assert!(supervisor.is_epoch_current(epoch));

        supervisor.set_tab_index(2);
        assert!(!supervisor.is_epoch_current(epoch));
        assert_eq!(supervisor.epoch().tab_index, 2);
    }
}
