//! Cancellation token management for record waits.
//!
//! Every wait on a document key shares one token, so a single cancel stops
//! all of them. A wait is registered through [`WaitRegistration`], which
//! unregisters on drop, including when the request that owns it goes away.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::service::ScribeService;

/// Shared token of the waits on one document key
pub(crate) struct WaitEntry {
    token: CancellationToken,
    waiters: usize,
}

/// A registered wait; dropping it unregisters the wait.
pub(crate) struct WaitRegistration<'a> {
    service: &'a ScribeService,
    document_key: String,
    token: CancellationToken,
}

impl WaitRegistration<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        let token = &self.token;
        self.service
            .wait_tokens
            .remove_if_mut(&self.document_key, |_, entry| {
                // A cancelled token's entry is already gone; the current one
                // belongs to later waits.
                if token.is_cancelled() {
                    return false;
                }
                entry.waiters -= 1;
                entry.waiters == 0
            });
    }
}

impl ScribeService {
    /// Register a wait on `document_key`, joining the token of any wait
    /// already in flight for it.
    pub(crate) fn register_wait(&self, document_key: &str) -> WaitRegistration<'_> {
        let mut entry = self
            .wait_tokens
            .entry(document_key.to_string())
            .or_insert_with(|| WaitEntry {
                token: CancellationToken::new(),
                waiters: 0,
            });
        entry.waiters += 1;
        let token = entry.token.clone();
        drop(entry);

        WaitRegistration {
            service: self,
            document_key: document_key.to_string(),
            token,
        }
    }

    /// Cancel every in-flight wait for a document; returns whether any existed.
    pub fn cancel_wait(&self, document_key: &str) -> bool {
        let removed = self.wait_tokens.remove_if(document_key, |_, entry| {
            entry.token.cancel();
            true
        });

        match removed {
            Some((_, entry)) => {
                info!(
                    document_key = %document_key,
                    waiters = entry.waiters,
                    "Record wait cancellation triggered"
                );
                true
            }
            None => false,
        }
    }

    /// Number of waits currently in flight
    pub fn active_waits(&self) -> usize {
        self.wait_tokens.iter().map(|entry| entry.waiters).sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{ScriptedOcr, harness};

    #[test]
    fn test_registration_unregisters_on_drop() {
        let h = harness(ScriptedOcr::new());

        let first = h.service.register_wait("k_doc.pdf");
        let second = h.service.register_wait("k_doc.pdf");
        assert_eq!(h.service.active_waits(), 2);

        drop(first);
        assert_eq!(h.service.active_waits(), 1);
        drop(second);
        assert_eq!(h.service.active_waits(), 0);
        assert!(!h.service.cancel_wait("k_doc.pdf"));
    }

    #[test]
    fn test_cancel_reaches_every_waiter() {
        let h = harness(ScriptedOcr::new());

        let first = h.service.register_wait("k_doc.pdf");
        let second = h.service.register_wait("k_doc.pdf");
        assert!(h.service.cancel_wait("k_doc.pdf"));
        assert!(first.token().is_cancelled());
        assert!(second.token().is_cancelled());
        assert_eq!(h.service.active_waits(), 0);

        // A wait registered after the cancel gets a fresh token that the
        // cancelled registrations leave alone when they drop
        let later = h.service.register_wait("k_doc.pdf");
        drop(first);
        drop(second);
        assert!(!later.token().is_cancelled());
        assert_eq!(h.service.active_waits(), 1);
    }
}
