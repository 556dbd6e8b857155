//! Credential provider seam
//!
//! The engine never stores a token. It asks the provider for the current
//! credential on every authenticated call and watches it for revocation and
//! re-authorization.

use compact_str::CompactString;
use tokio::sync::watch;
use tracing::info;

/// Opaque authorization token
#[derive(Clone, Eq, PartialEq)]
pub struct Credential(CompactString);

impl Credential {
    pub fn new(token: impl Into<CompactString>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

pub trait CredentialProvider: Send + Sync {
    /// The credential to use for the next call, `None` once revoked
    fn credential(&self) -> Option<Credential>;

    /// Change feed: `None` signals revocation, `Some` (re-)authorization
    fn subscribe(&self) -> watch::Receiver<Option<Credential>>;
}

/// In-memory provider fed by an external authorization flow
#[derive(Debug)]
pub struct CredentialStore {
    tx: watch::Sender<Option<Credential>>,
}

impl CredentialStore {
    pub fn new(initial: Option<Credential>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Install a new token
    pub fn set(&self, credential: Credential) {
        info!("Credential installed");
        self.tx.send_replace(Some(credential));
    }

    /// Invalidate the token in place
    pub fn revoke(&self) {
        info!("Credential revoked");
        self.tx.send_replace(None);
    }
}

impl CredentialProvider for CredentialStore {
    fn credential(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_token() {
        let c = Credential::new("ghp_secretsecretsecret");
        assert_eq!(format!("{c:?}"), "Credential(***)");
        assert_eq!(c.expose(), "ghp_secretsecretsecret");
    }

    #[tokio::test]
    async fn revocation_is_observed_by_subscribers() {
        let store = CredentialStore::new(Some(Credential::new("gho_token")));
        let mut rx = store.subscribe();

        store.revoke();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
        assert!(store.credential().is_none());

        store.set(Credential::new("gho_other"));
        rx.changed().await.unwrap();
        assert_eq!(store.credential(), Some(Credential::new("gho_other")));
    }
}
