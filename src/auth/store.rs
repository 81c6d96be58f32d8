use super::AuthorizationRecord;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Storage for at most one [`AuthorizationRecord`] per credential identity.
///
/// The identity is the application key id. Implementations only store and
/// return records; deciding whether a record is still usable is up to the
/// caller.
pub trait TokenStore: Send + Sync {
    /// Get the record stored for `identity`.
    fn get(&self, identity: &str) -> Option<Arc<AuthorizationRecord>>;

    /// Store `record` for `identity`, replacing any previous record.
    fn put(&self, identity: &str, record: Arc<AuthorizationRecord>);

    /// Forget the record stored for `identity`.
    fn remove(&self, identity: &str);
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn get(&self, identity: &str) -> Option<Arc<AuthorizationRecord>> {
        (**self).get(identity)
    }

    fn put(&self, identity: &str, record: Arc<AuthorizationRecord>) {
        (**self).put(identity, record)
    }

    fn remove(&self, identity: &str) {
        (**self).remove(identity)
    }
}

/// In-memory [`TokenStore`], the default.
///
/// Records are lost when the process exits.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, Arc<AuthorizationRecord>>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with a stored record.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, identity: &str) -> Option<Arc<AuthorizationRecord>> {
        self.records.read().get(identity).cloned()
    }

    fn put(&self, identity: &str, record: Arc<AuthorizationRecord>) {
        self.records.write().insert(identity.to_string(), record);
    }

    fn remove(&self, identity: &str) {
        self.records.write().remove(identity);
    }
}

impl Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let identities: Vec<_> = self.records.read().keys().cloned().collect();
        f.debug_struct("MemoryTokenStore")
            .field("identities", &identities)
            .finish()
    }
}
