use crate::datastore::Datastore;
use crate::encryption::EncryptionKeySet;
use crate::error::{Result, StrongboxError};
use crate::types::*;

/// Startup check that the configured keys can read at least some of the store.
pub struct DecryptableDataDetector {
    datastore: Arc<Datastore>,
    keys: Arc<EncryptionKeySet>,
}

impl DecryptableDataDetector {
    pub fn new(datastore: Arc<Datastore>, keys: Arc<EncryptionKeySet>) -> Self {
        Self { datastore, keys }
    }

    /// Fails with `UnrecoverableKeySet` when values exist and none of them is
    /// sealed under a configured key. An empty store always passes.
    pub fn check(&self) -> Result<()> {
        let identities = self.keys.identities();
        let (total, decryptable) = self
            .datastore
            .read(|state| Ok((state.value_count(), state.value_count_with_keys(&identities))))?;

        if total > 0 && decryptable == 0 {
            tracing::error!(total, "no stored value is readable with the configured keys");
            return Err(StrongboxError::UnrecoverableKeySet { total });
        }
        if decryptable < total {
            tracing::warn!(
                total,
                decryptable,
                "some stored values are sealed under keys that are no longer configured"
            );
        }
        Ok(())
    }
}
