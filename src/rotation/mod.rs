//! Re-encryption of stored values under the active master key.
//!
//! Values sealed under a retired (configured but inactive) key are selected
//! in bounded batches. Each batch is decrypted and re-encrypted outside the
//! datastore lock and written back with a compare-and-swap, so a value that
//! changed in between is left for the next pass. Rotating a value that is
//! already under the active key is a successful no-op.

pub mod detector;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::datastore::Datastore;
use crate::encryption::{EncryptedValue, Encryptor};
use crate::error::Result;
use crate::types::*;

pub use detector::DecryptableDataDetector;

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// What one `rotate_all` run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub rotated: u64,
    pub failed: u64,
    /// Values under retired keys before the run.
    pub remaining_before: u64,
    /// Values under retired keys after the run.
    pub remaining_after: u64,
    pub cancelled: bool,
}

/// Result of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub selected: usize,
    pub rotated: u64,
    pub failed: u64,
}

pub struct RotationEngine {
    datastore: Arc<Datastore>,
    encryptor: Encryptor,
    batch_size: usize,
    clock: Arc<dyn Clock>,
}

impl RotationEngine {
    pub fn new(datastore: Arc<Datastore>, encryptor: Encryptor, batch_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            datastore,
            encryptor,
            batch_size: batch_size.max(1),
            clock,
        }
    }

    /// Decrypt under the value's own key, re-encrypt under the active key.
    pub fn rotate(&self, value: &EncryptedValue) -> Result<EncryptedValue> {
        if value.encryption_key_uuid == self.encryptor.key_set().active_identity() {
            return Ok(value.clone());
        }
        let plaintext = self.encryptor.decrypt(value)?;
        self.encryptor.encrypt(&plaintext)
    }

    /// Values still sealed under a retired key.
    pub fn remaining(&self) -> Result<u64> {
        let retired = self.encryptor.key_set().inactive_identities();
        if retired.is_empty() {
            return Ok(0);
        }
        self.datastore.read(|state| Ok(state.value_count_with_keys(&retired)))
    }

    /// Rotate one batch. Values whose uuid is in `skip` are not selected;
    /// values that fail are added to it.
    pub fn rotate_batch(&self, skip: &mut BTreeSet<Uuid>) -> Result<BatchOutcome> {
        let retired = self.encryptor.key_set().inactive_identities();
        if retired.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let batch = self
            .datastore
            .read(|state| Ok(state.values_encrypted_with(&retired, skip, self.batch_size)))?;
        let mut outcome = BatchOutcome {
            selected: batch.len(),
            ..BatchOutcome::default()
        };
        if batch.is_empty() {
            return Ok(outcome);
        }

        let mut replacements = Vec::with_capacity(batch.len());
        for record in batch {
            match self.rotate(&record.value) {
                Ok(rotated) => replacements.push((record.uuid, record.value, rotated)),
                Err(e) => {
                    tracing::warn!(value = %record.uuid, error = %e, "could not rotate value");
                    skip.insert(record.uuid);
                    outcome.failed += 1;
                }
            }
        }

        let now = self.clock.now();
        let replaced = self.datastore.transaction(|state| {
            let mut replaced = 0u64;
            for (uuid, expected, rotated) in replacements {
                if state.replace_value_if_unchanged(&uuid, &expected, rotated, now) {
                    replaced += 1;
                }
            }
            Ok(replaced)
        })?;
        outcome.rotated = replaced;
        Ok(outcome)
    }

    /// Drain retired keys batch by batch until nothing is left, every
    /// remaining value has failed, or `cancel` is set. Cancellation is only
    /// observed between batches.
    pub fn rotate_all(&self, cancel: &AtomicBool) -> Result<RotationReport> {
        let mut report = RotationReport {
            remaining_before: self.remaining()?,
            ..RotationReport::default()
        };
        tracing::info!(
            remaining = report.remaining_before,
            batch_size = self.batch_size,
            "starting key rotation"
        );

        let mut skip = BTreeSet::new();
        loop {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }
            let outcome = self.rotate_batch(&mut skip)?;
            if outcome.selected == 0 {
                break;
            }
            report.rotated += outcome.rotated;
            report.failed += outcome.failed;
            tracing::debug!(rotated = outcome.rotated, failed = outcome.failed, "rotated batch");
        }

        report.remaining_after = self.remaining()?;
        tracing::info!(
            rotated = report.rotated,
            failed = report.failed,
            remaining = report.remaining_after,
            cancelled = report.cancelled,
            "key rotation finished"
        );
        Ok(report)
    }
}
