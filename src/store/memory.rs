use crate::clock::{Clock, SystemClock};
use crate::error::LeaseError;
use crate::shard::{Checkpoint, ShardLease};
use crate::store::LeaseStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

#[derive(Debug, Clone, Default)]
struct LeaseRecord {
    owner: Option<String>,
    lease_timeout: Option<DateTime<Utc>>,
    checkpoint: Option<Checkpoint>,
}

/// In-memory implementation of lease and checkpoint storage
///
/// Suitable for a single process and for tests. Ownership is enforced the
/// same way a shared store would: a lease can only be renewed by its owner
/// or taken over once it has expired.
#[derive(Clone)]
pub struct InMemoryLeaseStore {
    leases: Arc<RwLock<HashMap<String, LeaseRecord>>>,
    clock: Arc<dyn Clock>,
    lease_duration: Duration,
    parent_poll_interval: Duration,
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        debug!("Initializing in-memory lease store");
        Self {
            leases: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(SystemClock),
            lease_duration: Duration::from_secs(10),
            parent_poll_interval: Duration::from_secs(10),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_parent_poll_interval(mut self, interval: Duration) -> Self {
        self.parent_poll_interval = interval;
        self
    }

    fn lease_expiry(&self) -> DateTime<Utc> {
        let duration = chrono::Duration::from_std(self.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        self.clock.utc_now() + duration
    }

    /// Take the lease on a shard for `owner`, loading its checkpoint
    pub async fn acquire_lease(
        &self,
        shard_id: &str,
        owner: &str,
    ) -> Result<ShardLease, LeaseError> {
        let lease_timeout = self.renew_lease(shard_id, owner).await?;
        let mut shard = ShardLease::new(shard_id, lease_timeout);
        if let Some(checkpoint) = self.get_checkpoint(shard_id).await? {
            shard = shard.with_checkpoint(checkpoint);
        }
        Ok(shard)
    }

    /// Current owner of a shard's lease, if any
    pub async fn lease_owner(&self, shard_id: &str) -> Option<String> {
        self.leases
            .read()
            .await
            .get(shard_id)
            .and_then(|record| record.owner.clone())
    }

    /// Clear all leases and checkpoints
    pub async fn clear(&self) {
        self.leases.write().await.clear();
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    #[instrument(skip(self))]
    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<Checkpoint>, LeaseError> {
        let leases = self.leases.read().await;
        let checkpoint = leases.get(shard_id).and_then(|r| r.checkpoint.clone());

        trace!(
            shard_id = %shard_id,
            checkpoint = ?checkpoint,
            "Retrieved checkpoint from memory"
        );

        Ok(checkpoint)
    }

    #[instrument(skip(self))]
    async fn renew_lease(
        &self,
        shard_id: &str,
        owner: &str,
    ) -> Result<DateTime<Utc>, LeaseError> {
        let now = self.clock.utc_now();
        let mut leases = self.leases.write().await;
        let record = leases.entry(shard_id.to_string()).or_default();

        let held_by_other = match (&record.owner, record.lease_timeout) {
            (Some(current), Some(timeout)) => current != owner && timeout > now,
            _ => false,
        };
        if held_by_other {
            warn!(
                shard_id = %shard_id,
                owner = %owner,
                current_owner = ?record.owner,
                "Lease held by another worker"
            );
            return Err(LeaseError::NotAcquired {
                shard_id: shard_id.to_string(),
                owner: owner.to_string(),
            });
        }

        let lease_timeout = self.lease_expiry();
        record.owner = Some(owner.to_string());
        record.lease_timeout = Some(lease_timeout);

        debug!(
            shard_id = %shard_id,
            owner = %owner,
            lease_timeout = %lease_timeout,
            "Lease renewed in memory"
        );

        Ok(lease_timeout)
    }

    #[instrument(skip(self))]
    async fn wait_for_parent(&self, parent_shard_id: &str) -> Result<(), LeaseError> {
        loop {
            let checkpoint = {
                let leases = self.leases.read().await;
                match leases.get(parent_shard_id) {
                    Some(record) => record.checkpoint.clone(),
                    None => {
                        return Err(LeaseError::SequenceIdNotFound(
                            parent_shard_id.to_string(),
                        ))
                    }
                }
            };

            if checkpoint == Some(Checkpoint::ShardEnd) {
                debug!(parent_shard_id = %parent_shard_id, "Parent shard finished");
                return Ok(());
            }

            trace!(
                parent_shard_id = %parent_shard_id,
                checkpoint = ?checkpoint,
                "Parent shard still in progress"
            );
            self.clock.sleep(self.parent_poll_interval).await;
        }
    }

    #[instrument(skip(self))]
    async fn save_checkpoint(
        &self,
        shard_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), LeaseError> {
        self.leases
            .write()
            .await
            .entry(shard_id.to_string())
            .or_default()
            .checkpoint = Some(checkpoint.clone());

        debug!(
            shard_id = %shard_id,
            checkpoint = %checkpoint,
            "Checkpoint saved to memory"
        );

        Ok(())
    }

    #[instrument(skip(self))]
    async fn release_lease(&self, shard_id: &str, owner: &str) -> Result<(), LeaseError> {
        let mut leases = self.leases.write().await;
        let Some(record) = leases.get_mut(shard_id) else {
            return Ok(());
        };

        match record.owner.as_deref() {
            Some(current) if current == owner => {
                record.owner = None;
                record.lease_timeout = None;
                debug!(shard_id = %shard_id, owner = %owner, "Lease released");
                Ok(())
            }
            Some(_) => Err(LeaseError::NotAcquired {
                shard_id: shard_id.to_string(),
                owner: owner.to_string(),
            }),
            None => Ok(()),
        }
    }
}
