//! Cooperative mutual-exclusion lease backed by the key-value store.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use stash_platform::KvHandle;
use std::time::Duration;
use time::UtcDateTime;

/// A time-bounded, single-holder token. Expiry lets any context take over
/// from a holder that crashed mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: String,
    /// Unix seconds after which the lease is free for takeover.
    pub expires_at: i64,
}

impl Lease {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// Advisory single-writer arbitration for background warm-up.
///
/// This is optimistic read-then-write-then-confirm, not a compare-and-swap:
/// two acquirers that both read "free" can both write, and the confirming
/// re-read only catches the one whose write lost. A residual window where
/// both believe they won remains and is accepted: a double warm-up wastes
/// bandwidth but corrupts nothing, since every cache write it gates is an
/// idempotent overwrite.
pub struct LeaseManager {
    kv: KvHandle,
    key: String,
}

impl LeaseManager {
    pub fn new(kv: KvHandle, key_prefix: &str) -> Self {
        Self { kv, key: format!("{key_prefix}:lease") }
    }

    /// Try to take the lease. `None` while another holder's lease is live;
    /// contention is an expected outcome, not an error.
    pub async fn try_acquire(&self, ttl: Duration) -> Result<Option<Lease>> {
        let now = unix_now();
        if let Some(current) = self.read().await?
            && current.is_live(now)
        {
            return Ok(None);
        }
        let lease = Lease {
            id: format!("{:032x}", rand::random::<u128>()),
            expires_at: now + ttl.as_secs() as i64,
        };
        self.write(&lease).await?;
        // Confirm our write survived: another acquirer may have run between
        // our read and our write. The loser yields.
        match self.read().await? {
            Some(stored) if stored.id == lease.id => Ok(Some(lease)),
            _ => Ok(None),
        }
    }

    /// Extend a held lease. `false` means the stored lease is no longer
    /// ours; ownership moved and the caller must abort its run.
    pub async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<bool> {
        match self.read().await? {
            Some(stored) if stored.id == lease.id => {
                let renewed = Lease { id: lease.id.clone(), expires_at: unix_now() + ttl.as_secs() as i64 };
                self.write(&renewed).await?;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    /// Clear the lease if it is still ours. Never clobbers a lease another
    /// context acquired after ours expired.
    pub async fn release(&self, lease: &Lease) -> Result<()> {
        match self.read().await? {
            Some(stored) if stored.id == lease.id => self.kv.remove(&self.key).await.or_raise(|| ErrorKind::Lease),
            _ => Ok(()),
        }
    }

    async fn read(&self) -> Result<Option<Lease>> {
        let Some(bytes) = self.kv.get(&self.key).await.or_raise(|| ErrorKind::Lease)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(lease) => Ok(Some(lease)),
            // A corrupt record is treated as a free lease.
            Err(_) => Ok(None),
        }
    }

    async fn write(&self, lease: &Lease) -> Result<()> {
        let bytes = serde_json::to_vec(lease).or_raise(|| ErrorKind::Lease)?;
        self.kv.set(&self.key, &bytes).await.or_raise(|| ErrorKind::Lease)
    }
}

fn unix_now() -> i64 {
    UtcDateTime::now().unix_timestamp()
}
