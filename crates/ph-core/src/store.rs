// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Resource store
//!
//! Holds the committed bundle and manifest of every created package
//! revision. Writers first take a [`WriteLease`] on the revision key; only
//! one lease per key exists at a time, so concurrent writers to the same
//! revision are rejected instead of silently overwriting each other. Reads
//! never wait on a lease.

use chrono::{DateTime, Utc};
use ph_domain_types::{Kptfile, PackageRevision, PackageRevisionKey, Resources};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::pipeline::PackageSnapshot;

/// A committed package revision
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRevision {
    pub spec: PackageRevision,
    pub resources: Resources,
    pub kptfile: Kptfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    seq: u64,
}

impl StoredRevision {
    pub fn key(&self) -> PackageRevisionKey {
        self.spec.key()
    }
}

/// What a writer intends to do with a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteIntent {
    /// Key must not exist yet
    Create,
    /// Key must already exist
    Replace,
}

#[derive(Default)]
struct StoreInner {
    revisions: RwLock<HashMap<PackageRevisionKey, StoredRevision>>,
    in_flight: Mutex<HashSet<PackageRevisionKey>>,
    next_seq: AtomicU64,
}

impl StoreInner {
    fn in_flight(&self) -> MutexGuard<'_, HashSet<PackageRevisionKey>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive right to write one revision key, released on drop
pub struct WriteLease {
    inner: Arc<StoreInner>,
    key: PackageRevisionKey,
    intent: WriteIntent,
}

impl WriteLease {
    pub fn key(&self) -> &PackageRevisionKey {
        &self.key
    }

    /// Commit the pipeline result under the leased key
    pub async fn commit(
        self,
        spec: PackageRevision,
        snapshot: PackageSnapshot,
    ) -> Result<StoredRevision> {
        if spec.key() != self.key {
            return Err(Error::Validation(format!(
                "lease for {} cannot commit {}",
                self.key,
                spec.key()
            )));
        }

        let (resources, kptfile) = snapshot.into_parts();
        let now = Utc::now();
        let mut revisions = self.inner.revisions.write().await;

        let stored = match (self.intent, revisions.get(&self.key)) {
            (WriteIntent::Create, Some(_)) => {
                return Err(Error::already_exists("package revision", self.key.to_string()))
            }
            (WriteIntent::Replace, None) => {
                return Err(Error::not_found("package revision", self.key.to_string()))
            }
            (WriteIntent::Create, None) => StoredRevision {
                spec,
                resources,
                kptfile,
                created_at: now,
                updated_at: now,
                seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            },
            (WriteIntent::Replace, Some(previous)) => StoredRevision {
                spec,
                resources,
                kptfile,
                created_at: previous.created_at,
                updated_at: now,
                seq: previous.seq,
            },
        };

        revisions.insert(self.key.clone(), stored.clone());
        info!(revision = %self.key, intent = ?self.intent, "committed package revision");
        Ok(stored)
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.key);
        debug!(revision = %self.key, "released write lease");
    }
}

/// In-memory store of committed package revisions
#[derive(Clone, Default)]
pub struct InMemoryResourceStore {
    inner: Arc<StoreInner>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the write lease for `key`
    ///
    /// Fails with `Conflict` while another writer holds it, `AlreadyExists`
    /// for a create on a committed key and `NotFound` for a replace of a
    /// missing one.
    pub async fn reserve(
        &self,
        key: &PackageRevisionKey,
        intent: WriteIntent,
    ) -> Result<WriteLease> {
        if !self.inner.in_flight().insert(key.clone()) {
            return Err(Error::Conflict(key.to_string()));
        }
        // From here on the lease owns the in-flight entry, including on early return
        let lease = WriteLease {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            intent,
        };

        let exists = self.inner.revisions.read().await.contains_key(key);
        match (intent, exists) {
            (WriteIntent::Create, true) => {
                Err(Error::already_exists("package revision", key.to_string()))
            }
            (WriteIntent::Replace, false) => {
                Err(Error::not_found("package revision", key.to_string()))
            }
            _ => Ok(lease),
        }
    }

    /// Create-only write of a finished snapshot
    pub async fn put(
        &self,
        spec: PackageRevision,
        snapshot: PackageSnapshot,
    ) -> Result<StoredRevision> {
        let lease = self.reserve(&spec.key(), WriteIntent::Create).await?;
        lease.commit(spec, snapshot).await
    }

    pub async fn get(&self, key: &PackageRevisionKey) -> Result<StoredRevision> {
        self.inner
            .revisions
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found("package revision", key.to_string()))
    }

    /// Committed revisions in creation order, optionally for one repository
    pub async fn list(&self, repository: Option<&str>) -> Vec<StoredRevision> {
        let mut revisions: Vec<_> = self
            .inner
            .revisions
            .read()
            .await
            .values()
            .filter(|r| repository.map_or(true, |name| r.spec.repository_name == name))
            .cloned()
            .collect();
        revisions.sort_by_key(|r| r.seq);
        revisions
    }

    /// Delete a committed revision; `NotFound` if it was never created
    pub async fn delete(&self, key: &PackageRevisionKey) -> Result<()> {
        if self.delete_if_exists(key).await? {
            Ok(())
        } else {
            Err(Error::not_found("package revision", key.to_string()))
        }
    }

    /// Idempotent delete for cleanup paths; returns whether anything was removed
    pub async fn delete_if_exists(&self, key: &PackageRevisionKey) -> Result<bool> {
        let _lease = self.reserve_for_delete(key)?;
        let removed = self.inner.revisions.write().await.remove(key).is_some();
        if removed {
            info!(revision = %key, "deleted package revision");
        }
        Ok(removed)
    }

    /// Drop every committed revision of `repository`
    pub async fn purge_repository(&self, repository: &str) -> usize {
        let mut revisions = self.inner.revisions.write().await;
        let before = revisions.len();
        revisions.retain(|key, _| key.repository != repository);
        let purged = before - revisions.len();
        if purged > 0 {
            info!(repository = %repository, purged, "purged package revisions");
        }
        purged
    }

    fn reserve_for_delete(&self, key: &PackageRevisionKey) -> Result<WriteLease> {
        if !self.inner.in_flight().insert(key.clone()) {
            return Err(Error::Conflict(key.to_string()));
        }
        Ok(WriteLease {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            intent: WriteIntent::Replace,
        })
    }
}
