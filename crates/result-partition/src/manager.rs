// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Registry of the result partitions produced in this process.
//!
//! Local input channels find their upstream partition through the
//! [`ResultPartitionManager`] rather than holding it directly, so a consumer
//! that asks for a partition after it has been released gets a typed error
//! instead of a dangling handle.

use crate::{PartitionError, ResultPartition, ResultPartitionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Maps partition ids to live partitions.
#[derive(Default)]
pub struct ResultPartitionManager {
    partitions: Mutex<HashMap<ResultPartitionId, Arc<ResultPartition>>>,
}

impl ResultPartitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResultPartitionId, Arc<ResultPartition>>> {
        self.partitions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a partition so consumers can look it up.
    pub fn register(&self, partition: Arc<ResultPartition>) -> Result<(), PartitionError> {
        let mut partitions = self.lock();
        let id = partition.id().clone();
        if partitions.contains_key(&id) {
            return Err(PartitionError::DuplicatePartition(id));
        }
        tracing::debug!("registered partition {id}");
        partitions.insert(id, partition);
        Ok(())
    }

    /// Looks up a registered partition.
    pub fn get(&self, id: &ResultPartitionId) -> Result<Arc<ResultPartition>, PartitionError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| PartitionError::PartitionNotFound(id.clone()))
    }

    /// Unregisters and releases a partition.
    pub fn release_partition(&self, id: &ResultPartitionId) -> Result<(), PartitionError> {
        let partition = self
            .lock()
            .remove(id)
            .ok_or_else(|| PartitionError::PartitionNotFound(id.clone()))?;
        partition.release()
    }

    /// Unregisters and releases a partition after a producer failure.
    pub fn fail_partition(&self, id: &ResultPartitionId, cause: &str) -> Result<(), PartitionError> {
        let partition = self
            .lock()
            .remove(id)
            .ok_or_else(|| PartitionError::PartitionNotFound(id.clone()))?;
        partition.fail(cause)
    }

    /// Releases every registered partition (e.g. on shutdown).
    pub fn shutdown(&self) -> Result<(), PartitionError> {
        let partitions: Vec<_> = self.lock().drain().map(|(_, p)| p).collect();
        if !partitions.is_empty() {
            tracing::info!("releasing {} partitions on shutdown", partitions.len());
        }
        partitions.iter().try_for_each(|p| p.release())
    }

    pub fn num_partitions(&self) -> usize {
        self.lock().len()
    }
}

impl std::fmt::Debug for ResultPartitionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultPartitionManager")
            .field("partitions", &self.num_partitions())
            .finish()
    }
}
