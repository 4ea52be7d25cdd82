//! # Identity State
//!
//! An identity's state is the root of its claims tree. The ID is fixed at
//! genesis; the state moves on every time the identity publishes new claims,
//! and relying parties look it up through an [`IdenStateReader`].
//!
//! Publishing states to a ledger is somebody else's job. The crate ships
//! [`InMemoryStateReader`], a history kept in a map, for tests and for
//! deployments that mirror states from elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::StateError;
use crate::crypto::hash::Hash256;
use crate::identity::Id;

/// One published state of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdenStateData {
    /// Block that recorded the state.
    pub block_n: u64,
    /// Unix seconds of that block.
    pub block_timestamp: i64,
    /// The claims-tree root.
    pub iden_state: Hash256,
}

/// Read access to published identity states.
pub trait IdenStateReader: Send + Sync {
    /// The latest state, or `None` if the identity never published one.
    fn get_state(&self, id: &Id) -> Result<Option<IdenStateData>, StateError>;

    /// The state in force at block `block_n`.
    fn get_state_by_block(&self, id: &Id, block_n: u64) -> Result<Option<Hash256>, StateError>;

    /// The state in force at unix time `timestamp`.
    fn get_state_by_time(&self, id: &Id, timestamp: i64) -> Result<Option<Hash256>, StateError>;
}

impl<R: IdenStateReader + ?Sized> IdenStateReader for Arc<R> {
    fn get_state(&self, id: &Id) -> Result<Option<IdenStateData>, StateError> {
        (**self).get_state(id)
    }

    fn get_state_by_block(&self, id: &Id, block_n: u64) -> Result<Option<Hash256>, StateError> {
        (**self).get_state_by_block(id, block_n)
    }

    fn get_state_by_time(&self, id: &Id, timestamp: i64) -> Result<Option<Hash256>, StateError> {
        (**self).get_state_by_time(id, timestamp)
    }
}

/// State history held in memory, ordered by block.
#[derive(Debug, Default)]
pub struct InMemoryStateReader {
    states: RwLock<HashMap<Id, Vec<IdenStateData>>>,
}

impl InMemoryStateReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a state transition. Blocks must not go backwards.
    pub fn set_state(
        &self,
        id: &Id,
        iden_state: Hash256,
        block_n: u64,
        block_timestamp: i64,
    ) -> Result<(), StateError> {
        let mut states = self.states.write();
        let history = states.entry(*id).or_default();
        if let Some(latest) = history.last() {
            if block_n < latest.block_n || block_timestamp < latest.block_timestamp {
                return Err(StateError::OutOfOrder {
                    latest: latest.block_n,
                    block: block_n,
                });
            }
        }
        history.push(IdenStateData {
            block_n,
            block_timestamp,
            iden_state,
        });
        debug!(id = %id, block_n, state = %iden_state, "identity state recorded");
        Ok(())
    }

    fn find_last<F>(&self, id: &Id, in_force: F) -> Option<IdenStateData>
    where
        F: Fn(&IdenStateData) -> bool,
    {
        self.states
            .read()
            .get(id)
            .and_then(|history| history.iter().rev().find(|s| in_force(s)).copied())
    }
}

impl IdenStateReader for InMemoryStateReader {
    fn get_state(&self, id: &Id) -> Result<Option<IdenStateData>, StateError> {
        Ok(self.find_last(id, |_| true))
    }

    fn get_state_by_block(&self, id: &Id, block_n: u64) -> Result<Option<Hash256>, StateError> {
        Ok(self
            .find_last(id, |s| s.block_n <= block_n)
            .map(|s| s.iden_state))
    }

    fn get_state_by_time(&self, id: &Id, timestamp: i64) -> Result<Option<Hash256>, StateError> {
        Ok(self
            .find_last(id, |s| s.block_timestamp <= timestamp)
            .map(|s| s.iden_state))
    }
}
