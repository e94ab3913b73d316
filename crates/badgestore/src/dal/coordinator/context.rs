/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Bookkeeping for one coordinator transaction.

use std::time::Instant;

use tracing::{error, info};

use crate::database::universal_types::UniversalUuid;
use crate::error::DatabaseError;
use crate::models::EntityType;

/// One completed step inside a coordinator transaction.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation_name: &'static str,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub started: Instant,
}

/// Steps performed so far by one coordinator transaction.
///
/// The context travels into the blocking connection closure and comes back
/// out with the result, so its summary reflects exactly the steps that ran
/// before a commit or an abort.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub id: String,
    pub name: &'static str,
    pub started: Instant,
    pub operations: Vec<OperationContext>,
    pub rollback_on_error: bool,
}

impl TransactionContext {
    pub fn new(name: &'static str) -> Self {
        Self {
            id: UniversalUuid::new_v4().to_string(),
            name,
            started: Instant::now(),
            operations: Vec::new(),
            rollback_on_error: true,
        }
    }

    pub fn record(
        &mut self,
        operation_name: &'static str,
        entity_type: EntityType,
        entity_id: Option<&str>,
        started: Instant,
    ) {
        self.operations.push(OperationContext {
            operation_name,
            entity_type,
            entity_id: entity_id.map(str::to_string),
            started,
        });
    }

    pub fn steps_completed(&self) -> usize {
        self.operations.len()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn step_names(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| match &op.entity_id {
                Some(id) => format!("{}:{}({})", op.entity_type, op.operation_name, id),
                None => format!("{}:{}", op.entity_type, op.operation_name),
            })
            .collect()
    }

    pub(crate) fn log_commit(&self) {
        info!(
            transaction_id = %self.id,
            transaction = self.name,
            steps = self.steps_completed(),
            elapsed_ms = self.elapsed_ms() as u64,
            operations = ?self.step_names(),
            "Coordinator transaction committed"
        );
        metrics::counter!("badgestore_coordinator_transactions_total", "outcome" => "committed")
            .increment(1);
        metrics::histogram!("badgestore_coordinator_transaction_duration_seconds")
            .record(self.started.elapsed().as_secs_f64());
    }

    /// Logs the abort and wraps `source` with this transaction's context.
    pub(crate) fn abort(&self, source: DatabaseError) -> DatabaseError {
        error!(
            transaction_id = %self.id,
            transaction = self.name,
            steps = self.steps_completed(),
            elapsed_ms = self.elapsed_ms() as u64,
            operations = ?self.step_names(),
            rolled_back = self.rollback_on_error,
            error = %source,
            "Coordinator transaction aborted"
        );
        metrics::counter!("badgestore_coordinator_transactions_total", "outcome" => "aborted")
            .increment(1);
        DatabaseError::TransactionAborted {
            transaction_id: self.id.clone(),
            steps_completed: self.steps_completed(),
            elapsed_ms: self.elapsed_ms(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_carries_transaction_context() {
        let mut ctx = TransactionContext::new("create_ecosystem");
        ctx.record("create", EntityType::Issuer, Some("urn:uuid:x"), Instant::now());
        let err = ctx.abort(DatabaseError::UniqueViolation {
            message: "UNIQUE constraint failed: assertions.id".to_string(),
        });
        match err {
            DatabaseError::TransactionAborted {
                transaction_id,
                steps_completed,
                source,
                ..
            } => {
                assert_eq!(transaction_id, ctx.id);
                assert_eq!(steps_completed, 1);
                assert!(matches!(*source, DatabaseError::UniqueViolation { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
