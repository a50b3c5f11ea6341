//! Unit of work: deferred inserts, updates and deletes replayed on commit.
//!
//! Registrations are kept in order and replayed strictly first-in,
//! first-out. Registering the same entity twice produces two independent
//! replays; nothing is merged. The whole replay runs inside one
//! transaction (or one savepoint of the caller's transaction), so a failing
//! entity leaves the store as it was before the commit.

use tracing::{debug, info, warn};

use crate::entity::{Entity, EntityState, TrackedEntity};
use crate::error::{MapperError, Result};
use crate::executor::Executor;
use crate::mapper::operation;
use crate::sqlite::Connection;

/// Savepoint taken when a commit joins the caller's transaction.
const COMMIT_SAVEPOINT: &str = "unit_of_work_commit";

/// What a successful commit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Rows changed across all replayed statements.
    pub rows_affected: usize,
    /// Row ids assigned to inserted entities, in registration order.
    pub inserted_ids: Vec<i64>,
}

impl CommitSummary {
    pub fn replayed(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Tracks pending changes against a borrowed executor.
pub struct UnitOfWork<'c, E: Executor + ?Sized = Connection> {
    executor: &'c mut E,
    tracked: Vec<TrackedEntity<'c>>,
}

impl<'c, E: Executor + ?Sized> UnitOfWork<'c, E> {
    pub fn new(executor: &'c mut E) -> Self {
        Self {
            executor,
            tracked: Vec::new(),
        }
    }

    /// Schedule an insert.
    pub fn add(&mut self, entity: impl Entity + 'c) {
        self.track(entity, EntityState::Created);
    }

    /// Schedule a partial update of the entity's non-null fields.
    pub fn update(&mut self, entity: impl Entity + 'c) {
        self.track(entity, EntityState::Modified);
    }

    /// Schedule a delete by primary key.
    pub fn remove(&mut self, entity: impl Entity + 'c) {
        self.track(entity, EntityState::Deleted);
    }

    fn track(&mut self, entity: impl Entity + 'c, state: EntityState) {
        debug!(table = entity.table_name(), %state, position = self.tracked.len(), "tracking entity");
        self.tracked.push(TrackedEntity::new(entity, state));
    }

    pub fn tracked(&self) -> &[TrackedEntity<'c>] {
        &self.tracked
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Drop every pending change without touching the store.
    pub fn clear(&mut self) {
        self.tracked.clear();
    }

    /// The executor, for reads issued during the session.
    pub fn executor(&mut self) -> &mut E {
        &mut *self.executor
    }

    /// Replay every tracked entity in registration order.
    ///
    /// Runs in a transaction opened here, or under a savepoint of the
    /// caller's transaction when one is already active. Either way a
    /// failure undoes every statement of this commit, the pending changes
    /// stay tracked and the error names the index of the failing entity.
    /// The caller still owns its transaction.
    pub fn commit(&mut self) -> Result<CommitSummary> {
        if self.tracked.is_empty() {
            debug!("nothing to commit");
            return Ok(CommitSummary::default());
        }

        let owns_transaction = !self.executor.in_transaction();
        if owns_transaction {
            self.executor.begin_transaction()?;
        } else {
            self.executor.savepoint(COMMIT_SAVEPOINT)?;
        }

        let mut summary = CommitSummary::default();
        for (index, tracked) in self.tracked.iter().enumerate() {
            if let Err(source) = replay(&mut *self.executor, tracked, &mut summary) {
                let table = tracked.entity().table_name().to_string();
                let state = tracked.state();
                warn!(index, %table, %state, error = %source, "commit failed");
                let undone = if owns_transaction {
                    self.executor.rollback_transaction()
                } else {
                    self.executor.rollback_to_savepoint(COMMIT_SAVEPOINT)
                };
                if let Err(err) = undone {
                    warn!(error = %err, "rollback after failed commit also failed");
                }
                return Err(MapperError::Commit {
                    index,
                    table,
                    state,
                    source: Box::new(source),
                });
            }
        }

        if owns_transaction {
            if let Err(err) = self.executor.commit_transaction() {
                warn!(error = %err, "transaction commit failed");
                if self.executor.in_transaction() {
                    if let Err(rollback) = self.executor.rollback_transaction() {
                        warn!(error = %rollback, "rollback after failed commit also failed");
                    }
                }
                return Err(err);
            }
        } else {
            self.executor.release_savepoint(COMMIT_SAVEPOINT)?;
        }

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            rows_affected = summary.rows_affected,
            "committed unit of work"
        );
        self.tracked.clear();
        Ok(summary)
    }
}

fn replay<E: Executor + ?Sized>(
    executor: &mut E,
    tracked: &TrackedEntity<'_>,
    summary: &mut CommitSummary,
) -> Result<()> {
    let query = operation(tracked.entity(), tracked.state())?.to_sql()?;
    let outcome = executor.run(&query)?;
    match tracked.state() {
        EntityState::Created => {
            summary.inserted += 1;
            summary.inserted_ids.push(outcome.last_insert_id);
        }
        EntityState::Modified => summary.updated += 1,
        EntityState::Deleted => summary.deleted += 1,
    }
    summary.rows_affected += outcome.rows_affected;
    Ok(())
}

impl<E: Executor + ?Sized> Drop for UnitOfWork<'_, E> {
    fn drop(&mut self) {
        if !self.tracked.is_empty() {
            warn!(pending = self.tracked.len(), "unit of work dropped with uncommitted changes");
        }
    }
}
