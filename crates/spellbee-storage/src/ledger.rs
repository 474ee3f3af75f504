//! Practice ledger: counts completed sessions per child per week.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use spellbee_core::clock::Clock;
use spellbee_core::error::{Result, SpellbeeError};
use spellbee_core::types::PracticeRecord;
use spellbee_core::week::WeekId;

use crate::repository::SpellingRepository;

/// Records one practice event per call as a read-modify-write of the
/// `(week_id, group)` record.
///
/// Calls on one ledger are serialised, so concurrent sessions in the same
/// process never lose an increment. Writers in other processes sharing the
/// store are not coordinated: the last write wins.
pub struct PracticeLedger {
    repo: SpellingRepository,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl PracticeLedger {
    pub fn new(repo: SpellingRepository, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Count one attempt for `child`. Returns the child's new attempt total.
    pub async fn record(
        &self,
        group: &str,
        week_id: WeekId,
        child: &str,
        score: u32,
        total: u32,
    ) -> Result<u32> {
        let child = child.trim();
        if child.is_empty() {
            return Err(SpellbeeError::InvalidInput(
                "Child name must not be empty".to_string(),
            ));
        }

        let _guard = self.lock.lock().await;
        let mut record = self
            .repo
            .practice_record(group, week_id)
            .await?
            .unwrap_or_else(|| PracticeRecord::new(group, week_id));

        let attempts = record.record_attempt(child, self.clock.now());
        self.repo.save_practice_record(&record).await?;

        info!(
            group,
            week_id = %week_id,
            child,
            score,
            total,
            attempts,
            "Practice recorded"
        );
        Ok(attempts)
    }

    /// The week's record, or an empty one. Children iterate in name order.
    pub async fn summary(&self, group: &str, week_id: WeekId) -> Result<PracticeRecord> {
        Ok(self
            .repo
            .practice_record(group, week_id)
            .await?
            .unwrap_or_else(|| PracticeRecord::new(group, week_id)))
    }
}
