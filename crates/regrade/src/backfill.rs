//! Set-based data backfill with explicit unmatched/ambiguous accounting.
//!
//! A backfill populates newly added columns from prior-generation data. Each
//! pass is described by a [`MatchRule`]: one bulk `UPDATE ... FROM` statement
//! plus count queries for the rows it could not settle. The update predicate
//! must exclude rows that already carry real data (guarded by a sentinel
//! placeholder or a NULL check), so repeated runs never clobber manual
//! corrections.
//!
//! Rows with no candidate are left in their prior state and reported as
//! `unmatched`; rows with more than one candidate are reported as
//! `ambiguous` and never assigned arbitrarily. Both counts are for operator
//! triage, and both block finalization.

use crate::Result;
use tokio_postgres::GenericClient;
use tracing::{info, warn};

/// A pluggable matching rule for one backfill pass.
///
/// `update_sql` must be a single set-based statement so readers never
/// observe a half-backfilled row within its scope.
pub trait MatchRule {
    /// Short operator-facing description, e.g. "order-item re-key".
    fn description(&self) -> &str;

    /// The bulk `UPDATE ... FROM` statement. Its predicate must restrict to
    /// rows not yet enriched and, where ambiguity is possible, to rows with
    /// exactly one candidate.
    fn update_sql(&self) -> String;

    /// Count query for rows still unenriched with no candidate at all.
    fn unmatched_sql(&self) -> String;

    /// Count query for rows with more than one candidate, if the rule's
    /// match predicate is heuristic rather than an exact key join.
    fn ambiguous_sql(&self) -> Option<String> {
        None
    }
}

/// Result of one backfill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackfillOutcome {
    /// Rows enriched by this pass.
    pub updated: u64,
    /// Rows left untouched because no source candidate matched.
    pub unmatched: u64,
    /// Rows left untouched because several source candidates matched.
    pub ambiguous: u64,
}

impl BackfillOutcome {
    /// Rows an operator still has to reconcile by hand.
    pub fn pending(&self) -> u64 {
        self.unmatched + self.ambiguous
    }
}

/// Run one backfill pass and report the outcome.
///
/// Safe to re-run: an already-completed pass updates zero rows and reports
/// the same unmatched/ambiguous counts.
pub async fn run_backfill<C, R>(client: &C, rule: &R) -> Result<BackfillOutcome>
where
    C: GenericClient,
    R: MatchRule + ?Sized,
{
    let updated = client.execute(&rule.update_sql(), &[]).await?;

    let unmatched = count(client, &rule.unmatched_sql()).await?;
    let ambiguous = match rule.ambiguous_sql() {
        Some(sql) => count(client, &sql).await?,
        None => 0,
    };

    let outcome = BackfillOutcome {
        updated,
        unmatched,
        ambiguous,
    };
    if outcome.pending() > 0 {
        warn!(
            rule = rule.description(),
            updated = outcome.updated,
            unmatched = outcome.unmatched,
            ambiguous = outcome.ambiguous,
            "backfill left rows for manual reconciliation"
        );
    } else {
        info!(
            rule = rule.description(),
            updated = outcome.updated,
            "backfill complete"
        );
    }
    Ok(outcome)
}

async fn count<C: GenericClient>(client: &C, sql: &str) -> Result<u64> {
    let row = client.query_one(sql, &[]).await?;
    let n: i64 = row.get(0);
    Ok(n.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_sums_unmatched_and_ambiguous() {
        let outcome = BackfillOutcome {
            updated: 10,
            unmatched: 2,
            ambiguous: 1,
        };
        assert_eq!(outcome.pending(), 3);
        assert_eq!(BackfillOutcome::default().pending(), 0);
    }
}
