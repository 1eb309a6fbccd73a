use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::store::InviteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Nothing was stale.
    Idle,
    /// Number of invites moved from pending to expired.
    Expired(u64),
    /// Query or commit failed; the next run picks the same invites up again.
    Failed,
}

/// Expires every pending invite whose window closed before now.
///
/// All matched invites are committed as one batch. Failures are logged and
/// swallowed; this never returns an error to whatever triggered it.
pub async fn sweep_expired(store: &InviteStore, clock: &Clock) -> SweepOutcome {
    let now = clock.now();

    let stale = match store.find_stale_pending(now).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("Error auto-expiring invites: {e}");
            return SweepOutcome::Failed;
        }
    };

    if stale.is_empty() {
        tracing::info!("No invites to expire.");
        return SweepOutcome::Idle;
    }

    match store.expire_batch(&stale).await {
        Ok(count) => {
            tracing::info!(matched = stale.len(), "Successfully auto-expired {count} invites.");
            SweepOutcome::Expired(count)
        }
        Err(e) => {
            tracing::error!(matched = stale.len(), "Error auto-expiring invites: {e}");
            SweepOutcome::Failed
        }
    }
}

/// Spawn the periodic sweep. The first sweep runs immediately. Ticks that
/// fall behind are skipped, so runs never overlap within this process.
pub fn spawn_sweeper(store: InviteStore, clock: Clock, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            sweep_expired(&store, &clock).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::models::invite::InviteRow;
    use crate::store::MemoryInviteStore;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn mixed_store() -> MemoryInviteStore {
        let past = t() - chrono::Duration::hours(1);
        let future = t() + chrono::Duration::hours(1);
        let mem = MemoryInviteStore::default();
        mem.insert(InviteRow::sample("A", "pending", past, past));
        mem.insert(InviteRow::sample("B", "pending", past, future));
        mem.insert(InviteRow::sample("C", "approved", past, past));
        mem
    }

    #[tokio::test]
    async fn only_stale_pending_invites_are_expired() {
        let mem = mixed_store();
        let store = InviteStore::Memory(mem.clone());

        let outcome = sweep_expired(&store, &Clock::fixed(t())).await;

        assert_eq!(outcome, SweepOutcome::Expired(1));
        assert_eq!(mem.status_of("A").as_deref(), Some("expired"));
        assert_eq!(mem.status_of("B").as_deref(), Some("pending"));
        assert_eq!(mem.status_of("C").as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let mem = mixed_store();
        let store = InviteStore::Memory(mem.clone());
        let clock = Clock::fixed(t());

        assert_eq!(sweep_expired(&store, &clock).await, SweepOutcome::Expired(1));
        assert_eq!(sweep_expired(&store, &clock).await, SweepOutcome::Idle);
        assert_eq!(mem.status_of("A").as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn invite_expiring_exactly_now_is_kept() {
        let mem = MemoryInviteStore::default();
        mem.insert(InviteRow::sample("edge", "pending", t() - chrono::Duration::hours(1), t()));
        let store = InviteStore::Memory(mem.clone());

        assert_eq!(sweep_expired(&store, &Clock::fixed(t())).await, SweepOutcome::Idle);
        assert_eq!(mem.status_of("edge").as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn failed_commit_leaves_every_invite_pending() {
        let mem = mixed_store();
        let past = t() - chrono::Duration::hours(1);
        mem.insert(InviteRow::sample("D", "pending", past, past));
        mem.fail_commits(true);
        let store = InviteStore::Memory(mem.clone());
        let clock = Clock::fixed(t());

        assert_eq!(sweep_expired(&store, &clock).await, SweepOutcome::Failed);
        assert_eq!(mem.status_of("A").as_deref(), Some("pending"));
        assert_eq!(mem.status_of("D").as_deref(), Some("pending"));

        // retried on the next run
        mem.fail_commits(false);
        assert_eq!(sweep_expired(&store, &clock).await, SweepOutcome::Expired(2));
    }

    #[tokio::test]
    async fn failed_query_is_absorbed() {
        let mem = mixed_store();
        mem.fail_reads(true);
        let store = InviteStore::Memory(mem.clone());

        assert_eq!(sweep_expired(&store, &Clock::fixed(t())).await, SweepOutcome::Failed);
        assert_eq!(mem.status_of("A").as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn invites_go_stale_as_the_clock_moves() {
        let mem = mixed_store();
        let store = InviteStore::Memory(mem.clone());
        let clock = Clock::fixed(t());

        sweep_expired(&store, &clock).await;
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(sweep_expired(&store, &clock).await, SweepOutcome::Expired(1));
        assert_eq!(mem.status_of("B").as_deref(), Some("expired"));
        assert_eq!(mem.status_of("C").as_deref(), Some("approved"));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_runs_on_each_tick() {
        let mem = mixed_store();
        let clock = Clock::fixed(t());
        let handle = spawn_sweeper(
            InviteStore::Memory(mem.clone()),
            clock.clone(),
            Duration::from_secs(3600),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mem.status_of("A").as_deref(), Some("expired"));
        assert_eq!(mem.status_of("B").as_deref(), Some("pending"));

        clock.advance(chrono::Duration::hours(2));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(mem.status_of("B").as_deref(), Some("expired"));

        handle.abort();
    }
}
