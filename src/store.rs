use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::invite::{Invite, InviteRow, InviteStatus};

const SELECT_INVITE: &str = r#"SELECT id, status, valid_from, valid_until, guest_name, guest_phone, "type" AS kind, resident_uid
     FROM invites WHERE id = $1"#;

#[derive(Clone)]
pub struct PgInviteStore {
    pool: PgPool,
}

impl PgInviteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Invite>, AppError> {
        let row = sqlx::query_as::<_, InviteRow>(SELECT_INVITE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Invite::try_from).transpose()
    }

    pub async fn find_stale_pending(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM invites WHERE status = $1 AND valid_until < $2",
        )
        .bind(InviteStatus::Pending.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Marks the given invites expired in one transaction. Rows that left
    /// `pending` since they were queried are left alone.
    pub async fn expire_batch(&self, ids: &[String]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE invites SET status = $1 WHERE id = ANY($2) AND status = $3")
            .bind(InviteStatus::Expired.as_str())
            .bind(ids)
            .bind(InviteStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        if one == 1 {
            Ok(())
        } else {
            Err(AppError::Internal("unexpected ping result".into()))
        }
    }
}

#[derive(Default)]
struct MemoryState {
    rows: HashMap<String, InviteRow>,
    fail_reads: bool,
    fail_commits: bool,
}

/// In-process store used by tests. Holds raw rows so malformed records can be
/// seeded, and can be told to fail reads or commits.
#[derive(Clone, Default)]
#[cfg_attr(not(test), allow(dead_code))]
pub struct MemoryInviteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryInviteStore {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Invite>, AppError> {
        let state = self.state();
        if state.fail_reads {
            return Err(AppError::Internal("memory store: forced read failure".into()));
        }
        state.rows.get(id).cloned().map(Invite::try_from).transpose()
    }

    pub async fn find_stale_pending(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let state = self.state();
        if state.fail_reads {
            return Err(AppError::Internal("memory store: forced read failure".into()));
        }
        let mut ids: Vec<String> = state
            .rows
            .values()
            .filter(|row| row.is_stale_pending(now))
            .map(|row| row.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn expire_batch(&self, ids: &[String]) -> Result<u64, AppError> {
        let mut state = self.state();
        if state.fail_commits {
            return Err(AppError::Internal("memory store: forced commit failure".into()));
        }

        let mut expired = 0;
        for id in ids {
            if let Some(row) = state.rows.get_mut(id) {
                if row.status.as_deref() == Some(InviteStatus::Pending.as_str()) {
                    row.status = Some(InviteStatus::Expired.to_string());
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        if self.state().fail_reads {
            return Err(AppError::Internal("memory store: forced read failure".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl MemoryInviteStore {
    pub fn insert(&self, row: InviteRow) {
        self.state().rows.insert(row.id.clone(), row);
    }

    pub fn status_of(&self, id: &str) -> Option<String> {
        self.state().rows.get(id).and_then(|row| row.status.clone())
    }

    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(row) = self.state().rows.get_mut(id) {
            row.status = Some(status.to_string());
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn fail_commits(&self, fail: bool) {
        self.state().fail_commits = fail;
    }
}

#[derive(Clone)]
#[cfg_attr(not(test), allow(dead_code))]
pub enum InviteStore {
    Postgres(PgInviteStore),
    Memory(MemoryInviteStore),
}

impl InviteStore {
    pub async fn get(&self, id: &str) -> Result<Option<Invite>, AppError> {
        match self {
            Self::Postgres(s) => s.get(id).await,
            Self::Memory(s) => s.get(id).await,
        }
    }

    pub async fn find_stale_pending(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        match self {
            Self::Postgres(s) => s.find_stale_pending(now).await,
            Self::Memory(s) => s.find_stale_pending(now).await,
        }
    }

    pub async fn expire_batch(&self, ids: &[String]) -> Result<u64, AppError> {
        match self {
            Self::Postgres(s) => s.expire_batch(ids).await,
            Self::Memory(s) => s.expire_batch(ids).await,
        }
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        match self {
            Self::Postgres(s) => s.ping().await,
            Self::Memory(s) => s.ping().await,
        }
    }
}
