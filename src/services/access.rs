//! Access verification — who may see or edit a workspace's boards.
//!
//! Boards do not carry an owner directly; access follows the owning chain
//! board -> workspace -> owner. The check is deliberately a single yes/no:
//! callers that fail it are told nothing about whether the resource exists.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Verdict on whether a caller may edit/view boards under a workspace.
#[async_trait]
pub trait AccessVerifier: Send + Sync {
    async fn can_access(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, AccessError>;
}

pub struct PgAccessVerifier {
    pool: PgPool,
}

impl PgAccessVerifier {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessVerifier for PgAccessVerifier {
    async fn can_access(&self, workspace_id: Uuid, user_id: Uuid) -> Result<bool, AccessError> {
        let allowed: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workspaces WHERE id = $1 AND owner_id = $2)")
                .bind(workspace_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(allowed)
    }
}
