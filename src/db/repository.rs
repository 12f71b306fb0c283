//! Subscription store for per-tenant routing rows.
//!
//! Rows are updated with a version check; a lost race re-reads and retries.

use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    Category, CategoryConfig, CategoryUpdate, ChannelId, RoleId, TenantId, TenantSubscription,
};

/// Attempts at a read-modify-write before giving up with `StoreWriteConflict`.
const MAX_WRITE_ATTEMPTS: usize = 5;

/// Durable per-tenant subscription state.
#[derive(Clone)]
pub struct SubscriptionStore {
    pool: SqlitePool,
}

impl SubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a tenant's subscription.
    pub async fn get(&self, tenant_id: TenantId) -> Result<TenantSubscription, AppError> {
        self.get_versioned(tenant_id)
            .await?
            .map(|(sub, _)| sub)
            .ok_or(AppError::TenantNotFound(tenant_id))
    }

    /// Create the tenant's row unless one already exists.
    ///
    /// Returns `true` if a row was created.
    pub async fn upsert_on_join(
        &self,
        tenant_id: TenantId,
        default: &TenantSubscription,
    ) -> Result<bool, AppError> {
        let data = default.to_json()?;
        let result =
            sqlx::query("INSERT OR IGNORE INTO roles (guild, data, version) VALUES (?, ?, 1)")
                .bind(tenant_id as i64)
                .bind(&data)
                .execute(&self.pool)
                .await?;

        let created = result.rows_affected() > 0;
        if created {
            tracing::info!(tenant_id, "Created subscription row");
        } else {
            tracing::debug!(tenant_id, "Subscription row already exists, left untouched");
        }
        Ok(created)
    }

    /// Delete a tenant's row.
    pub async fn remove(&self, tenant_id: TenantId) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM roles WHERE guild = ?")
            .bind(tenant_id as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TenantNotFound(tenant_id));
        }

        tracing::info!(tenant_id, "Removed subscription row");
        Ok(())
    }

    /// List every tenant's subscription, ordered by tenant id.
    ///
    /// A malformed row fails the whole call.
    pub async fn list_all(&self) -> Result<Vec<(TenantId, TenantSubscription)>, AppError> {
        let rows = sqlx::query("SELECT guild, data FROM roles ORDER BY guild")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let tenant_id = row.get::<i64, _>("guild") as TenantId;
                let data: String = row.get("data");
                let sub = TenantSubscription::from_json(tenant_id, &data)?;
                Ok((tenant_id, sub))
            })
            .collect()
    }

    /// Replace the routing for one category.
    pub async fn set_category_config(
        &self,
        tenant_id: TenantId,
        category: Category,
        destination: Option<ChannelId>,
        enabled: bool,
        role: RoleId,
    ) -> Result<TenantSubscription, AppError> {
        let config = CategoryConfig {
            role,
            channel: destination,
            enabled,
        };
        self.update_with(tenant_id, |sub| {
            if sub.get(category) == &config {
                return false;
            }
            sub.set(category, config.clone());
            true
        })
        .await
    }

    /// Change only the fields set in `update`, against the freshest row.
    pub async fn update_category(
        &self,
        tenant_id: TenantId,
        category: Category,
        update: &CategoryUpdate,
    ) -> Result<TenantSubscription, AppError> {
        self.update_with(tenant_id, |sub| {
            let next = update.apply(sub.get(category));
            if sub.get(category) == &next {
                return false;
            }
            sub.set(category, next);
            true
        })
        .await
    }

    /// Clear a category's destination if it still points at `stale`.
    ///
    /// Returns `true` if the row changed.
    pub async fn clear_destination(
        &self,
        tenant_id: TenantId,
        category: Category,
        stale: ChannelId,
    ) -> Result<bool, AppError> {
        let mut changed = false;
        self.update_with(tenant_id, |sub| {
            let current = sub.get(category);
            if current.channel != Some(stale) {
                changed = false;
                return false;
            }
            let cleared = CategoryConfig {
                channel: None,
                ..current.clone()
            };
            sub.set(category, cleared);
            changed = true;
            true
        })
        .await?;
        Ok(changed)
    }

    /// Read-modify-write of a whole row guarded by its version.
    ///
    /// `apply` returns `false` when there is nothing to write.
    async fn update_with<F>(
        &self,
        tenant_id: TenantId,
        mut apply: F,
    ) -> Result<TenantSubscription, AppError>
    where
        F: FnMut(&mut TenantSubscription) -> bool,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut sub, version) = self
                .get_versioned(tenant_id)
                .await?
                .ok_or(AppError::TenantNotFound(tenant_id))?;

            if !apply(&mut sub) {
                return Ok(sub);
            }

            let result = sqlx::query(
                "UPDATE roles SET data = ?, version = ? WHERE guild = ? AND version = ?",
            )
            .bind(sub.to_json()?)
            .bind(version + 1)
            .bind(tenant_id as i64)
            .bind(version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(sub);
            }

            tracing::debug!(
                tenant_id,
                attempt,
                "Concurrent modification detected, retrying with fresh read"
            );
        }

        tracing::warn!(tenant_id, "Giving up on contended subscription update");
        Err(AppError::StoreWriteConflict(tenant_id))
    }

    async fn get_versioned(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<(TenantSubscription, i64)>, AppError> {
        let row = sqlx::query("SELECT data, version FROM roles WHERE guild = ?")
            .bind(tenant_id as i64)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                let version: i64 = row.get("version");
                let sub = TenantSubscription::from_json(tenant_id, &data)?;
                Ok(Some((sub, version)))
            }
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub(crate) async fn write_raw(&self, tenant_id: TenantId, data: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR REPLACE INTO roles (guild, data, version) VALUES (?, ?, 1)")
            .bind(tenant_id as i64)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
