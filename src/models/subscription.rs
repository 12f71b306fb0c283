//! Per-tenant subscription model matching the persisted `data` JSON column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Category;
use crate::errors::AppError;

pub type TenantId = u64;
pub type ChannelId = u64;
pub type RoleId = u64;

/// Routing for one category within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    /// Opt-in role mentioned when a release of this category is announced
    pub role: RoleId,
    /// Destination channel; `None` suppresses delivery
    pub channel: Option<ChannelId>,
    pub enabled: bool,
}

impl CategoryConfig {
    /// The destination to deliver to, if delivery is switched on.
    pub fn destination(&self) -> Option<ChannelId> {
        if self.enabled {
            self.channel
        } else {
            None
        }
    }
}

/// Partial change to a category's routing; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryUpdate {
    /// `Some(None)` clears the destination
    pub channel: Option<Option<ChannelId>>,
    pub enabled: Option<bool>,
    pub role: Option<RoleId>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.channel.is_none() && self.enabled.is_none() && self.role.is_none()
    }

    pub fn apply(&self, current: &CategoryConfig) -> CategoryConfig {
        CategoryConfig {
            role: self.role.unwrap_or(current.role),
            channel: self.channel.unwrap_or(current.channel),
            enabled: self.enabled.unwrap_or(current.enabled),
        }
    }
}

/// A tenant's full category map. Every known category is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TenantSubscription {
    categories: BTreeMap<Category, CategoryConfig>,
}

impl TenantSubscription {
    /// Default subscription on join: every category enabled, no destination yet.
    pub fn with_roles(roles: &BTreeMap<Category, RoleId>) -> Result<Self, AppError> {
        let mut categories = BTreeMap::new();
        for category in Category::ALL {
            let role = roles.get(&category).copied().ok_or_else(|| {
                AppError::Internal(format!("No opt-in role supplied for {}", category))
            })?;
            categories.insert(
                category,
                CategoryConfig {
                    role,
                    channel: None,
                    enabled: true,
                },
            );
        }
        Ok(Self { categories })
    }

    /// Decode a persisted row, rejecting unknown or missing categories.
    pub fn from_json(tenant_id: TenantId, data: &str) -> Result<Self, AppError> {
        let categories: BTreeMap<Category, CategoryConfig> = serde_json::from_str(data)
            .map_err(|e| AppError::CorruptSubscription {
                tenant_id,
                message: e.to_string(),
            })?;

        let missing: Vec<&str> = Category::ALL
            .iter()
            .filter(|c| !categories.contains_key(c))
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::CorruptSubscription {
                tenant_id,
                message: format!("missing categories: {}", missing.join(", ")),
            });
        }

        Ok(Self { categories })
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn get(&self, category: Category) -> &CategoryConfig {
        // Construction guarantees every category is present.
        &self.categories[&category]
    }

    pub fn set(&mut self, category: Category, config: CategoryConfig) {
        self.categories.insert(category, config);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryConfig)> {
        self.categories.iter().map(|(c, cfg)| (*c, cfg))
    }

    /// Opt-in roles in display order, for rebuilding self-service controls.
    pub fn role_ids(&self) -> Vec<(Category, RoleId)> {
        self.iter().map(|(c, cfg)| (c, cfg.role)).collect()
    }
}
