//! Command line interface.
//!
//! `serve` runs the notifier; `tenant` subcommands administer subscription rows.

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};

use crate::db::SubscriptionStore;
use crate::errors::AppError;
use crate::models::{Category, CategoryUpdate, ChannelId, RoleId, TenantId, TenantSubscription};

#[derive(Debug, Parser)]
#[command(name = "release-notifier", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the poll loop and diagnostics endpoint (default)
    Serve,
    /// Manage tenant subscriptions
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum TenantAction {
    /// Create a tenant's subscription row; an existing row is kept
    Join {
        tenant_id: TenantId,
        /// Opt-in role per category, e.g. `--role iOS=1234`; required for every category
        #[arg(long = "role", value_parser = parse_role, required = true)]
        roles: Vec<(Category, RoleId)>,
    },
    /// Delete a tenant's subscription row
    Remove { tenant_id: TenantId },
    /// Print a tenant's subscription
    Show { tenant_id: TenantId },
    /// Print every tenant's subscription
    List,
    /// Route one category; settings not given are kept
    Set {
        tenant_id: TenantId,
        category: Category,
        /// Destination channel
        #[arg(long, conflicts_with = "clear_channel")]
        channel: Option<ChannelId>,
        /// Remove the destination channel
        #[arg(long)]
        clear_channel: bool,
        /// Resume announcing this category
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Stop announcing this category
        #[arg(long)]
        disable: bool,
        /// Replace the opt-in role
        #[arg(long)]
        role: Option<RoleId>,
    },
}

fn parse_role(raw: &str) -> Result<(Category, RoleId), String> {
    let (category, role) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected CATEGORY=ROLE_ID, got {:?}", raw))?;
    let category: Category = category.parse()?;
    let role = role
        .trim()
        .parse()
        .map_err(|_| format!("Invalid role id: {:?}", role))?;
    Ok((category, role))
}

/// Execute a tenant subcommand.
pub async fn run_tenant(store: &SubscriptionStore, action: TenantAction) -> Result<(), AppError> {
    match action {
        TenantAction::Join { tenant_id, roles } => {
            let roles: BTreeMap<Category, RoleId> = roles.into_iter().collect();
            let default = TenantSubscription::with_roles(&roles)?;
            if store.upsert_on_join(tenant_id, &default).await? {
                println!("Tenant {} joined", tenant_id);
            } else {
                println!("Tenant {} already has a subscription; left unchanged", tenant_id);
            }
        }
        TenantAction::Remove { tenant_id } => {
            store.remove(tenant_id).await?;
            println!("Tenant {} removed", tenant_id);
        }
        TenantAction::Show { tenant_id } => {
            let sub = store.get(tenant_id).await?;
            print_subscription(tenant_id, &sub);
            println!("  opt-in roles:");
            for (category, role) in sub.role_ids() {
                println!("    {} -> {}", category.role_name(), role);
            }
        }
        TenantAction::List => {
            for (tenant_id, sub) in store.list_all().await? {
                print_subscription(tenant_id, &sub);
            }
        }
        TenantAction::Set {
            tenant_id,
            category,
            channel,
            clear_channel,
            enable,
            disable,
            role,
        } => {
            let update = category_update(channel, clear_channel, enable, disable, role);
            let sub = store.update_category(tenant_id, category, &update).await?;
            print_subscription(tenant_id, &sub);
        }
    }
    Ok(())
}

fn category_update(
    channel: Option<ChannelId>,
    clear_channel: bool,
    enable: bool,
    disable: bool,
    role: Option<RoleId>,
) -> CategoryUpdate {
    CategoryUpdate {
        channel: if clear_channel { Some(None) } else { channel.map(Some) },
        enabled: match (enable, disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        role,
    }
}

fn print_subscription(tenant_id: TenantId, sub: &TenantSubscription) {
    println!("Tenant {}", tenant_id);
    for (category, cfg) in sub.iter() {
        let channel = cfg
            .channel
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<10} channel={:<20} enabled={:<5} role={}",
            category.as_str(),
            channel,
            cfg.enabled,
            cfg.role
        );
    }
}
