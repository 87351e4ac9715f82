use crate::cmd::build_manager;
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use forge_core::backend::InMemoryBackend;
use forge_core::cancel::CancelToken;
use forge_core::config::Config;
use forge_core::entitlements::{can_use_feature, Capability, EntitlementValue, UNLIMITED};
use forge_core::manager::{upgrade_recommendation, EntitlementCheck, UpgradeAction};
use forge_core::paywall::recommended_plan;
use forge_core::plan::PlanCode;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum EntitlementsSubcommand {
    /// Show the merged entitlement map
    Show {
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
    },

    /// List orgs in the local seed with the plan each is on
    Orgs,

    /// Check one capability key
    Feature {
        /// Capability key, e.g. canExportPDF
        key: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
    },

    /// Run a quota or export check: generate, gpt-optimization or export
    Check {
        action: String,
        /// Export format for `export` (txt, md, json, pdf, zip)
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
    },

    /// Print the upgrade advice shown next to a denied action
    Recommend {
        /// generate, test, export-json, export-pdf or export-zip
        action: String,
        #[arg(long, default_value = "free")]
        current: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: EntitlementsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EntitlementsSubcommand::Show { org, user } => show(root, &org, &user, json),
        EntitlementsSubcommand::Orgs => orgs(root, json),
        EntitlementsSubcommand::Feature { key, org, user } => feature(root, &key, &org, &user, json),
        EntitlementsSubcommand::Check {
            action,
            format,
            org,
            user,
        } => check(root, &action, format.as_deref(), &org, &user, json),
        EntitlementsSubcommand::Recommend { action, current } => recommend(&action, &current, json),
    }
}

fn show(root: &Path, org: &str, user: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    let manager = build_manager(root, &config)?;
    let resolved = manager.fetch(user, org, &CancelToken::new())?;

    if json {
        return print_json(&resolved);
    }

    println!("Org:  {org}");
    println!("User: {user}");
    println!("Plan: {}", resolved.plan.display_name());
    if let Some(sub) = &resolved.subscription {
        println!("Subscription: {} ({} seats)", sub.status, sub.seats);
        let days = sub.days_until_expiry(Utc::now());
        if sub.is_trialing() {
            println!("Trial ends in {days} days");
        } else {
            println!("Period ends in {days} days");
        }
    }
    if let Some(m) = &resolved.membership {
        println!("Role: {}", m.role);
    }
    println!();

    let rows: Vec<Vec<String>> = resolved
        .entitlements
        .iter()
        .map(|(cap, value)| vec![cap.key().to_string(), describe(value)])
        .collect();
    print_table(&["CAPABILITY", "VALUE"], &rows);
    Ok(())
}

fn orgs(root: &Path, json: bool) -> anyhow::Result<()> {
    let backend = InMemoryBackend::load(root).context("failed to load org seed")?;
    let mut rows = Vec::new();
    for org_id in backend.org_ids() {
        let plan = backend.org_plan(&org_id)?;
        rows.push((org_id, plan));
    }

    if json {
        let list: Vec<_> = rows
            .iter()
            .map(|(org_id, plan)| serde_json::json!({ "org_id": org_id, "plan": plan }))
            .collect();
        return print_json(&list);
    }
    if rows.is_empty() {
        println!("No orgs in {}", forge_core::paths::ORGS_FILE);
        return Ok(());
    }
    let table: Vec<Vec<String>> = rows
        .into_iter()
        .map(|(org_id, plan)| vec![org_id, plan.display_name().to_string()])
        .collect();
    print_table(&["ORG", "PLAN"], &table);
    Ok(())
}

fn describe(value: EntitlementValue) -> String {
    match value {
        EntitlementValue::Bool(b) => b.to_string(),
        EntitlementValue::Quota(UNLIMITED) => "unlimited".to_string(),
        EntitlementValue::Quota(n) => n.to_string(),
    }
}

fn feature(root: &Path, key: &str, org: &str, user: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    let manager = build_manager(root, &config)?;
    let set = manager.get_user_entitlements(user, org);
    let allowed = can_use_feature(&set, key);
    let recommended = Capability::from_key(key)
        .filter(|_| !allowed)
        .map(recommended_plan);

    if json {
        return print_json(&serde_json::json!({
            "feature": key,
            "allowed": allowed,
            "recommended_plan": recommended,
        }));
    }

    if allowed {
        println!("{key}: allowed");
    } else {
        println!("{key}: denied");
        if let Some(plan) = recommended {
            println!("Upgrade to {} to unlock it.", plan.display_name());
        }
    }
    Ok(())
}

fn check(
    root: &Path,
    action: &str,
    format: Option<&str>,
    org: &str,
    user: &str,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    let manager = build_manager(root, &config)?;
    let result: EntitlementCheck = match action {
        "generate" => manager.can_generate_prompt(user, org),
        "gpt-optimization" => manager.can_use_gpt_optimization(user, org),
        "export" => {
            let format = format.ok_or_else(|| anyhow::anyhow!("--format is required for export"))?;
            manager.can_export_format(user, org, format)
        }
        other => anyhow::bail!(
            "unknown check '{other}': expected generate, gpt-optimization or export"
        ),
    };

    if json {
        return print_json(&result);
    }

    println!("{action}: {}", if result.allowed { "allowed" } else { "denied" });
    if let Some(reason) = &result.reason {
        println!("  {reason}");
    }
    if let Some(warning) = &result.warning {
        println!("  warning: {warning}");
    }
    if let Some(left) = result.remaining {
        println!("  remaining: {left}");
    }
    if result.upgrade_required {
        println!(
            "  upgrade: {} -> {}",
            result.current_plan.display_name(),
            result.required_plan.display_name()
        );
    }
    Ok(())
}

fn recommend(action: &str, current: &str, json: bool) -> anyhow::Result<()> {
    let action: UpgradeAction = action.parse()?;
    let current: PlanCode = current.parse()?;
    let advice = upgrade_recommendation(current, action);
    if json {
        print_json(&serde_json::json!({
            "action": action.as_str(),
            "current_plan": current,
            "recommendation": advice,
        }))
    } else {
        println!("{advice}");
        Ok(())
    }
}
