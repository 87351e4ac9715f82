use crate::output::print_json;
use anyhow::Context;
use forge_core::envcheck::{self, EnvReport, VarCheck, VarStatus};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let report = envcheck::run_check(root).context("failed to run configuration check")?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.passed() {
        anyhow::bail!("configuration check failed");
    }
    Ok(())
}

fn print_report(report: &EnvReport) {
    println!("🔍 PROMPTFORGE v3 - CONFIGURATION CHECK\n");
    println!("📁 Checking environment configuration...");
    if !report.env_file_found {
        println!("❌ .env.local file not found");
        println!("   Run: pnpm run setup:billing");
        return;
    }
    println!("✅ .env.local file found");

    println!("\n🔍 Validating environment variables...");
    println!("\n📋 Required Variables:");
    for check in &report.required {
        print_var(check, "❌", "MISSING");
    }
    println!("\n📋 Optional Variables:");
    for check in &report.optional {
        print_var(check, "⚠️ ", "NOT SET");
    }

    println!("\n📁 Checking file structure...");
    for file in &report.files {
        let icon = if file.exists { "✅" } else { "❌" };
        println!("   {icon} {}", file.path);
    }

    println!("\n🗄️  Checking database migration...");
    if !report.migration.found {
        println!("   ❌ Database migration file not found");
    }
    for component in &report.migration.components {
        let icon = if component.present { "✅" } else { "❌" };
        println!("   {icon} {}", component.name);
    }

    let required = report.required_tally();
    let optional = report.optional_tally();
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("🎯 CONFIGURATION CHECK SUMMARY");
    println!("{rule}");
    println!("📋 Environment Variables:");
    println!(
        "   Required: {}/{} valid",
        required.valid,
        required.valid + required.invalid + required.missing
    );
    println!(
        "   Optional: {}/{} valid",
        optional.valid,
        optional.valid + optional.invalid
    );
    println!(
        "📁 File Structure: {}",
        if report.files_complete() { "COMPLETE" } else { "INCOMPLETE" }
    );
    println!(
        "🗄️  Database Migration: {}",
        if report.migration.is_valid() { "VALID" } else { "INVALID" }
    );

    if report.passed() {
        println!("\n🏆 CONFIGURATION CHECK PASSED!");
        println!("🚀 PromptForge v3 billing system is properly configured!");
        println!("\n📋 Next steps:");
        println!("1. Run: pnpm run setup:stripe (to create Stripe products)");
        println!("2. Run: pnpm run migrate (to apply database schema)");
        println!("3. Test the system with: forge smoke");
    } else {
        println!("\n⚠️  CONFIGURATION CHECK FAILED");
        println!("🔧 Please fix the issues above before proceeding");
        if !report.vars_valid() {
            println!("\n💡 To fix environment variables:");
            println!("   Run: pnpm run setup:billing");
        }
    }
}

/// `missing_icon` is followed by one space, so the optional marker carries
/// its own trailing pad.
fn print_var(check: &VarCheck, missing_icon: &str, missing_label: &str) {
    match check.status {
        VarStatus::Valid => println!("   ✅ {}: VALID", check.name),
        VarStatus::Missing => println!("   {missing_icon} {}: {missing_label}", check.name),
        VarStatus::InvalidFormat => {
            println!("   ❌ {}: INVALID FORMAT", check.name);
            println!("      Expected: {}", check.expected);
            println!("      Got: {}", check.got.as_deref().unwrap_or_default());
        }
    }
}
