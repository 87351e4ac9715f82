mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, entitlements::EntitlementsSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "forge",
    about = "PromptForge billing toolkit: check deployment config, inspect entitlements, preview paywalls",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .promptforge/ or .git/)
    #[arg(long, global = true, env = "FORGE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check .env.local, required files and the billing migration
    CheckConfig,

    /// Smoke-test a deployed entitlements and checkout API
    Smoke {
        /// Base URL of the deployment
        #[arg(long, env = "FORGE_BASE_URL", default_value = "http://localhost:3000")]
        base_url: String,
        /// Bearer token sent with every request
        #[arg(long, env = "AUTH_TOKEN")]
        token: Option<String>,
        /// Organization to test against (tests are skipped without one)
        #[arg(long, env = "ORG_ID")]
        org_id: Option<String>,
        /// User to resolve entitlements for
        #[arg(long, env = "FORGE_USER_ID", default_value = "smoke-test")]
        user_id: String,
        /// Plan to request a checkout session for
        #[arg(long, default_value = "pro")]
        plan: String,
    },

    /// Show the plan catalog
    Plans {
        /// Billing cycle: monthly or annual
        #[arg(long, default_value = "monthly")]
        cycle: String,
        /// Mark this plan as current
        #[arg(long)]
        current: Option<String>,
    },

    /// Resolve and check entitlements for a user in an org
    Entitlements {
        #[command(subcommand)]
        subcommand: EntitlementsSubcommand,
    },

    /// Preview the upgrade prompt for a capability, optionally starting checkout
    Paywall {
        /// Capability key, e.g. canExportPDF
        feature: String,
        /// Trigger key overriding the one derived from the capability
        #[arg(long)]
        trigger: Option<String>,
        /// Plan the viewer is on
        #[arg(long, default_value = "free")]
        current: String,
        /// Billing cycle: monthly or annual
        #[arg(long, default_value = "monthly")]
        cycle: String,
        /// Create a checkout session for this org
        #[arg(long)]
        upgrade: Option<String>,
        /// Page the hosted checkout returns to
        #[arg(long, default_value = "http://localhost:3000/billing")]
        return_url: String,
    },

    /// Show what an entitlement gate renders for a user
    Gate {
        /// Capability key, e.g. canExportPDF
        feature: String,
        #[arg(long)]
        org: String,
        #[arg(long)]
        user: String,
        /// Denied presentation: modal, inline or replace
        #[arg(long, default_value = "modal")]
        mode: String,
        /// Simulate a click on the gated element
        #[arg(long)]
        click: bool,
    },

    /// Inspect and validate .promptforge/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the dev API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3141")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::CheckConfig => cmd::check_config::run(&root, cli.json),
        Commands::Smoke {
            base_url,
            token,
            org_id,
            user_id,
            plan,
        } => cmd::smoke::run(
            &cmd::smoke::SmokeConfig {
                base_url,
                token,
                org_id,
                user_id,
                plan,
            },
            cli.json,
        ),
        Commands::Plans { cycle, current } => {
            cmd::plans::run(&cycle, current.as_deref(), cli.json)
        }
        Commands::Entitlements { subcommand } => {
            cmd::entitlements::run(&root, subcommand, cli.json)
        }
        Commands::Paywall {
            feature,
            trigger,
            current,
            cycle,
            upgrade,
            return_url,
        } => cmd::paywall::run(
            &root,
            &cmd::paywall::PaywallArgs {
                feature,
                trigger,
                current,
                cycle,
                upgrade,
                return_url,
            },
            cli.json,
        ),
        Commands::Gate {
            feature,
            org,
            user,
            mode,
            click,
        } => cmd::gate::run(&root, &feature, &org, &user, &mode, click, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
