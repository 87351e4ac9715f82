use crate::error::Result;
use crate::paths;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub struct VarRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub description: &'static str,
    regex: OnceLock<Regex>,
}

impl VarRule {
    const fn new(name: &'static str, pattern: &'static str, description: &'static str) -> Self {
        Self {
            name,
            pattern,
            description,
            regex: OnceLock::new(),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex
            .get_or_init(|| Regex::new(self.pattern).unwrap())
            .is_match(value)
    }
}

pub static REQUIRED_VARS: [VarRule; 8] = [
    VarRule::new(
        "STRIPE_SECRET_KEY",
        r"^sk_(test|live)_",
        "Stripe Secret Key (starts with sk_test_ or sk_live_)",
    ),
    VarRule::new(
        "STRIPE_WEBHOOK_SECRET",
        r"^whsec_",
        "Stripe Webhook Secret (starts with whsec_)",
    ),
    VarRule::new(
        "NEXT_PUBLIC_STRIPE_PUBLISHABLE_KEY",
        r"^pk_(test|live)_",
        "Stripe Publishable Key (starts with pk_test_ or pk_live_)",
    ),
    VarRule::new(
        "SUPABASE_URL",
        r"^https://.*\.supabase\.co$",
        "Supabase Project URL (https://project-id.supabase.co)",
    ),
    VarRule::new(
        "SUPABASE_SERVICE_ROLE_KEY",
        r"^eyJ",
        "Supabase Service Role Key (JWT token)",
    ),
    VarRule::new(
        "NEXT_PUBLIC_SUPABASE_ANON_KEY",
        r"^eyJ",
        "Supabase Anon Key (JWT token)",
    ),
    VarRule::new("NEXT_PUBLIC_BASE_URL", r"^https?://.+", "Application Base URL"),
    VarRule::new(
        "NODE_ENV",
        r"^(development|staging|production)$",
        "Node Environment",
    ),
];

pub static OPTIONAL_VARS: [VarRule; 3] = [
    VarRule::new(
        "STRIPE_PORTAL_CONFIGURATION_ID",
        r"^bpc_",
        "Stripe Portal Configuration ID (starts with bpc_)",
    ),
    VarRule::new(
        "SENDGRID_API_KEY",
        r"^SG\.",
        "SendGrid API Key (starts with SG.)",
    ),
    VarRule::new("DEBUG", r".*", "Debug mode configuration"),
];

pub const REQUIRED_FILES: &[&str] = &[
    "lib/billing/stripe.ts",
    "lib/billing/entitlements.ts",
    "app/api/webhooks/stripe/route.ts",
    "app/api/billing/checkout/route.ts",
    "app/api/billing/portal/route.ts",
    "app/api/entitlements/route.ts",
    paths::MIGRATION_FILE,
    "scripts/create-stripe-products.js",
    "scripts/setup-billing.js",
];

pub struct MigrationComponent {
    pub name: &'static str,
    pub pattern: &'static str,
}

pub const MIGRATION_COMPONENTS: &[MigrationComponent] = &[
    MigrationComponent {
        name: "Subscriptions table",
        pattern: r"CREATE TABLE.*subscriptions",
    },
    MigrationComponent {
        name: "Entitlements table",
        pattern: r"CREATE TABLE.*entitlements",
    },
    MigrationComponent {
        name: "Webhook events table",
        pattern: r"CREATE TABLE.*webhook_events",
    },
    MigrationComponent {
        name: "pf_apply_plan_entitlements function",
        pattern: r"CREATE.*FUNCTION.*pf_apply_plan_entitlements",
    },
    MigrationComponent {
        name: "RLS policies",
        pattern: r"CREATE POLICY",
    },
    MigrationComponent {
        name: "Indexes",
        pattern: r"CREATE INDEX",
    },
];

fn migration_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        MIGRATION_COMPONENTS
            .iter()
            .map(|c| Regex::new(c.pattern).unwrap())
            .collect()
    })
}

// ---------------------------------------------------------------------------
// .env parsing
// ---------------------------------------------------------------------------

/// Parse `KEY=value` lines. Comment lines and lines without `=` are skipped;
/// keys are trimmed, values are kept verbatim apart from a trailing `\r`.
pub fn parse_env(content: &str) -> HashMap<String, String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^([^#=]+)=(.*)$").unwrap());

    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(caps) = re.captures(line) {
            let key = caps[1].trim();
            if !key.is_empty() {
                vars.insert(key.to_string(), caps[2].to_string());
            }
        }
    }
    vars
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarStatus {
    Valid,
    Missing,
    InvalidFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct VarCheck {
    pub name: &'static str,
    pub status: VarStatus,
    pub expected: &'static str,
    /// Present only for invalid values, so the report can show what it got.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub got: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub path: &'static str,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentCheck {
    pub name: &'static str,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub found: bool,
    pub components: Vec<ComponentCheck>,
}

impl MigrationReport {
    pub fn is_valid(&self) -> bool {
        self.found && self.components.iter().all(|c| c.present)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub valid: usize,
    pub invalid: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvReport {
    pub env_file_found: bool,
    pub required: Vec<VarCheck>,
    pub optional: Vec<VarCheck>,
    pub files: Vec<FileCheck>,
    pub migration: MigrationReport,
}

impl EnvReport {
    pub fn required_tally(&self) -> Tally {
        tally(&self.required)
    }

    pub fn optional_tally(&self) -> Tally {
        tally(&self.optional)
    }

    pub fn vars_valid(&self) -> bool {
        self.required.iter().all(|v| v.status == VarStatus::Valid)
    }

    pub fn files_complete(&self) -> bool {
        self.files.iter().all(|f| f.exists)
    }

    pub fn passed(&self) -> bool {
        self.env_file_found && self.vars_valid() && self.files_complete() && self.migration.is_valid()
    }
}

fn tally(checks: &[VarCheck]) -> Tally {
    let mut t = Tally::default();
    for c in checks {
        match c.status {
            VarStatus::Valid => t.valid += 1,
            VarStatus::InvalidFormat => t.invalid += 1,
            VarStatus::Missing => t.missing += 1,
        }
    }
    t
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

pub fn check_vars(rules: &[VarRule], vars: &HashMap<String, String>) -> Vec<VarCheck> {
    rules
        .iter()
        .map(|rule| {
            let (status, got) = match vars.get(rule.name).filter(|v| !v.is_empty()) {
                None => (VarStatus::Missing, None),
                Some(v) if rule.matches(v) => (VarStatus::Valid, None),
                Some(v) => (VarStatus::InvalidFormat, Some(v.clone())),
            };
            VarCheck {
                name: rule.name,
                status,
                expected: rule.description,
                got,
            }
        })
        .collect()
}

pub fn check_files(root: &Path) -> Vec<FileCheck> {
    REQUIRED_FILES
        .iter()
        .map(|&path| FileCheck {
            path,
            exists: root.join(path).exists(),
        })
        .collect()
}

pub fn check_migration(root: &Path) -> Result<MigrationReport> {
    let path = paths::migration_path(root);
    if !path.exists() {
        return Ok(MigrationReport {
            found: false,
            components: Vec::new(),
        });
    }
    let sql = std::fs::read_to_string(&path)?;
    let components = MIGRATION_COMPONENTS
        .iter()
        .zip(migration_regexes())
        .map(|(c, re)| ComponentCheck {
            name: c.name,
            present: re.is_match(&sql),
        })
        .collect();
    Ok(MigrationReport {
        found: true,
        components,
    })
}

/// Run every check against the project at `root`. A missing `.env.local`
/// stops early with an otherwise empty, failing report.
pub fn run_check(root: &Path) -> Result<EnvReport> {
    let env_path = paths::env_path(root);
    if !env_path.exists() {
        tracing::debug!(path = %env_path.display(), "env file not found");
        return Ok(EnvReport {
            env_file_found: false,
            required: Vec::new(),
            optional: Vec::new(),
            files: Vec::new(),
            migration: MigrationReport {
                found: false,
                components: Vec::new(),
            },
        });
    }

    let vars = parse_env(&std::fs::read_to_string(&env_path)?);
    Ok(EnvReport {
        env_file_found: true,
        required: check_vars(&REQUIRED_VARS, &vars),
        optional: check_vars(&OPTIONAL_VARS, &vars),
        files: check_files(root),
        migration: check_migration(root)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
