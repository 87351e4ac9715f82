use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FORGE_DIR: &str = ".promptforge";
pub const CONFIG_FILE: &str = ".promptforge/config.yaml";
pub const ORGS_FILE: &str = ".promptforge/orgs.yaml";
pub const ADMIN_FILE: &str = ".promptforge/admin.yaml";

pub const ENV_FILE: &str = ".env.local";
pub const MIGRATION_FILE: &str = "supabase/migrations/0001_stripe_billing.sql";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn orgs_path(root: &Path) -> PathBuf {
    root.join(ORGS_FILE)
}

pub fn admin_path(root: &Path) -> PathBuf {
    root.join(ADMIN_FILE)
}

pub fn env_path(root: &Path) -> PathBuf {
    root.join(ENV_FILE)
}

pub fn migration_path(root: &Path) -> PathBuf {
    root.join(MIGRATION_FILE)
}
