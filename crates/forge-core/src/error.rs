use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("unknown plan code: {0}")]
    UnknownPlan(String),

    #[error("unknown billing cycle '{0}': expected monthly or annual")]
    UnknownBillingCycle(String),

    #[error("unknown subscription status: {0}")]
    UnknownSubscriptionStatus(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("unknown gate mode '{0}': expected modal, inline or replace")]
    UnknownGateMode(String),

    #[error("unknown error policy '{0}': expected fail-open or fail-closed")]
    UnknownErrorPolicy(String),

    #[error("unknown upgrade action '{0}': expected generate, test, export-json, export-pdf or export-zip")]
    UnknownAction(String),

    #[error("organization not found: {0}")]
    OrgNotFound(String),

    #[error("entitlement backend error: {0}")]
    Backend(String),

    #[error("usage counter unavailable: {0}")]
    UsageUnavailable(String),

    #[error("entitlement fetch cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
