use crate::plan::{BillingCycle, PlanCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Wire types for POST /api/billing/create-checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub org_id: String,
    /// Absent when the caller lets the billing service pick the next plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_code: Option<PlanCode>,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Hosted checkout page the client must navigate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrl(String);

impl RedirectUrl {
    pub fn parse(url: impl Into<String>) -> Result<Self, CheckoutError> {
        let url = url.into();
        if url.starts_with("https://") || url.starts_with("http://") {
            Ok(Self(url))
        } else {
            Err(CheckoutError::InvalidResponse(format!(
                "redirect url is not absolute: {url:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RedirectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// CheckoutError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckoutError {
    #[error("checkout request failed: {0}")]
    Network(String),

    #[error("checkout endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid checkout response: {0}")]
    InvalidResponse(String),
}

impl CheckoutError {
    /// Text suitable for the paywall's visible error state.
    pub fn user_message(&self) -> &'static str {
        match self {
            CheckoutError::Network(_) => {
                "We couldn't reach the payment provider. Check your connection and try again."
            }
            CheckoutError::Status { status, .. } if *status < 500 => {
                "Checkout could not be started for this plan. Please contact support if this continues."
            }
            CheckoutError::Status { .. } | CheckoutError::InvalidResponse(_) => {
                "Checkout is temporarily unavailable. Please try again in a few minutes."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

pub trait CheckoutClient: Send + Sync {
    fn create_session(&self, request: &CheckoutRequest) -> Result<RedirectUrl, CheckoutError>;
}

/// Posts checkout requests to a deployed billing API.
pub struct HttpCheckoutClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpCheckoutClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CheckoutError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl CheckoutClient for HttpCheckoutClient {
    fn create_session(&self, request: &CheckoutRequest) -> Result<RedirectUrl, CheckoutError> {
        let url = format!("{}/api/billing/create-checkout", self.base_url);
        let mut req = self.client.post(&url).json(request);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .map_err(|e| CheckoutError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| CheckoutError::Network(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| body.trim().chars().take(200).collect());
            return Err(CheckoutError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CheckoutResponse = serde_json::from_str(&body)
            .map_err(|e| CheckoutError::InvalidResponse(e.to_string()))?;
        RedirectUrl::parse(parsed.url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
