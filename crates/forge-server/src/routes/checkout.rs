use axum::{extract::State, Json};
use forge_core::checkout::{CheckoutRequest, CheckoutResponse, RedirectUrl};
use forge_core::plan;

use crate::error::AppError;
use crate::state::AppState;

/// Hosted checkout page the dev stub points clients at.
pub const CHECKOUT_HOST: &str = "https://checkout.stripe.com/c/pay";

/// POST /api/billing/create-checkout: dev stand-in for the billing service.
///
/// Validates the request the way the real service does and answers with a
/// fresh hosted-checkout URL. No payment provider is contacted.
pub async fn create_checkout(
    State(app): State<AppState>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    if body.org_id.trim().is_empty() {
        return Err(AppError::bad_request("orgId is required"));
    }
    for (field, url) in [("successUrl", &body.success_url), ("cancelUrl", &body.cancel_url)] {
        if RedirectUrl::parse(url.as_str()).is_err() {
            return Err(AppError::bad_request(format!("{field} must be an absolute URL")));
        }
    }
    if body.plan_code.is_some_and(|p| plan::plan(p).is_free()) {
        return Err(AppError::bad_request("the free plan has no checkout"));
    }

    let backend = app.backend.clone();
    let org_id = body.org_id.clone();
    let current = tokio::task::spawn_blocking(move || backend.org_plan(&org_id))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    let target = match body.plan_code.or_else(|| current.next()) {
        Some(plan) => plan,
        None => {
            return Err(AppError::conflict(format!(
                "{} is already on the highest plan",
                body.org_id
            )))
        }
    };
    if target <= current {
        return Err(AppError::conflict(format!(
            "{} is already on the {} plan",
            body.org_id,
            current.display_name()
        )));
    }

    let session = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
    tracing::info!(
        org_id = %body.org_id,
        plan = %target,
        cycle = %body.billing_cycle,
        session = %session,
        "checkout session created"
    );
    Ok(Json(CheckoutResponse {
        url: format!("{CHECKOUT_HOST}/{session}"),
    }))
}
