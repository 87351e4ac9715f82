use axum::{
    extract::{Path, Query, State},
    Json,
};
use forge_core::entitlements::Capability;
use forge_core::paywall::{plan_rows, PaywallPrompt};
use forge_core::plan::{BillingCycle, PlanCode};
use serde::Deserialize;

use crate::error::AppError;
use crate::routes::entitlements::PairQuery;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlansQuery {
    pub billing_cycle: Option<String>,
    pub current: Option<String>,
}

fn parse_cycle(raw: Option<&str>) -> Result<BillingCycle, AppError> {
    Ok(raw
        .map(str::parse::<BillingCycle>)
        .transpose()?
        .unwrap_or_default())
}

/// GET /api/plans?billingCycle=&current=: plan comparison rows
pub async fn list_plans(Query(q): Query<PlansQuery>) -> Result<Json<serde_json::Value>, AppError> {
    let cycle = parse_cycle(q.billing_cycle.as_deref())?;
    let current = q
        .current
        .as_deref()
        .map(str::parse::<PlanCode>)
        .transpose()?
        .unwrap_or(PlanCode::Free);
    let rows = plan_rows(current, PlanCode::Pro, cycle);
    Ok(Json(serde_json::json!({ "billingCycle": cycle, "plans": rows })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallQuery {
    pub org_id: Option<String>,
    pub user_id: Option<String>,
    pub trigger: Option<String>,
    pub billing_cycle: Option<String>,
}

/// GET /api/paywall/:feature: what an upgrade prompt for `feature` shows to
/// this user
pub async fn get_paywall(
    State(app): State<AppState>,
    Path(feature): Path<String>,
    Query(q): Query<PaywallQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cycle = parse_cycle(q.billing_cycle.as_deref())?;
    let capability = Capability::from_key(&feature)
        .ok_or(forge_core::ForgeError::UnknownCapability(feature))?;
    let (org_id, user_id) = PairQuery {
        org_id: q.org_id,
        user_id: q.user_id,
    }
    .require()?;
    let trigger = q.trigger;

    let manager = app.manager.clone();
    let resolved = tokio::task::spawn_blocking(move || manager.resolve(&user_id, &org_id))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;

    let prompt = PaywallPrompt::for_capability(capability, trigger.as_deref());
    let rows = plan_rows(resolved.plan, prompt.recommended_plan, cycle);
    Ok(Json(serde_json::json!({
        "blocked": !resolved.entitlements.get(capability).is_usable(),
        "currentPlan": resolved.plan,
        "prompt": prompt,
        "plans": rows,
    })))
}
