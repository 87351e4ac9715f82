use crate::cmd::build_manager;
use crate::output::print_json;
use forge_core::config::Config;
use forge_core::entitlements::Capability;
use forge_core::gate::{EntitlementGate, GateMode, GateView};
use forge_core::ForgeError;
use std::path::Path;

const CHILDREN: &str = "[gated content]";

pub fn run(
    root: &Path,
    feature: &str,
    org: &str,
    user: &str,
    mode: &str,
    click: bool,
    json: bool,
) -> anyhow::Result<()> {
    let capability =
        Capability::from_key(feature).ok_or_else(|| ForgeError::UnknownCapability(feature.into()))?;
    let mode: GateMode = mode.parse()?;
    let config = Config::load(root)?;
    let manager = build_manager(root, &config)?;

    let mut gate = EntitlementGate::new(capability, mode, CHILDREN)
        .with_policy(config.on_entitlement_error);
    gate.load_with(&manager, user, org);
    if click {
        gate.click();
    }

    let view = describe(&gate.render());
    if json {
        print_json(&serde_json::json!({
            "feature": feature,
            "mode": mode.as_str(),
            "state": format!("{:?}", gate.state()),
            "modal_open": gate.is_modal_open(),
            "view": view,
        }))
    } else {
        println!("{view}");
        Ok(())
    }
}

/// One-paragraph text rendering of what the gate would show.
fn describe(view: &GateView<'_, &str>) -> String {
    match view {
        GateView::Skeleton => "loading…".to_string(),
        GateView::Children(c) => c.to_string(),
        GateView::ChildrenWithWarning { children, warning } => format!("{children}\n! {warning}"),
        GateView::ModalTrigger { children, modal: None } => {
            format!("{children} (locked: click to see upgrade options)")
        }
        GateView::ModalTrigger {
            children,
            modal: Some(prompt),
        } => format!(
            "{children}\n[upgrade] {}\nRecommended plan: {}",
            prompt.message,
            prompt.recommended_plan.display_name()
        ),
        GateView::InlineUpsell(prompt) => format!(
            "[upgrade] {}: {}\nUpgrade to {}",
            prompt.feature.name,
            prompt.feature.description,
            prompt.recommended_plan.display_name()
        ),
        GateView::Fallback(f) => f.to_string(),
        GateView::LockedPlaceholder {
            capability,
            required_plan,
        } => format!(
            "Locked: {} requires the {} plan",
            capability.key(),
            required_plan.display_name()
        ),
    }
}
