use crate::output::{mark, print_json, print_table};
use forge_core::checkout::HttpCheckoutClient;
use forge_core::config::Config;
use forge_core::entitlements::Capability;
use forge_core::paywall::{PaywallPrompt, PaywallSession};
use forge_core::plan::{BillingCycle, PlanCode};
use forge_core::ForgeError;
use std::path::Path;

pub struct PaywallArgs {
    pub feature: String,
    pub trigger: Option<String>,
    pub current: String,
    pub cycle: String,
    /// Org to start a checkout for; preview only when absent.
    pub upgrade: Option<String>,
    pub return_url: String,
}

pub fn run(root: &Path, args: &PaywallArgs, json: bool) -> anyhow::Result<()> {
    let capability = Capability::from_key(&args.feature)
        .ok_or_else(|| ForgeError::UnknownCapability(args.feature.clone()))?;
    let current: PlanCode = args.current.parse()?;
    let cycle: BillingCycle = args.cycle.parse()?;

    let prompt = PaywallPrompt::for_capability(capability, args.trigger.as_deref());
    let org_id = args.upgrade.clone().unwrap_or_default();
    let mut session = PaywallSession::open(org_id.as_str(), prompt, current);
    session.set_billing_cycle(cycle);

    if !json {
        print_prompt(&session);
    }

    if args.upgrade.is_none() {
        if json {
            print_json(&serde_json::json!({
                "prompt": session.prompt(),
                "plans": session.plan_rows(),
            }))?;
        }
        return Ok(());
    }

    let config = Config::load(root)?;
    let base_url = config
        .api_base_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("api_base_url is not set in .promptforge/config.yaml"))?;
    let token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());
    let client = HttpCheckoutClient::new(base_url, token, config.request_timeout())?;
    let plan = session.prompt().recommended_plan;

    match session.handle_upgrade(&client, Some(plan), &args.return_url) {
        Ok(url) => {
            if json {
                print_json(&serde_json::json!({
                    "org_id": org_id,
                    "plan": plan,
                    "billing_cycle": cycle,
                    "url": url.as_str(),
                }))?;
            } else {
                println!("\nCheckout ready: {url}");
            }
            session.close();
            Ok(())
        }
        Err(e) => {
            let shown = session.error().unwrap_or_default().to_string();
            if !json {
                println!("\n{shown}");
            }
            Err(anyhow::Error::new(e).context(shown))
        }
    }
}

fn print_prompt(session: &PaywallSession) {
    let prompt = session.prompt();
    println!("{}", prompt.feature.name);
    println!("{}\n", prompt.feature.description);
    println!("{}", prompt.message);
    println!(
        "Recommended: {} ({} billing)\n",
        prompt.recommended_plan.display_name(),
        session.billing_cycle()
    );

    let rows: Vec<Vec<String>> = session
        .plan_rows()
        .iter()
        .map(|r| {
            vec![
                r.name.to_string(),
                format!("${}/mo", r.price),
                mark(r.current).to_string(),
                mark(r.recommended).to_string(),
                r.features.join(", "),
            ]
        })
        .collect();
    print_table(&["PLAN", "PRICE", "CURRENT", "RECOMMENDED", "INCLUDES"], &rows);
}
