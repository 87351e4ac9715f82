use crate::output::{mark, print_json, print_table};
use forge_core::paywall::plan_rows;
use forge_core::plan::{BillingCycle, PlanCode};

pub fn run(cycle: &str, current: Option<&str>, json: bool) -> anyhow::Result<()> {
    let cycle: BillingCycle = cycle.parse()?;
    let current = current
        .map(str::parse::<PlanCode>)
        .transpose()?
        .unwrap_or(PlanCode::Free);
    let rows = plan_rows(current, PlanCode::Pro, cycle);

    if json {
        return print_json(&rows);
    }

    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.code.to_string(),
                r.name.to_string(),
                format!("${}/mo", r.price),
                format!("${}", r.billed),
                mark(r.current).to_string(),
                if r.recommended { "recommended".into() } else { String::new() },
            ]
        })
        .collect();
    println!("Billing cycle: {cycle}\n");
    print_table(&["PLAN", "NAME", "PRICE", "BILLED", "CURRENT", ""], &table);
    Ok(())
}
