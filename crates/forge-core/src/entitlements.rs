use crate::error::ForgeError;
use crate::plan::PlanCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Flag,
    Quota,
}

/// Closed set of product features an organization can be entitled to.
/// Wire names are the camelCase keys used by the entitlements API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "canExportMD")]
    CanExportMd,
    #[serde(rename = "canExportJSON")]
    CanExportJson,
    #[serde(rename = "canExportPDF")]
    CanExportPdf,
    #[serde(rename = "canExportBundleZip")]
    CanExportBundleZip,
    #[serde(rename = "canUseGptTestReal")]
    CanUseGptTestReal,
    #[serde(rename = "canUseAllModules")]
    CanUseAllModules,
    #[serde(rename = "hasAPI")]
    HasApi,
    #[serde(rename = "hasCloudHistory")]
    HasCloudHistory,
    #[serde(rename = "hasEvaluatorAI")]
    HasEvaluatorAi,
    #[serde(rename = "hasWhiteLabel")]
    HasWhiteLabel,
    #[serde(rename = "hasSeatsGT1")]
    HasSeatsGt1,
    #[serde(rename = "hasExportDesigner")]
    HasExportDesigner,
    #[serde(rename = "hasFinTechPack")]
    HasFinTechPack,
    #[serde(rename = "hasEduPack")]
    HasEduPack,
    #[serde(rename = "hasIndustryTemplates")]
    HasIndustryTemplates,
    #[serde(rename = "maxRunsPerDay")]
    MaxRunsPerDay,
    #[serde(rename = "maxTokensPerRun")]
    MaxTokensPerRun,
    #[serde(rename = "maxSeats")]
    MaxSeats,
    #[serde(rename = "monthlyGptOptimizations")]
    MonthlyGptOptimizations,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        use Capability::*;
        &[
            CanExportMd,
            CanExportJson,
            CanExportPdf,
            CanExportBundleZip,
            CanUseGptTestReal,
            CanUseAllModules,
            HasApi,
            HasCloudHistory,
            HasEvaluatorAi,
            HasWhiteLabel,
            HasSeatsGt1,
            HasExportDesigner,
            HasFinTechPack,
            HasEduPack,
            HasIndustryTemplates,
            MaxRunsPerDay,
            MaxTokensPerRun,
            MaxSeats,
            MonthlyGptOptimizations,
        ]
    }

    pub fn key(self) -> &'static str {
        use Capability::*;
        match self {
            CanExportMd => "canExportMD",
            CanExportJson => "canExportJSON",
            CanExportPdf => "canExportPDF",
            CanExportBundleZip => "canExportBundleZip",
            CanUseGptTestReal => "canUseGptTestReal",
            CanUseAllModules => "canUseAllModules",
            HasApi => "hasAPI",
            HasCloudHistory => "hasCloudHistory",
            HasEvaluatorAi => "hasEvaluatorAI",
            HasWhiteLabel => "hasWhiteLabel",
            HasSeatsGt1 => "hasSeatsGT1",
            HasExportDesigner => "hasExportDesigner",
            HasFinTechPack => "hasFinTechPack",
            HasEduPack => "hasEduPack",
            HasIndustryTemplates => "hasIndustryTemplates",
            MaxRunsPerDay => "maxRunsPerDay",
            MaxTokensPerRun => "maxTokensPerRun",
            MaxSeats => "maxSeats",
            MonthlyGptOptimizations => "monthlyGptOptimizations",
        }
    }

    pub fn from_key(key: &str) -> Option<Capability> {
        Capability::all().iter().copied().find(|c| c.key() == key)
    }

    pub fn kind(self) -> CapabilityKind {
        use Capability::*;
        match self {
            MaxRunsPerDay | MaxTokensPerRun | MaxSeats | MonthlyGptOptimizations => {
                CapabilityKind::Quota
            }
            _ => CapabilityKind::Flag,
        }
    }

    /// Lowest plan whose defaults switch this flag on. Quotas are non-zero on
    /// every plan that grants them, so for those this is the first plan that
    /// raises the limit above the free tier.
    pub fn included_from(self) -> PlanCode {
        use Capability::*;
        match self {
            CanExportMd => PlanCode::Free,
            CanExportJson | CanUseAllModules | HasCloudHistory => PlanCode::Creator,
            CanExportPdf | CanUseGptTestReal | HasEvaluatorAi | HasExportDesigner => PlanCode::Pro,
            HasApi | CanExportBundleZip | HasWhiteLabel | HasSeatsGt1 | HasFinTechPack
            | HasEduPack | HasIndustryTemplates => PlanCode::Enterprise,
            MaxRunsPerDay | MaxTokensPerRun | MonthlyGptOptimizations => PlanCode::Creator,
            MaxSeats => PlanCode::Enterprise,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Capability {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::from_key(s).ok_or_else(|| ForgeError::UnknownCapability(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// EntitlementValue
// ---------------------------------------------------------------------------

pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntitlementValue {
    Bool(bool),
    Quota(i64),
}

impl EntitlementValue {
    /// The value that grants nothing for a capability of `kind`.
    pub fn denied(kind: CapabilityKind) -> Self {
        match kind {
            CapabilityKind::Flag => EntitlementValue::Bool(false),
            CapabilityKind::Quota => EntitlementValue::Quota(0),
        }
    }

    pub fn kind(self) -> CapabilityKind {
        match self {
            EntitlementValue::Bool(_) => CapabilityKind::Flag,
            EntitlementValue::Quota(_) => CapabilityKind::Quota,
        }
    }

    pub fn is_usable(self) -> bool {
        match self {
            EntitlementValue::Bool(b) => b,
            EntitlementValue::Quota(n) => n != 0,
        }
    }

    /// Negative quotas other than [`UNLIMITED`] grant nothing.
    fn clamped(self) -> Self {
        match self {
            EntitlementValue::Quota(n) if n < UNLIMITED => {
                tracing::warn!(quota = n, "negative quota treated as 0");
                EntitlementValue::Quota(0)
            }
            other => other,
        }
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(EntitlementValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(EntitlementValue::Quota),
            _ => None,
        }
    }
}

/// Units left under `limit` after `used`. `None` means unlimited.
pub fn remaining(limit: i64, used: u64) -> Option<u64> {
    if limit == UNLIMITED {
        return None;
    }
    Some((limit.max(0) as u64).saturating_sub(used))
}

// ---------------------------------------------------------------------------
// Plan defaults
// ---------------------------------------------------------------------------

struct PlanQuotas {
    runs_per_day: i64,
    tokens_per_run: i64,
    seats: i64,
    gpt_optimizations: i64,
}

const fn quotas(plan: PlanCode) -> PlanQuotas {
    match plan {
        PlanCode::Free => PlanQuotas {
            runs_per_day: 10,
            tokens_per_run: 1000,
            seats: 1,
            gpt_optimizations: 0,
        },
        PlanCode::Creator => PlanQuotas {
            runs_per_day: 50,
            tokens_per_run: 2500,
            seats: 1,
            gpt_optimizations: 25,
        },
        PlanCode::Pro => PlanQuotas {
            runs_per_day: 100,
            tokens_per_run: 5000,
            seats: 1,
            gpt_optimizations: 150,
        },
        PlanCode::Enterprise => PlanQuotas {
            runs_per_day: 1000,
            tokens_per_run: 10000,
            seats: UNLIMITED,
            gpt_optimizations: UNLIMITED,
        },
    }
}

pub fn plan_default(plan: PlanCode, capability: Capability) -> EntitlementValue {
    let q = quotas(plan);
    match capability {
        Capability::MaxRunsPerDay => EntitlementValue::Quota(q.runs_per_day),
        Capability::MaxTokensPerRun => EntitlementValue::Quota(q.tokens_per_run),
        Capability::MaxSeats => EntitlementValue::Quota(q.seats),
        Capability::MonthlyGptOptimizations => EntitlementValue::Quota(q.gpt_optimizations),
        flag => EntitlementValue::Bool(plan >= flag.included_from()),
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSource {
    Plan,
    Addon,
    Trial,
}

/// Org-specific row layered over the plan defaults (add-ons, trials,
/// hand-granted flags).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementOverride {
    pub capability: Capability,
    pub value: EntitlementValue,
    pub source: OverrideSource,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EntitlementOverride {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// ---------------------------------------------------------------------------
// EntitlementSet
// ---------------------------------------------------------------------------

/// Total map from every [`Capability`] to its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EntitlementSet {
    values: BTreeMap<Capability, EntitlementValue>,
}

impl EntitlementSet {
    pub fn for_plan(plan: PlanCode) -> Self {
        let values = Capability::all()
            .iter()
            .map(|c| (*c, plan_default(plan, *c)))
            .collect();
        Self { values }
    }

    /// Built-in fallback used whenever entitlements cannot be resolved.
    pub fn most_restrictive() -> Self {
        Self::for_plan(PlanCode::Free)
    }

    /// Build a set from a fetched payload. Keys the payload omits, or whose
    /// value has the wrong type, resolve to the denied value. Unknown keys
    /// are ignored.
    pub fn from_payload(payload: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut values = BTreeMap::new();
        for capability in Capability::all() {
            let kind = capability.kind();
            let value = match payload.get(capability.key()).map(EntitlementValue::from_json) {
                Some(Some(v)) if v.kind() == kind => v.clamped(),
                Some(_) => {
                    tracing::debug!(key = capability.key(), "ignoring entitlement with wrong type");
                    EntitlementValue::denied(kind)
                }
                None => EntitlementValue::denied(kind),
            };
            values.insert(*capability, value);
        }
        for key in payload.keys() {
            if Capability::from_key(key).is_none() {
                tracing::debug!(key = %key, "ignoring unknown entitlement key");
            }
        }
        Self { values }
    }

    /// Layer live overrides on top. Expired rows and rows whose value kind
    /// does not match the capability are skipped; later rows win.
    pub fn apply_overrides(&mut self, overrides: &[EntitlementOverride], now: DateTime<Utc>) {
        for o in overrides {
            if o.is_expired(now) {
                continue;
            }
            if o.value.kind() != o.capability.kind() {
                tracing::warn!(
                    capability = o.capability.key(),
                    "override value type does not match capability, skipping"
                );
                continue;
            }
            self.values.insert(o.capability, o.value.clamped());
        }
    }

    pub fn get(&self, capability: Capability) -> EntitlementValue {
        self.values
            .get(&capability)
            .copied()
            .unwrap_or_else(|| EntitlementValue::denied(capability.kind()))
    }

    pub fn flag(&self, capability: Capability) -> bool {
        self.get(capability).is_usable()
    }

    /// Quota ceiling, or 0 when asked about a flag.
    pub fn quota(&self, capability: Capability) -> i64 {
        match self.get(capability) {
            EntitlementValue::Quota(n) => n,
            EntitlementValue::Bool(_) => 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, EntitlementValue)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }
}

impl Default for EntitlementSet {
    fn default() -> Self {
        Self::most_restrictive()
    }
}

impl<'de> Deserialize<'de> for EntitlementSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(EntitlementSet::from_payload(&payload))
    }
}

/// Whether `key` names a capability the set grants. Unknown keys are never
/// granted; quotas count as granted when non-zero.
pub fn can_use_feature(set: &EntitlementSet, key: &str) -> bool {
    match Capability::from_key(key) {
        Some(capability) => set.get(capability).is_usable(),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn payload(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn capability_keys_round_trip() {
        for c in Capability::all() {
            assert_eq!(Capability::from_key(c.key()), Some(*c));
            assert_eq!(c.key().parse::<Capability>().unwrap(), *c);
        }
        assert!(matches!(
            "canFly".parse::<Capability>(),
            Err(ForgeError::UnknownCapability(_))
        ));
    }

    #[test]
    fn every_plan_default_matches_capability_kind() {
        for plan in PlanCode::all() {
            for c in Capability::all() {
                assert_eq!(plan_default(*plan, *c).kind(), c.kind(), "{plan} {c}");
            }
        }
    }

    #[test]
    fn plan_flags_are_monotonic() {
        for pair in PlanCode::all().windows(2) {
            let lower = EntitlementSet::for_plan(pair[0]);
            let higher = EntitlementSet::for_plan(pair[1]);
            for c in Capability::all().iter().filter(|c| c.kind() == CapabilityKind::Flag) {
                assert!(!lower.flag(*c) || higher.flag(*c), "{c} lost on {}", pair[1]);
            }
        }
    }

    #[test]
    fn free_plan_defaults() {
        let set = EntitlementSet::most_restrictive();
        assert!(set.flag(Capability::CanExportMd));
        assert!(!set.flag(Capability::CanExportJson));
        assert!(!set.flag(Capability::HasApi));
        assert_eq!(set.quota(Capability::MaxRunsPerDay), 10);
        assert_eq!(set.quota(Capability::MonthlyGptOptimizations), 0);
    }

    #[test]
    fn enterprise_has_unlimited_seats() {
        let set = EntitlementSet::for_plan(PlanCode::Enterprise);
        assert_eq!(set.quota(Capability::MaxSeats), UNLIMITED);
        assert!(set.flag(Capability::HasWhiteLabel));
        assert!(can_use_feature(&set, "maxSeats"));
    }

    #[test]
    fn missing_payload_keys_are_denied() {
        let set = EntitlementSet::from_payload(&payload(json!({ "canExportPDF": true })));
        assert!(can_use_feature(&set, "canExportPDF"));
        for c in Capability::all().iter().filter(|c| **c != Capability::CanExportPdf) {
            assert!(!can_use_feature(&set, c.key()), "{c} should be denied");
        }
    }

    #[test]
    fn payload_ignores_unknown_keys_and_wrong_types() {
        let set = EntitlementSet::from_payload(&payload(json!({
            "hasTeleport": true,
            "hasAPI": 1,
            "maxRunsPerDay": "lots",
            "maxSeats": 4
        })));
        assert!(!set.flag(Capability::HasApi));
        assert_eq!(set.quota(Capability::MaxRunsPerDay), 0);
        assert_eq!(set.quota(Capability::MaxSeats), 4);
        assert!(!can_use_feature(&set, "hasTeleport"));
    }

    #[test]
    fn set_deserializes_through_payload_rules() {
        let set: EntitlementSet =
            serde_json::from_value(json!({ "canExportJSON": true, "maxRunsPerDay": -1 })).unwrap();
        assert!(set.flag(Capability::CanExportJson));
        assert_eq!(set.quota(Capability::MaxRunsPerDay), UNLIMITED);
        assert!(!set.flag(Capability::CanExportMd));
    }

    #[test]
    fn set_serializes_with_wire_keys() {
        let v = serde_json::to_value(EntitlementSet::for_plan(PlanCode::Pro)).unwrap();
        assert_eq!(v["canExportPDF"], json!(true));
        assert_eq!(v["maxRunsPerDay"], json!(100));
        assert_eq!(v.as_object().unwrap().len(), Capability::all().len());
    }

    #[test]
    fn can_use_feature_is_idempotent() {
        let set = EntitlementSet::for_plan(PlanCode::Creator);
        for c in Capability::all() {
            assert_eq!(can_use_feature(&set, c.key()), can_use_feature(&set, c.key()));
        }
        let before = set.clone();
        let _ = can_use_feature(&set, "canExportJSON");
        assert_eq!(set, before);
    }

    #[test]
    fn overrides_apply_unless_expired_or_mistyped() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut set = EntitlementSet::for_plan(PlanCode::Free);
        set.apply_overrides(
            &[
                EntitlementOverride {
                    capability: Capability::HasFinTechPack,
                    value: EntitlementValue::Bool(true),
                    source: OverrideSource::Addon,
                    expires_at: None,
                },
                EntitlementOverride {
                    capability: Capability::CanExportPdf,
                    value: EntitlementValue::Bool(true),
                    source: OverrideSource::Trial,
                    expires_at: Some(now - Duration::days(1)),
                },
                EntitlementOverride {
                    capability: Capability::MaxRunsPerDay,
                    value: EntitlementValue::Bool(true),
                    source: OverrideSource::Plan,
                    expires_at: None,
                },
            ],
            now,
        );
        assert!(set.flag(Capability::HasFinTechPack));
        assert!(!set.flag(Capability::CanExportPdf));
        assert_eq!(set.quota(Capability::MaxRunsPerDay), 10);
    }

    #[test]
    fn negative_quotas_other_than_unlimited_grant_nothing() {
        let mut set = EntitlementSet::from_payload(&payload(json!({
            "maxRunsPerDay": -5,
            "maxSeats": -1
        })));
        assert_eq!(set.quota(Capability::MaxRunsPerDay), 0);
        assert_eq!(set.quota(Capability::MaxSeats), UNLIMITED);

        set.apply_overrides(
            &[EntitlementOverride {
                capability: Capability::MonthlyGptOptimizations,
                value: EntitlementValue::Quota(-20),
                source: OverrideSource::Addon,
                expires_at: None,
            }],
            Utc::now(),
        );
        assert_eq!(set.quota(Capability::MonthlyGptOptimizations), 0);
        assert!(!can_use_feature(&set, "monthlyGptOptimizations"));
    }

    #[test]
    fn remaining_handles_unlimited_and_overuse() {
        assert_eq!(remaining(UNLIMITED, 500), None);
        assert_eq!(remaining(10, 3), Some(7));
        assert_eq!(remaining(10, 12), Some(0));
    }
}
