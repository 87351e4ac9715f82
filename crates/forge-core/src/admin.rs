use crate::backend::MemberRole;
use crate::error::{ForgeError, Result};
use crate::paths;
use crate::plan::PlanCode;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: MemberRole,
    pub status: MemberStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub key_preview: String,
    pub status: ApiKeyStatus,
    pub environment: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub rate_limit: u32,
    #[serde(default)]
    pub requests_today: u64,
    #[serde(default)]
    pub requests_this_hour: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Zero the hourly and daily counters when `now` falls in a later hour
    /// or day than the last recorded use.
    fn roll_windows(&mut self, now: DateTime<Utc>) {
        let Some(last) = self.last_used else {
            return;
        };
        if last.date_naive() != now.date_naive() {
            self.requests_today = 0;
            self.requests_this_hour = 0;
        } else if last.hour() != now.hour() {
            self.requests_this_hour = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Investigating,
    Monitoring,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    #[serde(rename = "type")]
    pub kind: String,
    pub affected_users: u32,
    #[serde(default)]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatOverview {
    pub plan: PlanCode,
    pub seats_included: u32,
    pub seats_used: u32,
    /// Whole dollars per seat per month.
    pub seat_price: u32,
    pub next_billing_date: NaiveDate,
}

impl SeatOverview {
    pub fn seats_available(&self) -> u32 {
        self.seats_included.saturating_sub(self.seats_used)
    }

    pub fn needs_more_seats(&self) -> bool {
        self.seats_available() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub uptime_pct: f64,
    pub error_budget_pct: f64,
    pub p95_latency_ms: u32,
    pub active_users: u32,
    pub incidents_7d: u32,
    pub sampled_at: DateTime<Utc>,
}

/// Everything the admin dashboards show, in one serializable bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSnapshot {
    pub members: Vec<Member>,
    pub api_keys: Vec<ApiKey>,
    pub incidents: Vec<Incident>,
    pub seats: SeatOverview,
    pub health: HealthMetrics,
}

// ---------------------------------------------------------------------------
// AdminDataSource
// ---------------------------------------------------------------------------

/// Read interface the admin dashboards render from.
pub trait AdminDataSource: Send + Sync {
    fn members(&self) -> Result<Vec<Member>>;
    fn api_keys(&self) -> Result<Vec<ApiKey>>;
    fn incidents(&self) -> Result<Vec<Incident>>;
    fn seat_overview(&self) -> Result<SeatOverview>;
    fn health(&self) -> Result<HealthMetrics>;
}

/// Case-insensitive match on key name or preview.
pub fn filter_api_keys<'a>(keys: &'a [ApiKey], term: &str) -> Vec<&'a ApiKey> {
    let term = term.to_lowercase();
    keys.iter()
        .filter(|k| {
            k.name.to_lowercase().contains(&term) || k.key_preview.to_lowercase().contains(&term)
        })
        .collect()
}

pub fn open_incidents(incidents: &[Incident]) -> usize {
    incidents
        .iter()
        .filter(|i| i.status != IncidentStatus::Resolved)
        .count()
}

// ---------------------------------------------------------------------------
// StaticAdminData
// ---------------------------------------------------------------------------

/// Demo data source. The dev server's refresh loops tick it to simulate
/// live usage and health samples.
#[derive(Debug)]
pub struct StaticAdminData {
    snapshot: RwLock<AdminSnapshot>,
}

impl StaticAdminData {
    pub fn new(snapshot: AdminSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Load `.promptforge/admin.yaml`, or fall back to the built-in demo data.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::admin_path(root);
        if !path.exists() {
            return Ok(Self::new(demo_snapshot(Utc::now())));
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Self::new(serde_yaml::from_str(&data)?))
    }

    fn read<T>(&self, f: impl FnOnce(&AdminSnapshot) -> T) -> Result<T> {
        let snap = self
            .snapshot
            .read()
            .map_err(|_| ForgeError::Backend("admin snapshot lock poisoned".into()))?;
        Ok(f(&snap))
    }

    fn write(&self, f: impl FnOnce(&mut AdminSnapshot)) -> Result<()> {
        let mut snap = self
            .snapshot
            .write()
            .map_err(|_| ForgeError::Backend("admin snapshot lock poisoned".into()))?;
        f(&mut snap);
        Ok(())
    }

    /// Simulated usage for active keys. Deterministic in `tick` so the demo
    /// is reproducible.
    pub fn tick_api_usage(&self, tick: u64, now: DateTime<Utc>) -> Result<()> {
        self.write(|snap| {
            for (i, key) in snap.api_keys.iter_mut().enumerate() {
                if key.status != ApiKeyStatus::Active {
                    continue;
                }
                let delta = (tick + i as u64) % 5;
                if delta == 0 {
                    continue;
                }
                key.roll_windows(now);
                key.requests_this_hour += delta;
                key.requests_today += delta;
                key.last_used = Some(now);
            }
        })
    }

    pub fn tick_health(&self, tick: u64, now: DateTime<Utc>) -> Result<()> {
        self.write(|snap| {
            let h = &mut snap.health;
            h.p95_latency_ms = 180 + (tick % 7) as u32 * 10;
            h.active_users = 120 + (tick % 11) as u32;
            h.sampled_at = now;
        })
    }
}

impl AdminDataSource for StaticAdminData {
    fn members(&self) -> Result<Vec<Member>> {
        self.read(|s| s.members.clone())
    }

    fn api_keys(&self) -> Result<Vec<ApiKey>> {
        self.read(|s| s.api_keys.clone())
    }

    fn incidents(&self) -> Result<Vec<Incident>> {
        self.read(|s| s.incidents.clone())
    }

    fn seat_overview(&self) -> Result<SeatOverview> {
        self.read(|s| s.seats.clone())
    }

    fn health(&self) -> Result<HealthMetrics> {
        self.read(|s| s.health.clone())
    }
}

pub fn demo_snapshot(now: DateTime<Utc>) -> AdminSnapshot {
    let member = |id: &str, email: &str, name: &str, role, status| Member {
        id: id.into(),
        email: email.into(),
        full_name: name.into(),
        role,
        status,
    };
    let key = |id: &str, name: &str, preview: &str, status, env: &str, rate_limit, today| ApiKey {
        id: id.into(),
        name: name.into(),
        key_preview: preview.into(),
        status,
        environment: env.into(),
        scopes: vec!["read".into(), "write".into()],
        rate_limit,
        requests_today: today,
        requests_this_hour: today / 12,
        last_used: None,
    };

    AdminSnapshot {
        members: vec![
            member("mem_1", "owner@example.com", "Ana Popescu", MemberRole::Owner, MemberStatus::Active),
            member("mem_2", "admin@example.com", "Mihai Ionescu", MemberRole::Admin, MemberStatus::Active),
            member("mem_3", "dev@example.com", "Elena Radu", MemberRole::Member, MemberStatus::Pending),
        ],
        api_keys: vec![
            key("key_1", "Production API", "pk_live_...a1b2", ApiKeyStatus::Active, "production", 1000, 2847),
            key("key_2", "Staging Tests", "pk_test_...c3d4", ApiKeyStatus::Active, "staging", 500, 156),
            key("key_3", "Legacy Integration", "pk_live_...e5f6", ApiKeyStatus::Revoked, "production", 100, 0),
        ],
        incidents: vec![
            Incident {
                id: "inc_1".into(),
                title: "Elevated checkout latency".into(),
                severity: Severity::High,
                status: IncidentStatus::Investigating,
                kind: "performance".into(),
                affected_users: 142,
                assignee: Some("Mihai Ionescu".into()),
            },
            Incident {
                id: "inc_2".into(),
                title: "Webhook retries from payment provider".into(),
                severity: Severity::Medium,
                status: IncidentStatus::Resolved,
                kind: "integration".into(),
                affected_users: 12,
                assignee: None,
            },
        ],
        seats: SeatOverview {
            plan: PlanCode::Pro,
            seats_included: 5,
            seats_used: 3,
            seat_price: 25,
            next_billing_date: now.date_naive() + chrono::Duration::days(30),
        },
        health: HealthMetrics {
            uptime_pct: 99.97,
            error_budget_pct: 85.2,
            p95_latency_ms: 180,
            active_users: 120,
            incidents_7d: 2,
            sampled_at: now,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
