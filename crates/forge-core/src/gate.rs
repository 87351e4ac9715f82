use crate::cancel::CancelToken;
use crate::entitlements::{Capability, EntitlementSet};
use crate::error::{ForgeError, Result};
use crate::manager::EntitlementsManager;
use crate::paywall::{recommended_plan, PaywallPrompt};
use crate::plan::PlanCode;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorPolicy / GateMode
// ---------------------------------------------------------------------------

/// What a gate shows when the entitlement fetch itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Render the children with a warning annotation.
    #[default]
    FailOpen,
    /// Treat the failure as a denial.
    FailClosed,
}

impl ErrorPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorPolicy::FailOpen => "fail-open",
            ErrorPolicy::FailClosed => "fail-closed",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorPolicy {
    type Err = ForgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fail-open" => Ok(ErrorPolicy::FailOpen),
            "fail-closed" => Ok(ErrorPolicy::FailClosed),
            _ => Err(ForgeError::UnknownErrorPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    #[default]
    Modal,
    Inline,
    Replace,
}

impl GateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GateMode::Modal => "modal",
            GateMode::Inline => "inline",
            GateMode::Replace => "replace",
        }
    }
}

impl fmt::Display for GateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GateMode {
    type Err = ForgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "modal" => Ok(GateMode::Modal),
            "inline" => Ok(GateMode::Inline),
            "replace" => Ok(GateMode::Replace),
            _ => Err(ForgeError::UnknownGateMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// GateState / GateView
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Loading,
    Granted,
    Denied,
    Error(String),
}

/// What the gate wants drawn. Borrowed from the gate; recompute after
/// every transition.
#[derive(Debug, PartialEq)]
pub enum GateView<'a, C> {
    Skeleton,
    Children(&'a C),
    ChildrenWithWarning { children: &'a C, warning: String },
    /// Children act as the click target; `modal` is only populated once the
    /// user has opened it.
    ModalTrigger {
        children: &'a C,
        modal: Option<PaywallPrompt>,
    },
    InlineUpsell(PaywallPrompt),
    Fallback(&'a C),
    LockedPlaceholder {
        capability: Capability,
        required_plan: PlanCode,
    },
}

/// Handle for one fetch issued by [`EntitlementGate::mount`] or
/// [`EntitlementGate::refetch`].
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    token: CancelToken,
}

impl FetchTicket {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

// ---------------------------------------------------------------------------
// EntitlementGate
// ---------------------------------------------------------------------------

/// Gating wrapper around arbitrary content `C`.
///
/// Lifecycle: `mount` issues a fetch ticket, the owner runs the fetch and
/// hands the outcome to `resolve`. `unmount` cancels the ticket so a late
/// result is discarded; `refetch` starts over with a fresh one.
#[derive(Debug)]
pub struct EntitlementGate<C> {
    capability: Capability,
    mode: GateMode,
    policy: ErrorPolicy,
    children: C,
    fallback: Option<C>,
    trigger: Option<String>,
    state: GateState,
    modal_open: bool,
    generation: u64,
    token: Option<CancelToken>,
}

impl<C> EntitlementGate<C> {
    pub fn new(capability: Capability, mode: GateMode, children: C) -> Self {
        Self {
            capability,
            mode,
            policy: ErrorPolicy::default(),
            children,
            fallback: None,
            trigger: None,
            state: GateState::Loading,
            modal_open: false,
            generation: 0,
            token: None,
        }
    }

    pub fn with_fallback(mut self, fallback: C) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_modal_open(&self) -> bool {
        self.modal_open
    }

    pub fn is_mounted(&self) -> bool {
        self.token.is_some()
    }

    pub fn mount(&mut self) -> FetchTicket {
        if let Some(old) = self.token.take() {
            old.cancel();
        }
        let token = CancelToken::new();
        self.generation += 1;
        self.state = GateState::Loading;
        self.modal_open = false;
        self.token = Some(token.clone());
        FetchTicket {
            generation: self.generation,
            token,
        }
    }

    /// Apply a fetch outcome. Returns `false` when the result was discarded
    /// because the ticket is stale, cancelled, or the gate is unmounted.
    pub fn resolve(&mut self, ticket: &FetchTicket, result: Result<EntitlementSet>) -> bool {
        if !self.is_mounted() || ticket.generation != self.generation || ticket.token.is_cancelled() {
            tracing::debug!(capability = %self.capability, "discarding stale entitlement result");
            return false;
        }
        self.state = match result {
            Ok(set) if set.get(self.capability).is_usable() => GateState::Granted,
            Ok(_) => GateState::Denied,
            Err(ForgeError::Cancelled) => return false,
            Err(e) => {
                tracing::warn!(capability = %self.capability, error = %e, policy = %self.policy, "entitlement check failed");
                GateState::Error(e.to_string())
            }
        };
        true
    }

    pub fn unmount(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.modal_open = false;
    }

    /// Back to `Loading` with a fresh ticket, e.g. after returning from a
    /// successful checkout.
    pub fn refetch(&mut self) -> FetchTicket {
        self.mount()
    }

    /// Mount and resolve synchronously against `manager`.
    pub fn load_with(&mut self, manager: &EntitlementsManager, user_id: &str, org_id: &str) -> bool {
        let ticket = self.mount();
        let result = manager
            .fetch(user_id, org_id, ticket.token())
            .map(|r| r.entitlements);
        self.resolve(&ticket, result)
    }

    fn is_blocked(&self) -> bool {
        match self.state {
            GateState::Denied => true,
            GateState::Error(_) => self.policy == ErrorPolicy::FailClosed,
            _ => false,
        }
    }

    /// Click on the children. Only opens the paywall for a blocked modal
    /// gate; returns whether it did.
    pub fn click(&mut self) -> bool {
        if self.mode == GateMode::Modal && self.is_blocked() {
            self.modal_open = true;
            return true;
        }
        false
    }

    pub fn close_modal(&mut self) {
        self.modal_open = false;
    }

    pub fn prompt(&self) -> PaywallPrompt {
        PaywallPrompt::for_capability(self.capability, self.trigger.as_deref())
    }

    pub fn render(&self) -> GateView<'_, C> {
        match &self.state {
            GateState::Loading => return GateView::Skeleton,
            GateState::Granted => return GateView::Children(&self.children),
            GateState::Error(e) if self.policy == ErrorPolicy::FailOpen => {
                return GateView::ChildrenWithWarning {
                    children: &self.children,
                    warning: format!("Could not verify access to {}: {e}", self.capability),
                };
            }
            _ => {}
        }

        match self.mode {
            GateMode::Modal => GateView::ModalTrigger {
                children: &self.children,
                modal: self.modal_open.then(|| self.prompt()),
            },
            GateMode::Inline => GateView::InlineUpsell(self.prompt()),
            GateMode::Replace => match &self.fallback {
                Some(fallback) => GateView::Fallback(fallback),
                None => GateView::LockedPlaceholder {
                    capability: self.capability,
                    required_plan: recommended_plan(self.capability),
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
