//! Local permission policy.
//!
//! Consulted before a permission request goes out to the client. A policy
//! that returns an outcome answers the request locally and no round trip
//! happens.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use tracing::{info, info_span, warn};

use crate::protocol::client::{
    PermissionOptionKind, RequestPermissionOutcome, RequestPermissionRequest,
};

/// Decides permission requests without asking the client.
pub trait PermissionPolicy: Send + Sync {
    /// A decision for `request`, or `None` to ask the client.
    fn evaluate(&self, request: &RequestPermissionRequest) -> Option<RequestPermissionOutcome>;

    /// Record the client's decision for `request`.
    fn remember(&self, request: &RequestPermissionRequest, outcome: &RequestPermissionOutcome);

    /// Forget everything remembered.
    fn clear(&self);
}

/// Static allow / deny glob rules matched against the tool call title.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionRules {
    /// Titles granted without asking.
    pub allow: Vec<String>,
    /// Titles rejected without asking; checked before `allow`.
    pub deny: Vec<String>,
}

/// Policy applying [`PermissionRules`] and remembering `*_always` decisions
/// per tool title.
#[derive(Debug, Default)]
pub struct RememberingPolicy {
    rules: PermissionRules,
    remembered: Mutex<HashMap<String, bool>>,
}

fn title_of(request: &RequestPermissionRequest) -> &str {
    request
        .tool_call
        .title
        .as_deref()
        .unwrap_or(&request.tool_call.tool_call_id)
}

/// Pick the offered option of `kind`, falling back to its canonical id.
fn option_for(request: &RequestPermissionRequest, kind: PermissionOptionKind) -> RequestPermissionOutcome {
    let id = request
        .options
        .iter()
        .find(|option| option.kind == kind)
        .map_or_else(
            || {
                match kind {
                    PermissionOptionKind::AllowOnce => "allow_once",
                    PermissionOptionKind::AllowAlways => "allow_always",
                    PermissionOptionKind::RejectOnce => "reject_once",
                    PermissionOptionKind::RejectAlways => "reject_always",
                }
                .to_owned()
            },
            |option| option.option_id.clone(),
        );
    RequestPermissionOutcome::selected(id)
}

fn any_match(patterns: &[String], title: &str) -> Option<String> {
    for pattern in patterns {
        match glob::Pattern::new(pattern) {
            Ok(glob_pat) => {
                if glob_pat.matches(title) {
                    return Some(pattern.clone());
                }
            }
            Err(err) => {
                warn!(pattern = %pattern, %err, "invalid glob pattern in permission rules, skipping");
            }
        }
    }
    None
}

impl RememberingPolicy {
    /// Policy with `rules` and nothing remembered.
    #[must_use]
    pub fn new(rules: PermissionRules) -> Self {
        Self {
            rules,
            remembered: Mutex::new(HashMap::new()),
        }
    }

    /// Number of remembered decisions.
    #[must_use]
    pub fn remembered_count(&self) -> usize {
        self.remembered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PermissionPolicy for RememberingPolicy {
    fn evaluate(&self, request: &RequestPermissionRequest) -> Option<RequestPermissionOutcome> {
        let title = title_of(request);
        let _span = info_span!("permission_evaluate", title = %title).entered();

        // ── 1. Deny rules ────────────────────────────────────
        if let Some(rule) = any_match(&self.rules.deny, title) {
            info!(matched_rule = %rule, "rejected via deny rule");
            return Some(option_for(request, PermissionOptionKind::RejectOnce));
        }

        // ── 2. Allow rules ───────────────────────────────────
        if let Some(rule) = any_match(&self.rules.allow, title) {
            info!(matched_rule = %rule, "allowed via allow rule");
            return Some(option_for(request, PermissionOptionKind::AllowOnce));
        }

        // ── 3. Remembered decisions ──────────────────────────
        let remembered = self
            .remembered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(title)
            .copied()?;
        info!(allowed = remembered, "answered from remembered decision");
        Some(if remembered {
            option_for(request, PermissionOptionKind::AllowAlways)
        } else {
            option_for(request, PermissionOptionKind::RejectAlways)
        })
    }

    fn remember(&self, request: &RequestPermissionRequest, outcome: &RequestPermissionOutcome) {
        let RequestPermissionOutcome::Selected { option_id } = outcome else {
            return;
        };
        let kind = request
            .options
            .iter()
            .find(|option| &option.option_id == option_id)
            .map(|option| option.kind);
        let allowed = match kind {
            Some(PermissionOptionKind::AllowAlways) => true,
            Some(PermissionOptionKind::RejectAlways) => false,
            _ => return,
        };
        self.remembered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(title_of(request).to_owned(), allowed);
    }

    fn clear(&self) {
        self.remembered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
