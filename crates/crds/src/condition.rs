//! Tri-state scan conditions.
//!
//! Progress through a scan's lifecycle is recorded as a fixed set of named
//! tri-state flags. The set of names is closed (an enum, not free-form
//! strings) and every transition goes through the typed methods on
//! [`Conditions`]. On the wire each condition serializes as the usual
//! Kubernetes `{type, status, message, lastUpdateTime}` shape.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The closed set of condition names a ClusterScan can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ScanConditionType {
    /// A runner job has been created for the current run.
    Created,
    /// The scan is waiting to be launched.
    Pending,
    /// The runner finished executing checks (result not yet persisted).
    RunCompleted,
    /// The run is fully processed: report persisted, children cleaned up.
    Complete,
    /// The run failed; the message carries the reason.
    Failed,
    /// Telemetry for the completed run has been emitted.
    Alerted,
    /// A retryable launch step is in progress.
    Reconciling,
    /// The scan made no progress for an extended period.
    Stalled,
}

/// Tri-state value of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition definitively does not hold.
    False,
    /// Condition is not yet decided.
    #[default]
    Unknown,
}

/// One recorded condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanCondition {
    /// Which lifecycle aspect this condition records.
    #[serde(rename = "type")]
    pub condition_type: ScanConditionType,
    /// Current tri-state value.
    pub status: ConditionStatus,
    /// Human-readable detail, set on failures and waits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the status or message last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

/// Enum-keyed condition set with typed accessors and transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Conditions(Vec<ScanCondition>);

impl Conditions {
    /// Looks up a condition by type.
    pub fn get(&self, t: ScanConditionType) -> Option<&ScanCondition> {
        self.0.iter().find(|c| c.condition_type == t)
    }

    /// Returns the tri-state value of a condition, if recorded.
    pub fn status(&self, t: ScanConditionType) -> Option<ConditionStatus> {
        self.get(t).map(|c| c.status)
    }

    /// True iff the condition is recorded with status True.
    pub fn is_true(&self, t: ScanConditionType) -> bool {
        self.status(t) == Some(ConditionStatus::True)
    }

    /// True iff the condition is recorded with status False.
    pub fn is_false(&self, t: ScanConditionType) -> bool {
        self.status(t) == Some(ConditionStatus::False)
    }

    /// True iff the condition is recorded with status Unknown.
    pub fn is_unknown(&self, t: ScanConditionType) -> bool {
        self.status(t) == Some(ConditionStatus::Unknown)
    }

    /// Message attached to a condition, if any.
    pub fn message(&self, t: ScanConditionType) -> Option<&str> {
        self.get(t).and_then(|c| c.message.as_deref())
    }

    /// Upserts a condition with the given status, dropping any prior message.
    pub fn set(&mut self, t: ScanConditionType, status: ConditionStatus) {
        self.upsert(t, status, None);
    }

    /// Upserts a condition with the given status and message.
    pub fn set_with_message(
        &mut self,
        t: ScanConditionType,
        status: ConditionStatus,
        message: impl Into<String>,
    ) {
        self.upsert(t, status, Some(message.into()));
    }

    /// Removes a condition entirely.
    pub fn remove(&mut self, t: ScanConditionType) {
        self.0.retain(|c| c.condition_type != t);
    }

    /// Drops every recorded condition. Used by the atomic reschedule reset.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// True when no condition is recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn upsert(&mut self, t: ScanConditionType, status: ConditionStatus, message: Option<String>) {
        let now = Utc::now();
        if let Some(existing) = self.0.iter_mut().find(|c| c.condition_type == t) {
            existing.status = status;
            existing.message = message;
            existing.last_update_time = Some(now);
        } else {
            self.0.push(ScanCondition {
                condition_type: t,
                status,
                message,
                last_update_time: Some(now),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_condition_reads_as_neither_true_nor_false() {
        let conds = Conditions::default();
        assert!(!conds.is_true(ScanConditionType::Created));
        assert!(!conds.is_false(ScanConditionType::Created));
        assert!(!conds.is_unknown(ScanConditionType::Created));
        assert_eq!(conds.status(ScanConditionType::Created), None);
    }

    #[test]
    fn set_upserts_and_transitions() {
        let mut conds = Conditions::default();
        conds.set(ScanConditionType::Pending, ConditionStatus::True);
        assert!(conds.is_true(ScanConditionType::Pending));

        conds.set_with_message(
            ScanConditionType::RunCompleted,
            ConditionStatus::Unknown,
            "creating runner job",
        );
        assert!(conds.is_unknown(ScanConditionType::RunCompleted));
        assert_eq!(
            conds.message(ScanConditionType::RunCompleted),
            Some("creating runner job")
        );

        // transition replaces status and message in place
        conds.set(ScanConditionType::RunCompleted, ConditionStatus::True);
        assert!(conds.is_true(ScanConditionType::RunCompleted));
        assert_eq!(conds.message(ScanConditionType::RunCompleted), None);
    }

    #[test]
    fn clear_drops_all_conditions() {
        let mut conds = Conditions::default();
        conds.set(ScanConditionType::Created, ConditionStatus::True);
        conds.set(ScanConditionType::Complete, ConditionStatus::True);
        conds.clear();
        assert!(conds.is_empty());
    }

    #[test]
    fn wire_shape_matches_kubernetes_conventions() {
        let mut conds = Conditions::default();
        conds.set_with_message(
            ScanConditionType::Failed,
            ConditionStatus::True,
            "bad profile",
        );
        let json = serde_json::to_value(&conds).unwrap();
        let cond = &json[0];
        assert_eq!(cond["type"], "Failed");
        assert_eq!(cond["status"], "True");
        assert_eq!(cond["message"], "bad profile");
        assert!(cond["lastUpdateTime"].is_string());
    }
}
