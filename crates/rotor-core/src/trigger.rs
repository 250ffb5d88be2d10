//! Traffic-usage trigger evaluation
//!
//! Compares a window's accumulated traffic against the trigger's limit
//! and fires at most once per (trigger, period identifier). The period
//! identifier comes from the agent, so clock skew between engine and
//! host cannot double-fire a trigger.

use crate::config::{Trigger, Window};
use crate::traits::traffic_agent::UsageTotals;

const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// A limit breach the engine should surface to the operator
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub trigger_id: String,
    pub label: String,
    pub window: Window,
    /// Period identifier the alert belongs to; persisted so the trigger
    /// cannot fire again within it
    pub period: String,
    pub used_gb: f64,
    pub limit_gb: f64,
}

/// Evaluate one trigger against fresh agent totals.
///
/// Returns an alert when the window's total exceeds the limit and the
/// current period differs from the one that last fired.
pub fn check(trigger: &Trigger, totals: &UsageTotals, last_period: Option<&str>) -> Option<Alert> {
    let (bytes, period) = match trigger.window {
        Window::Daily => (totals.rx_bytes_today, totals.period_day.as_str()),
        Window::Weekly => (totals.rx_bytes_this_week, totals.period_week.as_str()),
        Window::Monthly => (totals.rx_bytes_this_month, totals.period_month.as_str()),
    };

    if last_period == Some(period) {
        return None;
    }

    let used_gb = bytes as f64 / BYTES_PER_GB;
    if used_gb <= trigger.limit_gb {
        return None;
    }

    Some(Alert {
        trigger_id: trigger.id.clone(),
        label: trigger.label.clone(),
        window: trigger.window,
        period: period.to_string(),
        used_gb,
        limit_gb: trigger.limit_gb,
    })
}
