//! Dashboard aggregates.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Alert, Case, CaseStatus, Finding};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: CaseStatus,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonthCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_cases: usize,
    pub by_status: Vec<StatusCount>,
    pub cases_per_month: Vec<MonthCount>,
    pub findings: usize,
    pub alerts: Vec<Alert>,
}

/// Aggregate the dashboard figures. Every status appears, even at zero;
/// months are chronological; alerts are newest-first.
pub fn summarize(cases: &[Case], findings: &[Finding], alerts: &[Alert]) -> DashboardSummary {
    let by_status = CaseStatus::ALL
        .iter()
        .map(|&status| StatusCount {
            status,
            label: status.label(),
            count: cases.iter().filter(|c| c.status == status).count(),
        })
        .collect();

    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for case in cases {
        *months
            .entry(case.created_at.format("%Y-%m").to_string())
            .or_default() += 1;
    }

    let mut alerts = alerts.to_vec();
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    DashboardSummary {
        total_cases: cases.len(),
        by_status,
        cases_per_month: months
            .into_iter()
            .map(|(month, count)| MonthCount { month, count })
            .collect(),
        findings: findings.len(),
        alerts,
    }
}
