//! Cost analysis over the cost series of every worker.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use fleetwatch_core::stats::{ThirdsTrend, thirds_trend};
use fleetwatch_core::{Timeframe, WorkerName};

use crate::analysis::day_label;
use crate::entry::CostEntry;
use crate::summary::{CostSummary, per_request, summarize_costs};

const NEXT_MONTH_FACTOR: f64 = 1.1;
const NEXT_QUARTER_FACTOR: f64 = 3.5;
const SAVINGS_FACTOR: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    pub cost: f64,
    pub requests: u64,
    pub avg_cost_per_request: f64,
}

/// Cost summed per day (`YYYY-MM-DD`) and per UTC hour of day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub daily: BTreeMap<String, f64>,
    pub hourly: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub estimated: f64,
    pub confidence: Confidence,
    pub basis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub potential: f64,
    pub recommendations: Vec<String>,
}

/// Fixed-factor extrapolations of the window's total cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostProjections {
    pub next_month: Projection,
    pub next_quarter: Projection,
    pub savings: Savings,
}

impl CostProjections {
    pub fn from_total(cost: f64) -> Self {
        Self {
            next_month: Projection {
                estimated: cost * NEXT_MONTH_FACTOR,
                confidence: Confidence::Medium,
                basis: "historical_trend".to_string(),
            },
            next_quarter: Projection {
                estimated: cost * NEXT_QUARTER_FACTOR,
                confidence: Confidence::Low,
                basis: "linear_projection".to_string(),
            },
            savings: Savings {
                potential: cost * SAVINGS_FACTOR,
                recommendations: vec![
                    "Optimize request patterns".to_string(),
                    "Implement caching".to_string(),
                    "Review server configurations".to_string(),
                ],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub total: CostTotals,
    /// Workers with at least one cost entry in the window.
    pub by_worker: BTreeMap<WorkerName, CostSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<CostBreakdown>,
    /// Trend of individual costs across the window, in time order.
    pub trend: ThirdsTrend,
    pub projections: CostProjections,
}

/// Analyse the windowed cost entries of each worker.
pub fn cost_analysis(
    timeframe: Timeframe,
    now: DateTime<Utc>,
    windowed: &BTreeMap<WorkerName, Vec<CostEntry>>,
    include_breakdown: bool,
) -> CostAnalysis {
    let by_worker: BTreeMap<WorkerName, CostSummary> = windowed
        .iter()
        .filter(|(_, entries)| !entries.is_empty())
        .map(|(name, entries)| (name.clone(), summarize_costs(entries)))
        .collect();

    let cost: f64 = by_worker.values().map(|s| s.total_cost).sum();
    let requests: u64 = by_worker.values().map(|s| s.total_requests).sum();

    let mut all: Vec<&CostEntry> = windowed.values().flatten().collect();
    all.sort_by_key(|e| e.timestamp);
    let costs: Vec<f64> = all.iter().map(|e| e.cost()).collect();

    CostAnalysis {
        timeframe,
        timestamp: now,
        total: CostTotals {
            cost,
            requests,
            avg_cost_per_request: per_request(cost, requests),
        },
        by_worker,
        breakdown: include_breakdown.then(|| breakdown(&all)),
        trend: thirds_trend(&costs),
        projections: CostProjections::from_total(cost),
    }
}

fn breakdown(entries: &[&CostEntry]) -> CostBreakdown {
    let mut breakdown = CostBreakdown::default();
    for entry in entries {
        *breakdown.daily.entry(day_label(entry.timestamp)).or_default() += entry.cost();
        *breakdown.hourly.entry(entry.timestamp.hour()).or_default() += entry.cost();
    }
    breakdown
}
