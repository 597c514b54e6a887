//! Derived views over the bundle: latest-vs-prior performance and competitor context

use serde::Serialize;

use super::ReferenceDataBundle;
use crate::ingest::Record;

const FISCAL_QUARTER: &str = "FISCAL_QUARTER";
const FISCAL_YEAR: &str = "FISCAL_YEAR";
const PERIOD_END_DATE: &str = "PERIOD_END_DATE";
const PRODUCT_REVENUE: &str = "PRODUCT_REVENUE_M";
const TOTAL_REVENUE: &str = "TOTAL_REVENUE_M";
const RPO: &str = "RPO_M";
const NRR: &str = "NRR_PERCENT";
const CUSTOMERS_1M: &str = "CUSTOMERS_1M_PLUS";
const FCF: &str = "FCF_IN_MILLIONS";
const GROSS_MARGIN: &str = "GROSS_MARGIN_PERCENT";

/// One metric in the latest period and the comparison period
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricComparison {
    pub current: Option<f64>,
    pub prior: Option<f64>,
}

impl MetricComparison {
    fn read(latest: &Record, prior: &Record, column: &str) -> Self {
        Self {
            current: latest.number(column),
            prior: prior.number(column),
        }
    }

    /// Relative change in percent; `None` when either side is missing or prior is zero
    pub fn growth_pct(&self) -> Option<f64> {
        match (self.current, self.prior) {
            (Some(c), Some(p)) if p != 0.0 => Some((c / p - 1.0) * 100.0),
            _ => None,
        }
    }

    /// Absolute change, used for percentage metrics
    pub fn delta(&self) -> Option<f64> {
        Some(self.current? - self.prior?)
    }
}

/// Latest period vs the year-ago period, read from the first two target-metric rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub fiscal_quarter: String,
    pub fiscal_year: String,
    pub period_end: String,
    pub product_revenue_m: MetricComparison,
    pub total_revenue_m: MetricComparison,
    pub rpo_m: MetricComparison,
    pub nrr_percent: MetricComparison,
    pub customers_1m_plus: MetricComparison,
    pub fcf_m: MetricComparison,
    pub gross_margin_percent: MetricComparison,
}

impl PerformanceSnapshot {
    /// `None` when fewer than two periods are available
    pub fn from_bundle(bundle: &ReferenceDataBundle) -> Option<Self> {
        let rows = bundle.target_metrics();
        let (latest, prior) = (rows.first()?, rows.get(1)?);
        Some(Self {
            fiscal_quarter: latest.value(FISCAL_QUARTER).to_string(),
            fiscal_year: latest.value(FISCAL_YEAR).to_string(),
            period_end: latest.value(PERIOD_END_DATE).to_string(),
            product_revenue_m: MetricComparison::read(latest, prior, PRODUCT_REVENUE),
            total_revenue_m: MetricComparison::read(latest, prior, TOTAL_REVENUE),
            rpo_m: MetricComparison::read(latest, prior, RPO),
            nrr_percent: MetricComparison::read(latest, prior, NRR),
            customers_1m_plus: MetricComparison::read(latest, prior, CUSTOMERS_1M),
            fcf_m: MetricComparison::read(latest, prior, FCF),
            gross_margin_percent: MetricComparison::read(latest, prior, GROSS_MARGIN),
        })
    }

    /// Plain-text rendering shared by the dashboard and the enriched prompt
    pub fn render(&self) -> String {
        let mut out = format!(
            "Q{} FY{} (ended {}):\n",
            self.fiscal_quarter, self.fiscal_year, self.period_end
        );
        out.push_str(&money_line("Product Revenue", &self.product_revenue_m));
        out.push_str(&money_line("Total Revenue", &self.total_revenue_m));
        out.push_str(&money_line("RPO", &self.rpo_m));
        out.push_str(&format!(
            "- NRR: {}{}\n",
            percent(self.nrr_percent.current),
            self.nrr_percent
                .delta()
                .map(|d| format!(" ({:+.0} bps YoY)", d * 100.0))
                .unwrap_or_default()
        ));
        out.push_str(&format!(
            "- Customers >$1M: {}{}\n",
            number(self.customers_1m_plus.current),
            growth_suffix(&self.customers_1m_plus)
        ));
        out.push_str(&money_line("FCF", &self.fcf_m));
        out.push_str(&format!(
            "- Gross Margin: {}\n",
            percent(self.gross_margin_percent.current)
        ));
        out
    }
}

fn money_line(label: &str, metric: &MetricComparison) -> String {
    let value = match metric.current {
        Some(v) => format!("${}M", trim_number(v)),
        None => "n/a".to_string(),
    };
    format!("- {}: {}{}\n", label, value, growth_suffix(metric))
}

fn growth_suffix(metric: &MetricComparison) -> String {
    metric
        .growth_pct()
        .map(|g| format!(" ({:+.1}% YoY)", g))
        .unwrap_or_default()
}

fn percent(v: Option<f64>) -> String {
    v.map(|v| format!("{}%", trim_number(v)))
        .unwrap_or_else(|| "n/a".to_string())
}

fn number(v: Option<f64>) -> String {
    v.map(trim_number).unwrap_or_else(|| "n/a".to_string())
}

fn trim_number(v: f64) -> String {
    if v.fract().abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        format!("{}", v)
    }
}

/// Recent competitor news and analyst ratings, `rows` of each. A table contributing no rows gets no header.
pub fn competitive_context(bundle: &ReferenceDataBundle, rows: usize) -> String {
    let mut parts: Vec<String> = Vec::new();

    let news: Vec<_> = bundle.peer_news().iter().take(rows).collect();
    if !news.is_empty() {
        parts.push("RECENT COMPETITOR NEWS:".to_string());
        for item in news {
            parts.push(format!("- {}: {}", item.value("COMPANY"), item.value("HEADLINE")));
            let summary = item.value("SUMMARY");
            if !summary.is_empty() {
                parts.push(format!("  {}", summary));
            }
        }
    }

    let ratings: Vec<_> = bundle.analyst_ratings().iter().take(rows).collect();
    if !ratings.is_empty() {
        if !parts.is_empty() {
            parts.push(String::new());
        }
        parts.push("RECENT ANALYST RATINGS:".to_string());
        for rating in ratings {
            let target = rating.value("PRICE_TARGET").trim_start_matches('$');
            parts.push(format!(
                "- {}: {} (${} target)",
                rating.value("COMPANY"),
                rating.value("RATING"),
                target
            ));
        }
    }

    parts.join("\n")
}
