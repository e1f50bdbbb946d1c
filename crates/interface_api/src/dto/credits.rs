//! Credits DTOs

use rust_decimal::Decimal;
use serde::Serialize;

use domain_billing::BillingHistoryEntry;
use domain_metering::{AggregationKind, MetricDescriptor};

/// Machine specification keyed by metric friendly name, e.g. `{"cpu": 4}`
pub type CostEstimateRequest = std::collections::HashMap<String, Decimal>;

#[derive(Debug, Serialize)]
pub struct MeasurementInfo {
    pub description: String,
    #[serde(rename = "type")]
    pub aggregation: AggregationKind,
    pub metric_name: String,
    pub credits_per_unit: Decimal,
}

impl From<&MetricDescriptor> for MeasurementInfo {
    fn from(descriptor: &MetricDescriptor) -> Self {
        Self {
            description: descriptor.description().to_string(),
            aggregation: descriptor.aggregation(),
            metric_name: descriptor.name().to_string(),
            credits_per_unit: descriptor.rate().as_decimal(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CostEstimateResponse {
    pub credits_per_hour: Decimal,
}

/// Billing history as parallel columns, ready for charting
#[derive(Debug, Default, Serialize)]
pub struct CreditsHistoryResponse {
    pub timestamps: Vec<String>,
    pub credits: Vec<Decimal>,
    pub metrics: Vec<String>,
}

impl FromIterator<BillingHistoryEntry> for CreditsHistoryResponse {
    fn from_iter<I: IntoIterator<Item = BillingHistoryEntry>>(entries: I) -> Self {
        let mut response = Self::default();
        for entry in entries {
            response
                .timestamps
                .push(entry.timestamp.to_datetime().format("%Y-%m-%d %H:%M:%S").to_string());
            response.credits.push(entry.credits_left.amount());
            response.metrics.push(entry.metric_friendly_name);
        }
        response
    }
}
