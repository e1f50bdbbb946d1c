//! Line protocol parser
//!
//! Turns one record of the form
//! `metric_name,tag=value,... field=value[,field=value...] timestamp`
//! into a [`Measurement`]. The parser is pure: it produces a value or a
//! classified error and leaves logging to the caller, which knows whether
//! the record arrived over HTTP or from a replay.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use core_kernel::{ProjectId, ResourceId};
use crate::error::MeteringError;
use crate::measurement::{Measurement, Timestamp};
use crate::metric::MetricRegistry;

const PROJECT_TAG: &str = "project";
const RESOURCE_TAG: &str = "resource";
const VALUE_FIELD: &str = "value";

/// Parses line-protocol records against a metric registry
#[derive(Debug, Clone)]
pub struct LineParser {
    registry: Arc<MetricRegistry>,
}

impl LineParser {
    /// Creates a parser resolving metrics in `registry`
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry metrics are resolved against
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Parses one record
    ///
    /// # Errors
    ///
    /// - `Parse` if the record is structurally invalid, lacks the `project`
    ///   tag or the `value` field, or carries a malformed value or timestamp
    /// - `UnknownMetric` if the record is well-formed but its metric is not
    ///   registered
    pub fn parse(&self, line: &str) -> Result<Measurement, MeteringError> {
        let record = RawRecord::split(line)?;

        let project = record
            .tags
            .get(PROJECT_TAG)
            .ok_or_else(|| MeteringError::parse(line, "missing `project` tag"))
            .and_then(|value| {
                ProjectId::new(*value).map_err(|e| MeteringError::parse(line, e.to_string()))
            })?;

        let resource = record
            .tags
            .get(RESOURCE_TAG)
            .map(|value| ResourceId::new(*value))
            .transpose()
            .map_err(|e| MeteringError::parse(line, e.to_string()))?;

        let raw_value = record
            .fields
            .get(VALUE_FIELD)
            .ok_or_else(|| MeteringError::parse(line, "missing `value` field"))?;
        let value = parse_value(raw_value)
            .ok_or_else(|| MeteringError::parse(line, format!("invalid value `{}`", raw_value)))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MeteringError::parse(line, "usage value must not be negative"));
        }

        let nanos = i64::from_str(record.timestamp).map_err(|_| {
            MeteringError::parse(line, format!("invalid timestamp `{}`", record.timestamp))
        })?;
        if nanos < 0 {
            return Err(MeteringError::parse(line, "timestamp must not be negative"));
        }

        let metric = self.registry.resolve(record.metric)?;

        Ok(Measurement {
            project,
            resource,
            metric,
            value,
            timestamp: Timestamp::from_nanos(nanos),
        })
    }
}

/// A record split into its sections, nothing interpreted yet
struct RawRecord<'a> {
    metric: &'a str,
    tags: HashMap<&'a str, &'a str>,
    fields: HashMap<&'a str, &'a str>,
    timestamp: &'a str,
}

impl<'a> RawRecord<'a> {
    fn split(line: &'a str) -> Result<Self, MeteringError> {
        let sections: Vec<&str> = line.split_whitespace().collect();
        let [head, field_set, timestamp] = sections[..] else {
            return Err(MeteringError::parse(
                line,
                format!("expected 3 sections, found {}", sections.len()),
            ));
        };

        let mut head_parts = head.split(',');
        let metric = head_parts.next().unwrap_or_default();
        if metric.is_empty() {
            return Err(MeteringError::parse(line, "missing metric name"));
        }

        let tags = head_parts
            .map(|pair| split_pair(line, pair, "tag"))
            .collect::<Result<HashMap<_, _>, _>>()?;
        let fields = field_set
            .split(',')
            .map(|pair| split_pair(line, pair, "field"))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            metric,
            tags,
            fields,
            timestamp,
        })
    }
}

fn split_pair<'a>(
    line: &str,
    pair: &'a str,
    kind: &str,
) -> Result<(&'a str, &'a str), MeteringError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => Ok((key, value)),
        _ => Err(MeteringError::parse(line, format!("malformed {} `{}`", kind, pair))),
    }
}

/// Parses a numeric field value
///
/// Accepts the integer markers `i`/`u` and quoted values the exporters emit.
fn parse_value(raw: &str) -> Option<Decimal> {
    let unquoted = raw.trim_matches('"');
    let numeric = unquoted
        .strip_suffix('i')
        .or_else(|| unquoted.strip_suffix('u'))
        .unwrap_or(unquoted);
    Decimal::from_str(numeric)
        .or_else(|_| Decimal::from_scientific(numeric))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parser() -> LineParser {
        LineParser::new(Arc::new(MetricRegistry::with_defaults()))
    }

    #[test]
    fn test_parses_full_record() {
        let m = parser()
            .parse("project_vcpu_usage,project=demo,resource=42 value=7200 1577840400000000000")
            .unwrap();
        assert_eq!(m.project.as_str(), "demo");
        assert_eq!(m.resource.as_ref().map(|r| r.as_str()), Some("42"));
        assert_eq!(m.metric_name(), "project_vcpu_usage");
        assert_eq!(m.value, dec!(7200));
        assert_eq!(m.timestamp.as_nanos(), 1_577_840_400_000_000_000);
    }

    #[test]
    fn test_integer_marker_and_quotes() {
        assert_eq!(parse_value("42i"), Some(dec!(42)));
        assert_eq!(parse_value("\"1.5\""), Some(dec!(1.5)));
        assert_eq!(parse_value("1e3"), Some(dec!(1000)));
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn test_two_sections_is_a_parse_error() {
        let result = parser().parse("project_vcpu_usage,project=demo value=1");
        assert!(matches!(result, Err(MeteringError::Parse { .. })));
    }
}
