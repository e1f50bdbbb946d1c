//! Comprehensive tests for domain_metering

use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

use core_kernel::{CreditPrecision, CreditRate};
use domain_metering::{
    AggregationKind, LineParser, MeteringError, MetricDescriptor, MetricRegistry, ResetPolicy,
};

fn registry() -> Arc<MetricRegistry> {
    let mut registry = MetricRegistry::new();
    registry
        .register(MetricDescriptor::cumulative(
            "vcpu",
            "cpu",
            CreditRate::new(dec!(0.001)).unwrap(),
        ))
        .unwrap();
    Arc::new(registry)
}

fn parser() -> LineParser {
    LineParser::new(registry())
}

// ============================================================================
// Parser Tests
// ============================================================================

mod parser_tests {
    use super::*;

    #[test]
    fn test_parse_reference_line() {
        let m = parser()
            .parse("vcpu,project=demo value=3600 1577836800000000000")
            .unwrap();

        assert_eq!(m.project.as_str(), "demo");
        assert!(m.resource.is_none());
        assert_eq!(m.metric_name(), "vcpu");
        assert_eq!(m.metric.aggregation(), AggregationKind::CumulativeCounter);
        assert_eq!(m.value, dec!(3600));
        assert_eq!(m.timestamp.as_nanos(), 1_577_836_800_000_000_000);
        assert_eq!(m.timestamp.to_string(), "2020-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_tag_order_does_not_matter() {
        let m = parser()
            .parse("vcpu,resource=vm-1,project=demo value=1 10")
            .unwrap();
        assert_eq!(m.project.as_str(), "demo");
        assert_eq!(m.resource.map(|r| r.as_str().to_string()), Some("vm-1".to_string()));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let m = parser()
            .parse("vcpu,project=demo value=5,unit=\"s\" 10")
            .unwrap();
        assert_eq!(m.value, dec!(5));
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        assert!(parser().parse("  vcpu,project=demo value=1 10\t").is_ok());
    }

    #[test]
    fn test_unknown_metric_is_classified() {
        let result = parser().parse("gpu,project=demo value=1 10");
        assert!(matches!(result, Err(MeteringError::UnknownMetric(name)) if name == "gpu"));
    }

    #[test]
    fn test_malformed_unknown_metric_is_a_parse_error() {
        // structure is checked before the metric is resolved
        let result = parser().parse("gpu,project=demo value=1");
        assert!(matches!(result, Err(MeteringError::Parse { .. })));
    }

    #[test]
    fn test_rejected_inputs() {
        let cases = [
            "",
            "   ",
            "vcpu,project=demo value=1",
            "vcpu,project=demo value=1 10 extra",
            "vcpu value=1 10",
            "vcpu,project= value=1 10",
            "vcpu,project=demo amount=1 10",
            "vcpu,project=demo value=abc 10",
            "vcpu,project=demo value=-1 10",
            "vcpu,project=demo value=1 -10",
            "vcpu,project=demo value=1 soon",
            ",project=demo value=1 10",
        ];
        for line in cases {
            let result = parser().parse(line);
            assert!(
                matches!(result, Err(MeteringError::Parse { .. })),
                "expected parse error for {:?}, got {:?}",
                line,
                result
            );
        }
    }

    #[test]
    fn test_rejected_inputs_are_drop_worthy() {
        let err = parser().parse("vcpu value=1 10").unwrap_err();
        assert!(err.is_rejected_input());
        let err = parser().parse("gpu,project=demo value=1 10").unwrap_err();
        assert!(err.is_rejected_input());
    }

    #[test]
    fn test_parse_error_mentions_line() {
        let err = parser().parse("vcpu value=1 10").unwrap_err();
        assert!(err.to_string().contains("vcpu value=1 10"));
    }
}

// ============================================================================
// Registry Tests
// ============================================================================

mod registry_tests {
    use super::*;

    #[test]
    fn test_descriptors_are_sorted() {
        let mut registry = MetricRegistry::new();
        for (name, friendly) in [("zeta", "z"), ("alpha", "a"), ("mid", "m")] {
            registry
                .register(MetricDescriptor::instantaneous(
                    name,
                    friendly,
                    CreditRate::new(dec!(1)).unwrap(),
                ))
                .unwrap();
        }
        let names: Vec<_> = registry
            .descriptors()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_reset_policy_defaults_to_restart() {
        let descriptor =
            MetricDescriptor::cumulative("vcpu", "cpu", CreditRate::new(dec!(1)).unwrap());
        assert_eq!(descriptor.reset_policy(), ResetPolicy::RestartFromZero);
        let descriptor = descriptor.with_reset_policy(ResetPolicy::Rebaseline);
        assert_eq!(descriptor.reset_policy(), ResetPolicy::Rebaseline);
    }

    #[test]
    fn test_descriptor_serializes_for_listing() {
        let descriptor = MetricDescriptor::cumulative("vcpu", "cpu", CreditRate::new(dec!(1)).unwrap())
            .with_description("Amount of vCPUs.");
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["name"], "vcpu");
        assert_eq!(json["friendly_name"], "cpu");
        assert_eq!(json["aggregation"], "cumulative_counter");
        assert_eq!(json["reset_policy"], "restart_from_zero");
    }

    #[test]
    fn test_default_costs_per_hour_quantised() {
        let registry = MetricRegistry::with_defaults();
        let specs = HashMap::from([("ram".to_string(), dec!(1000))]);
        // 1000 MiB * 0.3 / 1024 = 0.29296875
        let cost = registry
            .costs_per_hour(&specs, CreditPrecision::default())
            .unwrap();
        assert_eq!(cost.amount(), dec!(0.29));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    proptest! {
        #[test]
        fn well_formed_records_keep_their_values(
            project in "[a-z][a-z0-9-]{0,12}",
            value in 0u64..u64::from(u32::MAX),
            timestamp in 0i64..i64::MAX,
        ) {
            let line = format!("vcpu,project={} value={} {}", project, value, timestamp);
            let measurement = parser().parse(&line).unwrap();
            prop_assert_eq!(measurement.project.as_str(), project.as_str());
            prop_assert_eq!(measurement.value, Decimal::from(value));
            prop_assert_eq!(measurement.timestamp.as_nanos(), timestamp);
        }

        #[test]
        fn arbitrary_input_is_never_accepted_silently(line in "\\PC{0,60}") {
            match parser().parse(&line) {
                Ok(measurement) => prop_assert_eq!(measurement.metric_name(), "vcpu"),
                Err(e) => prop_assert!(e.is_rejected_input()),
            }
        }
    }
}
