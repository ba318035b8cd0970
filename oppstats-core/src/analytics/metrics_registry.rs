//! Registry of derived metrics for discovery and documentation.
//!
//! Raw counters are self-describing; this lists the values the engine
//! computes from them.

use serde::Serialize;

/// Type of metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricValueType {
    Integer,
    Float,
    Percent,
    Level,
}

impl MetricValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricValueType::Integer => "integer",
            MetricValueType::Float => "float",
            MetricValueType::Percent => "percent",
            MetricValueType::Level => "level",
        }
    }
}

/// Descriptor for a derived metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDescriptor {
    /// Aggregate the metric lives on
    pub aggregate: &'static str,
    pub name: &'static str,
    pub value_type: MetricValueType,
    pub summary: &'static str,
}

const USER_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        aggregate: "user_analytics",
        name: "view_to_click_rate",
        value_type: MetricValueType::Percent,
        summary: "Clicked over viewed opportunities, lifetime.",
    },
    MetricDescriptor {
        aggregate: "user_analytics",
        name: "click_to_participate_rate",
        value_type: MetricValueType::Percent,
        summary: "Participated over clicked opportunities, lifetime.",
    },
    MetricDescriptor {
        aggregate: "user_analytics",
        name: "overall_conversion_rate",
        value_type: MetricValueType::Percent,
        summary: "Participated over viewed opportunities, lifetime.",
    },
    MetricDescriptor {
        aggregate: "user_analytics",
        name: "average_session_time",
        value_type: MetricValueType::Float,
        summary: "Total time spent over total sessions, in seconds.",
    },
    MetricDescriptor {
        aggregate: "user_analytics",
        name: "days_since_registration",
        value_type: MetricValueType::Integer,
        summary: "Whole days between registration and the last update.",
    },
];

const DAILY_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        aggregate: "daily_stats",
        name: "average_session_time",
        value_type: MetricValueType::Float,
        summary: "Running average of session duration for the day, in seconds.",
    },
    MetricDescriptor {
        aggregate: "daily_stats",
        name: "conversion_rate",
        value_type: MetricValueType::Percent,
        summary: "Participations over views for the day.",
    },
    MetricDescriptor {
        aggregate: "daily_stats",
        name: "active_users",
        value_type: MetricValueType::Integer,
        summary: "Users with any engagement that day, set by the daily recompute.",
    },
    MetricDescriptor {
        aggregate: "daily_stats",
        name: "new_users",
        value_type: MetricValueType::Integer,
        summary: "Users registered that day, set by the daily recompute.",
    },
    MetricDescriptor {
        aggregate: "daily_stats",
        name: "total_opportunities",
        value_type: MetricValueType::Integer,
        summary: "Active opportunities, snapshotted by the daily recompute.",
    },
];

const OPPORTUNITY_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        aggregate: "opportunity_stats",
        name: "view_to_click_rate",
        value_type: MetricValueType::Percent,
        summary: "Unique clicks over unique views.",
    },
    MetricDescriptor {
        aggregate: "opportunity_stats",
        name: "click_to_participate_rate",
        value_type: MetricValueType::Percent,
        summary: "Unique participations over unique clicks.",
    },
    MetricDescriptor {
        aggregate: "opportunity_stats",
        name: "overall_conversion_rate",
        value_type: MetricValueType::Percent,
        summary: "Unique participations over unique views.",
    },
    MetricDescriptor {
        aggregate: "opportunity_stats",
        name: "performance_score",
        value_type: MetricValueType::Float,
        summary: "Weighted blend of the two step rates, capped at 100.",
    },
];

const ENGAGEMENT_METRICS: &[MetricDescriptor] = &[MetricDescriptor {
    aggregate: "user_engagement",
    name: "engagement_level",
    value_type: MetricValueType::Level,
    summary: "low, medium or high from sessions, minutes and actions that day.",
}];

/// List all registered metrics.
pub fn list_metrics() -> Vec<MetricDescriptor> {
    [
        USER_METRICS,
        DAILY_METRICS,
        OPPORTUNITY_METRICS,
        ENGAGEMENT_METRICS,
    ]
    .concat()
}

/// List metrics for a given aggregate (table) name.
pub fn list_metrics_for_aggregate(aggregate: &str) -> Vec<MetricDescriptor> {
    list_metrics()
        .into_iter()
        .filter(|m| m.aggregate == aggregate)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_aggregate_has_metrics() {
        for aggregate in [
            "user_analytics",
            "daily_stats",
            "opportunity_stats",
            "user_engagement",
        ] {
            assert!(
                !list_metrics_for_aggregate(aggregate).is_empty(),
                "{} has no registered metrics",
                aggregate
            );
        }
        assert!(list_metrics_for_aggregate("sessions").is_empty());
    }

    #[test]
    fn test_names_unique_per_aggregate() {
        let metrics = list_metrics();
        let mut keys: Vec<_> = metrics.iter().map(|m| (m.aggregate, m.name)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), metrics.len());
    }
}
