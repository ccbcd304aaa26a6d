// =====================================================================================
// PERFORMANCE INSIGHTS
// =====================================================================================

use std::collections::BTreeMap;

use crate::models::{
    Bottleneck, BottleneckKind, MetricTrend, PerformanceInsights, ResourceUsage, ServiceHealth,
    ServiceMetrics, SystemMetrics, TrendDirection,
};
use shared_config::AlertThresholds;

/// Number of samples in each of the two windows compared for trends.
pub const TREND_WINDOW: usize = 5;
/// Relative change (percent) below which a metric counts as stable.
pub const TREND_TOLERANCE_PERCENT: f64 = 10.0;

const SLOW_SERVICE_FACTOR: f64 = 0.7;
const ERROR_PRONE_FACTOR: f64 = 0.5;

/// Derives bottlenecks, recommendations and trends from the current state plus
/// retained history (oldest first).
pub fn analyze(
    services: &BTreeMap<String, ServiceHealth>,
    metrics: &[ServiceMetrics],
    resources: &ResourceUsage,
    history: &[SystemMetrics],
    thresholds: &AlertThresholds,
) -> PerformanceInsights {
    let bottlenecks = find_bottlenecks(services, metrics, resources, thresholds);
    let trends = compute_trends(history);
    let recommendations = recommend(&bottlenecks, &trends);

    PerformanceInsights {
        bottlenecks,
        recommendations,
        trends,
    }
}

fn find_bottlenecks(
    services: &BTreeMap<String, ServiceHealth>,
    metrics: &[ServiceMetrics],
    resources: &ResourceUsage,
    thresholds: &AlertThresholds,
) -> Vec<Bottleneck> {
    let mut bottlenecks = Vec::new();
    let slow_limit = thresholds.response_time_ms * SLOW_SERVICE_FACTOR;
    let error_limit = thresholds.error_rate * ERROR_PRONE_FACTOR;

    for (name, health) in services {
        if health.details.total_calls == 0 {
            continue;
        }

        if health.response_time_ms > slow_limit {
            bottlenecks.push(Bottleneck {
                kind: BottleneckKind::SlowService,
                target: name.clone(),
                value: health.response_time_ms,
                threshold: slow_limit,
                message: format!(
                    "Service {} responds in {:.0}ms on average",
                    name, health.response_time_ms
                ),
            });
        }

        if health.error_rate > error_limit {
            bottlenecks.push(Bottleneck {
                kind: BottleneckKind::ErrorProneService,
                target: name.clone(),
                value: health.error_rate,
                threshold: error_limit,
                message: format!(
                    "Service {} fails {:.1}% of calls",
                    name,
                    health.error_rate * 100.0
                ),
            });
        }
    }

    for method in metrics {
        if method.total_calls > 0 && method.average_response_time_ms > thresholds.response_time_ms {
            bottlenecks.push(Bottleneck {
                kind: BottleneckKind::SlowMethod,
                target: format!("{}.{}", method.service_name, method.method_name),
                value: method.average_response_time_ms,
                threshold: thresholds.response_time_ms,
                message: format!(
                    "Method {}.{} exceeds the response time threshold ({:.0}ms)",
                    method.service_name, method.method_name, method.average_response_time_ms
                ),
            });
        }
    }

    if resources.memory_usage_percent > thresholds.memory_usage_percent {
        bottlenecks.push(Bottleneck {
            kind: BottleneckKind::MemoryPressure,
            target: "memory".to_string(),
            value: resources.memory_usage_percent,
            threshold: thresholds.memory_usage_percent,
            message: format!("Memory usage at {:.1}%", resources.memory_usage_percent),
        });
    }

    if resources.cpu_usage_percent > thresholds.cpu_usage_percent {
        bottlenecks.push(Bottleneck {
            kind: BottleneckKind::CpuPressure,
            target: "cpu".to_string(),
            value: resources.cpu_usage_percent,
            threshold: thresholds.cpu_usage_percent,
            message: format!("CPU usage at {:.1}%", resources.cpu_usage_percent),
        });
    }

    bottlenecks
}

fn compute_trends(history: &[SystemMetrics]) -> Vec<MetricTrend> {
    if history.len() < 2 {
        return Vec::new();
    }

    let recent_start = history.len().saturating_sub(TREND_WINDOW);
    let recent_start = recent_start.max(history.len() / 2);
    let previous_start = recent_start.saturating_sub(TREND_WINDOW);
    let recent = &history[recent_start..];
    let previous = &history[previous_start..recent_start];

    let series: [(&str, fn(&SystemMetrics) -> f64); 4] = [
        ("error_rate", |m| m.error_rate),
        ("average_response_time_ms", |m| m.average_response_time_ms),
        ("memory_usage_percent", |m| m.resources.memory_usage_percent),
        ("cpu_usage_percent", |m| m.resources.cpu_usage_percent),
    ];

    series
        .iter()
        .map(|(metric, value)| {
            let recent_average = mean(recent.iter().map(value));
            let previous_average = mean(previous.iter().map(value));
            let change_percent = relative_change(previous_average, recent_average);

            MetricTrend {
                metric: metric.to_string(),
                recent_average,
                previous_average,
                change_percent,
                direction: direction(change_percent),
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn relative_change(previous: f64, recent: f64) -> f64 {
    if previous == 0.0 {
        if recent == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (recent - previous) / previous.abs() * 100.0
    }
}

/// Every tracked metric is "lower is better".
fn direction(change_percent: f64) -> TrendDirection {
    if change_percent.abs() <= TREND_TOLERANCE_PERCENT {
        TrendDirection::Stable
    } else if change_percent > 0.0 {
        TrendDirection::Degrading
    } else {
        TrendDirection::Improving
    }
}

fn recommend(bottlenecks: &[Bottleneck], trends: &[MetricTrend]) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();
    let mut push = |text: String| {
        if !recommendations.contains(&text) {
            recommendations.push(text);
        }
    };

    for bottleneck in bottlenecks {
        match bottleneck.kind {
            BottleneckKind::SlowService => push(format!(
                "Investigate latency in {}: consider caching or scaling out",
                bottleneck.target
            )),
            BottleneckKind::ErrorProneService => push(format!(
                "Review recent failures in {} and add retries for transient errors",
                bottleneck.target
            )),
            BottleneckKind::SlowMethod => push(format!(
                "Profile {} which exceeds the response time threshold",
                bottleneck.target
            )),
            BottleneckKind::MemoryPressure => {
                push("Reduce memory pressure or increase available memory".to_string())
            }
            BottleneckKind::CpuPressure => {
                push("Reduce CPU load or add compute capacity".to_string())
            }
        }
    }

    for trend in trends.iter().filter(|t| t.direction == TrendDirection::Degrading) {
        push(format!(
            "{} is trending worse ({:+.1}%) over recent samples",
            trend.metric, trend.change_percent
        ));
    }

    recommendations
}
