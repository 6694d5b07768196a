//! Keyword-matching responder for models without reliable tool calling.
//!
//! No model is consulted. The question selects one of two canned PromQL
//! queries, the result is bucketed into a severity tier, and a fixed
//! template renders the answer.

use kubesage_core::progress::ProgressSink;
use kubesage_core::tool::ToolExecutor;
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{error, info, warn};

pub const MEMORY_QUERY: &str = "sum(container_memory_usage_bytes) / 1024 / 1024 / 1024";
pub const CPU_QUERY: &str = "cluster:container_cpu_usage:ratio";

const MEMORY_TERMS: &[&str] = &["memory", "mem", "ram"];
const CPU_TERMS: &[&str] = &["cpu", "usage", "utilization"];

static SAMPLE_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""value"\s*:\s*\[\s*[\d.]+\s*,\s*"([\d.]+)""#).unwrap());
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Memory,
    Cpu,
}

impl Topic {
    /// Memory terms are checked first: "usage" would otherwise match CPU.
    fn classify(question: &str) -> Option<Self> {
        let q = question.to_lowercase();
        if MEMORY_TERMS.iter().any(|t| q.contains(t)) {
            Some(Self::Memory)
        } else if CPU_TERMS.iter().any(|t| q.contains(t)) {
            Some(Self::Cpu)
        } else {
            None
        }
    }

    fn query(self) -> &'static str {
        match self {
            Self::Memory => MEMORY_QUERY,
            Self::Cpu => CPU_QUERY,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Cpu => "CPU",
        }
    }
}

/// Answer `question` with at most one `execute_promql` call.
pub async fn respond(executor: &dyn ToolExecutor, question: &str, progress: Option<&dyn ProgressSink>) -> String {
    report(progress, "Analyzing your question...");

    let Some(topic) = Topic::classify(question) else {
        info!("No metric keywords matched, returning guidance");
        return guidance(question);
    };

    report(progress, &format!("Querying {} metrics...", topic.label()));
    let mut arguments = Map::new();
    arguments.insert("query".into(), Value::String(topic.query().to_string()));

    let result = match executor.call_tool("execute_promql", &arguments).await {
        Ok(text) => text,
        Err(e) => {
            error!(topic = topic.label(), error = %e, "Metric query failed");
            return format!("Error analyzing {} metrics: {e}", topic.label());
        }
    };

    report(progress, "Formatting response...");
    match (topic, extract_numeric_value(&result)) {
        (Topic::Cpu, Some(ratio)) => format_cpu(ratio),
        (Topic::Memory, Some(gib)) => format_memory(gib),
        (_, None) => {
            warn!(topic = topic.label(), "Could not parse metric value");
            format_unparsed(topic, &result)
        }
    }
}

/// First sample value in a query result.
///
/// Tries the JSON `results[0].value[1]` path, then a `"value": [ts, "x"]`
/// pattern, then the first decimal number in the text.
pub fn extract_numeric_value(text: &str) -> Option<f64> {
    if let Ok(json) = serde_json::from_str::<Value>(text) {
        let sample = json.pointer("/results/0/value/1");
        let parsed = match sample {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        };
        if parsed.is_some() {
            return parsed;
        }
    }

    if let Some(v) = SAMPLE_VALUE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        return Some(v);
    }

    DECIMAL
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn cpu_tier(percent: f64) -> (&'static str, &'static str) {
    if percent < 20.0 {
        ("low", "The cluster has plenty of available computational resources.")
    } else if percent < 60.0 {
        ("moderate", "CPU utilization is within normal operating range.")
    } else if percent < 80.0 {
        ("high", "Consider monitoring for potential performance impacts.")
    } else {
        ("very high", "CPU resources are heavily utilized. Consider scaling or optimization.")
    }
}

fn memory_tier(gib: f64) -> (&'static str, &'static str) {
    if gib < 100.0 {
        ("low", "Memory usage is minimal, plenty of capacity available.")
    } else if gib < 500.0 {
        ("moderate", "Memory usage is within normal operating range.")
    } else if gib < 1000.0 {
        ("high", "Memory usage is elevated. Monitor for potential issues.")
    } else {
        (
            "very high",
            "Substantial memory consumption. Review container memory requests and limits.",
        )
    }
}

fn format_cpu(ratio: f64) -> String {
    let percent = ratio * 100.0;
    let (level, recommendation) = cpu_tier(percent);
    format!(
        "CPU Usage Overview

Current CPU Utilization: {percent:.2}%

Detailed Breakdown:
- The cluster is currently using approximately {percent:.2}% of its total CPU capacity
- This indicates a {level} level of CPU utilization
- The metric represents the ratio of CPU cores being used across the entire cluster

PromQL Used: `{CPU_QUERY}`

Operational Insights:
- {recommendation}
- This measurement reflects cluster-wide container CPU usage"
    )
}

fn format_memory(gib: f64) -> String {
    let (level, recommendation) = memory_tier(gib);
    format!(
        "Memory Usage Analysis

Total Memory Used: {gib:.1} GB

Detailed Breakdown:
- Cluster containers are using approximately {gib:.1} GB of memory
- This indicates a {level} level of memory utilization
- The metric represents total container memory usage across the cluster

PromQL Used: `{MEMORY_QUERY}`

Operational Insights:
- {recommendation}
- This measurement reflects cluster-wide container memory consumption"
    )
}

fn format_unparsed(topic: Topic, raw: &str) -> String {
    let title = match topic {
        Topic::Cpu => "CPU Usage Analysis",
        Topic::Memory => "Memory Usage Analysis",
    };
    let raw: String = raw.chars().take(500).collect();
    format!(
        "{title}

I retrieved the {label} metrics but had trouble parsing the exact value.

PromQL Used: `{query}`

Raw result: {raw}

Please check the Prometheus query directly for detailed values.",
        label = topic.label(),
        query = topic.query(),
    )
}

fn guidance(question: &str) -> String {
    format!(
        "I understand you're asking about: \"{question}\"

To provide accurate metrics and insights, please ask about specific aspects like:
- CPU usage or utilization
- Memory usage
- Pod counts or status
- Network metrics
- Storage metrics

I'll query the Prometheus metrics and provide detailed analysis."
    )
}

fn report(progress: Option<&dyn ProgressSink>, message: &str) {
    if let Some(sink) = progress {
        if let Err(e) = sink.emit(message) {
            warn!(error = %e, "Progress sink failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;
    use kubesage_core::error::ToolError;
    use kubesage_core::progress::ProgressLog;

    fn sample(value: &str) -> String {
        format!(r#"{{"status":"success","query":"q","result_type":"vector","results":[{{"metric":{{}},"value":[1700000000,"{value}"]}}]}}"#)
    }

    #[tokio::test]
    async fn memory_moderate_tier() {
        let executor = RecordingExecutor::with_promql().responding("execute_promql", sample("250"));
        let answer = respond(&executor, "How much memory is the cluster using?", None).await;

        assert!(answer.contains("Total Memory Used: 250.0 GB"), "{answer}");
        assert!(answer.contains("This indicates a moderate level"));
        assert!(answer.contains("Memory usage is within normal operating range."));
        assert!(answer.contains(&format!("PromQL Used: `{MEMORY_QUERY}`")));

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["query"], MEMORY_QUERY);
    }

    #[tokio::test]
    async fn cpu_very_high_tier() {
        let executor = RecordingExecutor::with_promql().responding("execute_promql", sample("0.85"));
        let answer = respond(&executor, "What's the CPU utilization?", None).await;

        assert!(answer.contains("Current CPU Utilization: 85.00%"), "{answer}");
        assert!(answer.contains("This indicates a very high level"));
        assert!(answer.contains("CPU resources are heavily utilized. Consider scaling or optimization."));
        assert_eq!(executor.calls()[0].1["query"], CPU_QUERY);
    }

    #[tokio::test]
    async fn memory_terms_win_over_usage() {
        let executor = RecordingExecutor::with_promql().responding("execute_promql", sample("12.5"));
        respond(&executor, "memory usage please", None).await;
        assert_eq!(executor.calls()[0].1["query"], MEMORY_QUERY);
    }

    #[tokio::test]
    async fn unmatched_question_gets_guidance() {
        let executor = RecordingExecutor::with_promql();
        let answer = respond(&executor, "Any alerts firing?", None).await;
        assert!(answer.starts_with("I understand you're asking about: \"Any alerts firing?\""));
        assert!(answer.contains("- Pod counts or status"));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn unparseable_result_shows_raw_text() {
        let raw = "no numbers here ".repeat(50);
        let executor = RecordingExecutor::with_promql().responding("execute_promql", raw.clone());
        let answer = respond(&executor, "cpu?", None).await;
        assert!(answer.contains("had trouble parsing the exact value"));
        let expected: String = raw.chars().take(500).collect();
        assert!(answer.contains(&format!("Raw result: {expected}\n")));
    }

    #[tokio::test]
    async fn executor_error_is_reported() {
        let executor = RecordingExecutor::with_promql().failing(
            "execute_promql",
            ToolError::Unavailable {
                service: "Prometheus".into(),
                reason: "HTTP 503: down".into(),
            },
        );
        let answer = respond(&executor, "ram?", None).await;
        assert_eq!(answer, "Error analyzing memory metrics: Prometheus unavailable: HTTP 503: down");
    }

    #[tokio::test]
    async fn progress_messages() {
        let executor = RecordingExecutor::with_promql().responding("execute_promql", sample("0.1"));
        let log = ProgressLog::new();
        respond(&executor, "cpu", Some(&log)).await;
        assert_eq!(
            log.messages(),
            vec!["Analyzing your question...", "Querying CPU metrics...", "Formatting response..."]
        );
    }

    #[test]
    fn extraction_fallbacks() {
        assert_eq!(extract_numeric_value(&sample("0.42")), Some(0.42));
        assert_eq!(extract_numeric_value(r#"result: "value": [1700000000.1, "3.5"] trailing"#), Some(3.5));
        assert_eq!(extract_numeric_value("about 7.25 GiB"), Some(7.25));
        assert_eq!(extract_numeric_value("nothing"), None);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(cpu_tier(19.99).0, "low");
        assert_eq!(cpu_tier(20.0).0, "moderate");
        assert_eq!(cpu_tier(79.9).0, "high");
        assert_eq!(cpu_tier(80.0).0, "very high");
        assert_eq!(memory_tier(99.0).0, "low");
        assert_eq!(memory_tier(500.0).0, "high");
        assert_eq!(memory_tier(1000.0).0, "very high");
    }
}
