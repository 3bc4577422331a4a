use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::utils::now_epoch_ms;

const DEFAULT_WINDOW_SIZE: usize = 128;
const SLOW_CALL_P95_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub samples: usize,
    pub average_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReport {
    pub generated_at_ms: u64,
    pub grammar: LatencySummary,
    pub explain: LatencySummary,
    pub failed_requests: u64,
    pub rejected_without_key: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct RollingWindow {
    values: VecDeque<u64>,
    capacity: usize,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, value_ms: u64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value_ms);
    }

    fn summary(&self) -> LatencySummary {
        let samples = self.values.len();
        if samples == 0 {
            return LatencySummary {
                samples: 0,
                average_ms: 0,
                p95_ms: 0,
                max_ms: 0,
            };
        }

        let mut sorted = self.values.iter().copied().collect::<Vec<_>>();
        sorted.sort_unstable();
        let p95_index = ((samples as f64 * 0.95).ceil() as usize)
            .saturating_sub(1)
            .min(samples - 1);

        LatencySummary {
            samples,
            average_ms: sorted.iter().sum::<u64>() / samples as u64,
            p95_ms: sorted[p95_index],
            max_ms: sorted[samples - 1],
        }
    }
}

/// Latency and failure counters for the correction service.
#[derive(Debug)]
pub struct ServiceMetrics {
    grammar_ms: RollingWindow,
    explain_ms: RollingWindow,
    failed_requests: u64,
    rejected_without_key: u64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            grammar_ms: RollingWindow::new(DEFAULT_WINDOW_SIZE),
            explain_ms: RollingWindow::new(DEFAULT_WINDOW_SIZE),
            failed_requests: 0,
            rejected_without_key: 0,
        }
    }

    pub fn record_grammar(&mut self, latency_ms: u64) {
        self.grammar_ms.record(latency_ms);
    }

    pub fn record_explain(&mut self, latency_ms: u64) {
        self.explain_ms.record(latency_ms);
    }

    pub fn record_failure(&mut self) {
        self.failed_requests += 1;
    }

    pub fn record_missing_key(&mut self) {
        self.rejected_without_key += 1;
    }

    pub fn report(&self) -> ServiceReport {
        let grammar = self.grammar_ms.summary();
        let explain = self.explain_ms.summary();

        let mut warnings = Vec::new();
        for (label, summary) in [("grammar", &grammar), ("explain", &explain)] {
            if summary.samples > 0 && summary.p95_ms > SLOW_CALL_P95_MS {
                warnings.push(format!(
                    "{label} P95 latency {}ms exceeded {}ms.",
                    summary.p95_ms, SLOW_CALL_P95_MS
                ));
            }
        }
        if self.rejected_without_key > 0 {
            warnings.push("Requests were rejected because no API key is configured.".to_string());
        }

        ServiceReport {
            generated_at_ms: now_epoch_ms(),
            grammar,
            explain,
            failed_requests: self.failed_requests,
            rejected_without_key: self.rejected_without_key,
            warnings,
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
