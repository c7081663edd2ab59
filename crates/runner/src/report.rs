//! Per-scenario results and a plain-text summary renderer.

use arachne_core::ArachneError;
use std::time::Duration;

/// Outcome of one scenario run.
#[derive(Debug)]
pub struct ScenarioResult {
    pub scenario: String,
    pub elapsed: Duration,
    /// Solution combinations attempted before success or abort.
    pub trials: usize,
    pub total_gas: u64,
    /// Average gas per gas-reporting trial; `None` when nothing reported.
    pub avg_gas: Option<u64>,
    pub error: Option<String>,
    /// Structured expected/actual pair when the failure was a mismatch.
    pub diff: Option<(String, String)>,
}

impl ScenarioResult {
    pub(crate) fn build(
        scenario: &str,
        elapsed: Duration,
        trials: usize,
        total_gas: u64,
        gas_trials: usize,
        error: Option<ArachneError>,
    ) -> Self {
        let diff = match &error {
            Some(ArachneError::Mismatch { expected, actual }) => {
                Some((expected.clone(), actual.clone()))
            }
            _ => None,
        };
        Self {
            scenario: scenario.to_string(),
            elapsed,
            trials,
            total_gas,
            avg_gas: (gas_trials > 0).then(|| total_gas / gas_trials as u64),
            error: error.map(|e| e.to_string()),
            diff,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Render a human-readable summary of a batch of results.
pub fn render(base: &str, results: &[ScenarioResult]) -> String {
    let mut out = String::new();
    let passed = results.iter().filter(|r| r.succeeded()).count();

    out.push_str(&format!(
        "\n=== {base}: {passed}/{} scenarios passed ===\n",
        results.len()
    ));

    for r in results {
        let gas = match r.avg_gas {
            Some(g) => format!(", avg gas {g}"),
            None => String::new(),
        };
        match &r.error {
            None => out.push_str(&format!(
                "  ok   {} ({} trials{gas}, {:?})\n",
                r.scenario, r.trials, r.elapsed
            )),
            Some(error) => {
                out.push_str(&format!(
                    "  FAIL {} after {} trials: {error}\n",
                    r.scenario, r.trials
                ));
                if let Some((expected, actual)) = &r.diff {
                    out.push_str(&format!("       expected: {expected}\n"));
                    out.push_str(&format!("       actual:   {actual}\n"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_error_carries_a_diff() {
        let result = ScenarioResult::build(
            "supply",
            Duration::from_millis(5),
            2,
            0,
            0,
            Some(ArachneError::Mismatch {
                expected: "100".into(),
                actual: "99".into(),
            }),
        );
        assert!(!result.succeeded());
        assert_eq!(result.diff, Some(("100".into(), "99".into())));
    }

    #[test]
    fn vacuous_pass_reports_no_gas() {
        let result = ScenarioResult::build("empty", Duration::ZERO, 0, 0, 0, None);
        assert!(result.succeeded());
        assert_eq!(result.avg_gas, None);
    }

    #[test]
    fn render_lists_pass_and_fail() {
        let results = vec![
            ScenarioResult::build("a", Duration::ZERO, 6, 126_000, 6, None),
            ScenarioResult::build(
                "b",
                Duration::ZERO,
                2,
                0,
                0,
                Some(ArachneError::Scenario("boom".into())),
            ),
        ];
        let rendered = render("mainnet", &results);
        assert!(rendered.contains("1/2 scenarios passed"));
        assert!(rendered.contains("ok   a"));
        assert!(rendered.contains("FAIL b after 2 trials"));
    }
}
