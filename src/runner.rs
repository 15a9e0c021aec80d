//! Suite runner: drives every (relation, SUT, test case) triple, reports
//! progress with colored terminal output, and collects the finalized
//! execution reports.
//!
//! A fatal engine error stops the run immediately; the summary gathered up
//! to that point is discarded and the error is returned to the host so it
//! can abort with a nonzero exit.

use std::fs;
use std::path::Path;

use crate::errors::MetamorphicError;
use crate::relation::TestOutcome;
use crate::report::ExecutionReport;
use crate::suite::Suite;

// Color constants for terminal output
const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";

/// Configuration for suite execution and reporting.
pub struct RunConfig {
    pub use_colors: bool,
    /// Suppress the per-test-case progress lines, keeping only the summary.
    pub quiet: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            quiet: false,
        }
    }
}

impl RunConfig {
    /// Apply color formatting to text if colors are enabled.
    pub fn colorize(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }
}

/// Aggregated result of one full suite run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// True when nothing failed. Skips do not count against success.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Executes every test case of every relation in the suite against each of
/// its registered SUTs, in registration order.
///
/// Recoverable errors are logged and counted as skips. The first fatal
/// error aborts the run and is returned to the caller.
pub fn run_suite(suite: &mut Suite, config: &RunConfig) -> Result<RunSummary, MetamorphicError> {
    let mut summary = RunSummary::default();

    for relation in suite.relations_mut() {
        let mr_id = relation.mr_id().to_string();
        for sut_id in relation.sut_ids() {
            for case_id in relation.case_ids(&sut_id) {
                let outcome = match relation.execute(case_id, &sut_id) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        eprintln!(
                            "{} {mr_id} on {sut_id}: {e}",
                            config.colorize("ERROR", RED)
                        );
                        return Err(e);
                    }
                };

                match outcome {
                    TestOutcome::Pass => {
                        summary.passed += 1;
                        if !config.quiet {
                            eprintln!(
                                "{} {mr_id} on {sut_id} [{}]",
                                config.colorize("PASS", GREEN),
                                case_id.0
                            );
                        }
                    }
                    TestOutcome::Fail => {
                        summary.failed += 1;
                        eprintln!(
                            "{} {mr_id} on {sut_id} [{}]",
                            config.colorize("FAIL", RED),
                            case_id.0
                        );
                        if let Some(report) = relation.case(&sut_id, case_id).and_then(|c| c.report())
                        {
                            eprintln!(
                                "       source inputs:    [{}]",
                                report.source_inputs.join(", ")
                            );
                            eprintln!(
                                "       source outputs:   [{}]",
                                report.source_outputs.join(", ")
                            );
                            eprintln!(
                                "       followup inputs:  [{}]",
                                report.followup_inputs.join(", ")
                            );
                            eprintln!(
                                "       followup outputs: [{}]",
                                report.followup_outputs.join(", ")
                            );
                        }
                    }
                    TestOutcome::Skipped(reason) => {
                        summary.skipped += 1;
                        if !config.quiet {
                            eprintln!(
                                "{} {mr_id} on {sut_id} [{}]: {reason}",
                                config.colorize("SKIP", YELLOW),
                                case_id.0
                            );
                        }
                    }
                }
            }
        }
    }

    let verdict = if summary.all_passed() {
        config.colorize("ok", GREEN)
    } else {
        config.colorize("FAILED", RED)
    };
    eprintln!(
        "\ntest result: {verdict}. {} passed; {} failed; {} skipped",
        summary.passed, summary.failed, summary.skipped
    );
    Ok(summary)
}

/// Collects the finalized execution reports of every executed test case in
/// the suite, in execution order.
pub fn collect_reports(suite: &Suite) -> Vec<ExecutionReport> {
    let mut reports = Vec::new();
    for relation in suite.relations() {
        for sut_id in relation.sut_ids() {
            for case_id in relation.case_ids(&sut_id) {
                if let Some(report) = relation.case(&sut_id, case_id).and_then(|c| c.report()) {
                    reports.push(report.clone());
                }
            }
        }
    }
    reports
}

/// Writes every collected report to a single pretty-printed JSON file.
pub fn write_json_reports(suite: &Suite, path: &Path) -> Result<(), MetamorphicError> {
    let reports = collect_reports(suite);
    let json = serde_json::to_string_pretty(&reports).map_err(|e| {
        MetamorphicError::configuration(format!("could not serialize execution reports: {e}"))
    })?;
    fs::write(path, json).map_err(|e| {
        MetamorphicError::configuration(format!(
            "could not write execution reports to {}: {e}",
            path.display()
        ))
    })
}
