//! Finalized per-test-case execution reports.
//!
//! A report is built unconditionally at the end of every test-case
//! lifecycle, including early aborts. Output slots that were never computed
//! are rendered as a distinguished "(not generated)" placeholder so a
//! partially executed case still produces a complete, serializable record.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::case::TestCase;
use crate::value::{ParamMap, Value};

/// Placeholder for output slots the engine never filled.
pub const NOT_GENERATED: &str = "(not generated)";

/// All information needed to render or persist one executed test case.
/// Values are rendered to strings so the report stays self-contained after
/// the owning session (and its test cases) is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub mr_id: String,
    pub sut_id: String,
    pub transformation_name: String,
    pub relation_name: String,
    pub source_inputs: Vec<String>,
    pub source_outputs: Vec<String>,
    pub followup_inputs: Vec<String>,
    pub followup_outputs: Vec<String>,
    pub parameters: ParamMap,
    pub relation_result: bool,
    pub error: Option<String>,
    pub timestamp_secs: u64,
}

fn render_inputs(inputs: &[Value]) -> Vec<String> {
    inputs.iter().map(|v| v.to_string()).collect()
}

fn render_outputs(outputs: &[Option<Value>]) -> Vec<String> {
    outputs
        .iter()
        .map(|slot| match slot {
            Some(v) => v.to_string(),
            None => NOT_GENERATED.to_string(),
        })
        .collect()
}

impl ExecutionReport {
    /// Builds the finalized report for a test case, placeholdering every
    /// field the lifecycle never reached.
    pub fn finalize(
        case: &TestCase,
        mr_id: &str,
        sut_id: &str,
        transformation_name: &str,
        relation_name: &str,
    ) -> Self {
        let source_outputs = render_outputs(&case.source_outputs());

        let followup_inputs = if case.has_followup_inputs() {
            render_inputs(&case.followup_inputs())
        } else {
            vec![NOT_GENERATED.to_string()]
        };

        let followup_slots = case.followup_outputs();
        let followup_outputs = if followup_slots.is_empty() {
            vec![NOT_GENERATED.to_string(); source_outputs.len()]
        } else {
            render_outputs(&followup_slots)
        };

        Self {
            mr_id: mr_id.to_string(),
            sut_id: sut_id.to_string(),
            transformation_name: transformation_name.to_string(),
            relation_name: relation_name.to_string(),
            source_inputs: render_inputs(&case.source_inputs()),
            source_outputs,
            followup_inputs,
            followup_outputs,
            parameters: case.parameters(),
            relation_result: case.relation_result(),
            error: case.error().map(|e| e.to_string()),
            timestamp_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Serializes the report to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
