//! Data model for a single metamorphic test case.
//!
//! A test case is created as a *template* at relation-registration time,
//! deep-cloned once per registered SUT, mutated in place while the scheduler
//! fills its output slots, and finalized into an [`ExecutionReport`]. Output
//! slots use `Option<Value>`: `None` is the uninitialized sentinel for a
//! value the SUT has not produced yet, and the missing-output count is
//! always derived from the slots, never stored separately.
//!
//! All external reads hand out clones. Callers can never corrupt
//! engine-held state through a returned value.

use std::path::Path;
use std::sync::Arc;

use crate::errors::MetamorphicError;
use crate::report::ExecutionReport;
use crate::value::{ParamMap, Value};

/// Pluggable lazy loader: resolves a file path into a resource value.
pub type DataLoaderFn = Arc<dyn Fn(&Path) -> Result<Value, MetamorphicError>>;

/// One concrete metamorphic test case.
#[derive(Clone, Default)]
pub struct TestCase {
    source_inputs: Vec<Value>,
    source_outputs: Vec<Option<Value>>,
    followup_inputs: Vec<Value>,
    followup_outputs: Vec<Option<Value>>,
    parameters: ParamMap,
    relation_result: bool,
    error: Option<MetamorphicError>,
    report: Option<ExecutionReport>,
    validated: bool,
    data_loader: Option<DataLoaderFn>,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("source_inputs", &self.source_inputs)
            .field("source_outputs", &self.source_outputs)
            .field("followup_inputs", &self.followup_inputs)
            .field("followup_outputs", &self.followup_outputs)
            .field("parameters", &self.parameters)
            .field("relation_result", &self.relation_result)
            .field("error", &self.error)
            .field("validated", &self.validated)
            .field("has_data_loader", &self.data_loader.is_some())
            .finish()
    }
}

impl TestCase {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Source inputs / outputs
    // ------------------------------------------------------------------------

    /// Assigns source inputs. A `List` value replaces the input list and
    /// resets every paired output slot to the uninitialized sentinel; any
    /// other value is appended as a single input with a fresh empty slot.
    pub fn assign_source_inputs(&mut self, value: Value) {
        match value {
            Value::List(items) => {
                self.source_outputs = vec![None; items.len()];
                self.source_inputs = items;
            }
            scalar => {
                self.source_inputs.push(scalar);
                self.source_outputs.push(None);
            }
        }
    }

    /// Snapshot of the source inputs.
    pub fn source_inputs(&self) -> Vec<Value> {
        self.source_inputs.clone()
    }

    /// The single source input. Fails if the case has more than one; use
    /// [`TestCase::source_inputs`] for the general form.
    pub fn source_input(&self) -> Result<Value, MetamorphicError> {
        if self.source_inputs.len() == 1 {
            return Ok(self.source_inputs[0].clone());
        }
        Err(MetamorphicError::configuration(
            "this test case has multiple source inputs; use source_inputs() to access them",
        ))
    }

    pub fn source_input_at(&self, index: usize) -> Value {
        self.source_inputs[index].clone()
    }

    /// Snapshot of the source output slots, sentinel entries included.
    pub fn source_outputs(&self) -> Vec<Option<Value>> {
        self.source_outputs.clone()
    }

    /// The computed source outputs, in slot order. Only meaningful once
    /// [`TestCase::missing_source_outputs`] is zero.
    pub fn source_output_values(&self) -> Vec<Value> {
        self.source_outputs.iter().flatten().cloned().collect()
    }

    /// The single source output. Fails if the case has more than one slot.
    pub fn source_output(&self) -> Result<Option<Value>, MetamorphicError> {
        if self.source_outputs.len() == 1 {
            return Ok(self.source_outputs[0].clone());
        }
        Err(MetamorphicError::configuration(
            "this test case has multiple source outputs; use source_outputs() to access them",
        ))
    }

    pub fn set_source_output_at(&mut self, index: usize, value: Value) {
        self.source_outputs[index] = Some(value);
    }

    /// Count of source output slots still holding the sentinel.
    pub fn missing_source_outputs(&self) -> usize {
        self.source_outputs.iter().filter(|o| o.is_none()).count()
    }

    // ------------------------------------------------------------------------
    // Follow-up inputs / outputs
    // ------------------------------------------------------------------------

    /// Assigns follow-up inputs with the same List/scalar semantics as
    /// [`TestCase::assign_source_inputs`].
    pub fn assign_followup_inputs(&mut self, value: Value) {
        match value {
            Value::List(items) => {
                self.followup_outputs = vec![None; items.len()];
                self.followup_inputs = items;
            }
            scalar => {
                self.followup_inputs.push(scalar);
                self.followup_outputs.push(None);
            }
        }
    }

    pub fn followup_inputs(&self) -> Vec<Value> {
        self.followup_inputs.clone()
    }

    /// The single follow-up input. Fails if the case has more than one.
    pub fn followup_input(&self) -> Result<Value, MetamorphicError> {
        if self.followup_inputs.len() == 1 {
            return Ok(self.followup_inputs[0].clone());
        }
        Err(MetamorphicError::configuration(
            "this test case has multiple followup inputs; use followup_inputs() to access them",
        ))
    }

    pub fn followup_input_at(&self, index: usize) -> Value {
        self.followup_inputs[index].clone()
    }

    pub fn followup_outputs(&self) -> Vec<Option<Value>> {
        self.followup_outputs.clone()
    }

    pub fn followup_output_values(&self) -> Vec<Value> {
        self.followup_outputs.iter().flatten().cloned().collect()
    }

    /// The single follow-up output. Fails if the case has more than one slot.
    pub fn followup_output(&self) -> Result<Option<Value>, MetamorphicError> {
        if self.followup_outputs.len() == 1 {
            return Ok(self.followup_outputs[0].clone());
        }
        Err(MetamorphicError::configuration(
            "this test case has multiple followup outputs; use followup_outputs() to access them",
        ))
    }

    pub fn set_followup_output_at(&mut self, index: usize, value: Value) {
        self.followup_outputs[index] = Some(value);
    }

    /// Count of follow-up output slots still holding the sentinel.
    pub fn missing_followup_outputs(&self) -> usize {
        self.followup_outputs.iter().filter(|o| o.is_none()).count()
    }

    pub fn has_followup_inputs(&self) -> bool {
        !self.followup_inputs.is_empty()
    }

    // ------------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------------

    pub fn parameters(&self) -> ParamMap {
        self.parameters.clone()
    }

    pub fn set_parameters(&mut self, parameters: ParamMap) {
        self.parameters = parameters;
    }

    /// Merges wrapper-contributed parameters into the externally supplied
    /// set. Fails fast on any key collision: duplicate parameter names are a
    /// structural misconfiguration of the relation.
    pub fn merge_parameters(&mut self, contributed: ParamMap) -> Result<(), MetamorphicError> {
        for key in contributed.keys() {
            if self.parameters.contains_key(key) {
                return Err(MetamorphicError::configuration(format!(
                    "duplicate parameter key '{key}' contributed by a fixed/randomized wrapper; \
                     rename one of the duplicate parameters"
                )));
            }
        }
        for (key, value) in contributed {
            self.parameters.insert(key, value);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Relation result / error / report / lifecycle flags
    // ------------------------------------------------------------------------

    pub fn relation_result(&self) -> bool {
        self.relation_result
    }

    /// Stores the outcome of the relation. Anything but a `Bool` fails.
    pub fn set_relation_result(&mut self, value: Value) -> Result<(), MetamorphicError> {
        match value {
            Value::Bool(b) => {
                self.relation_result = b;
                Ok(())
            }
            other => Err(MetamorphicError::configuration(format!(
                "relation_result must be a Bool, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn error(&self) -> Option<&MetamorphicError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: MetamorphicError) {
        self.error = Some(error);
    }

    pub fn report(&self) -> Option<&ExecutionReport> {
        self.report.as_ref()
    }

    pub fn set_report(&mut self, report: ExecutionReport) {
        self.report = Some(report);
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn mark_validated(&mut self) {
        self.validated = true;
    }

    // ------------------------------------------------------------------------
    // Lazy loading
    // ------------------------------------------------------------------------

    pub fn set_data_loader(&mut self, loader: Option<DataLoaderFn>) {
        self.data_loader = loader;
    }

    /// Resolves path-like source inputs through the one-shot data loader.
    ///
    /// The loader only runs when *every* source input is a string naming an
    /// existing file; otherwise the inputs are left untouched. The hook is
    /// cleared after its first successful use.
    pub fn process_source_inputs(&mut self) -> Result<(), MetamorphicError> {
        let Some(loader) = self.data_loader.clone() else {
            return Ok(());
        };

        let mut paths = Vec::with_capacity(self.source_inputs.len());
        for input in &self.source_inputs {
            let Some(s) = input.as_str() else {
                return Ok(());
            };
            let path = Path::new(s);
            if !path.is_file() {
                return Ok(());
            }
            paths.push(path.to_path_buf());
        }

        let mut loaded = Vec::with_capacity(paths.len());
        for path in &paths {
            loaded.push(loader(path)?);
        }

        self.assign_source_inputs(Value::List(loaded));
        self.data_loader = None;
        Ok(())
    }
}
