//! The relation engine: owns one metamorphic relation, its registered
//! transform/relation functions, the per-SUT test-case stores and input
//! queues, and the batch-drain loop that amortizes SUT invocation cost.
//!
//! Execution is strictly single-threaded and cooperative. The host runner
//! calls [`MetamorphicRelation::execute`] for one test case at a time; the
//! queue and the relation's registries are shared mutable state across all
//! test cases of one run and rely on that serialized access. A concurrent
//! host must wrap each relation in one exclusive lock.
//!
//! Fatal errors (SUT, transformation, or relation faults) bubble out of
//! `execute` so the host can abort the whole run. Recoverable errors
//! (explicit skip, invalid input) terminate only the current test case.

use std::collections::HashMap;
use std::sync::Arc;

use crate::case::{DataLoaderFn, TestCase};
use crate::errors::{ErrorKind, MetamorphicError};
use crate::generator::{CaseGenerator, ParameterGrid, TestingStrategy};
use crate::params::{
    unwrap_result, GeneralRelationFn, GeneralTransformFn, RelationFn, TransformFn, Unwrapped,
    ValidInputFn,
};
use crate::queue::{CaseId, CaseStore, InputQueue, QueueItem, Role};
use crate::report::ExecutionReport;
use crate::value::{ParamMap, Value};

/// Identifier of a metamorphic relation within a suite.
pub type MrId = String;

/// Identifier of a registered system under test.
pub type SutId = String;

/// The black-box function being validated.
///
/// Without a configured batch size the engine calls [`System::call`] with a
/// single unwrapped input. With batching it calls [`System::call_batch`]
/// with the ordered input list and expects a matching-length output list.
pub trait System {
    fn call(&self, input: Value) -> Result<Value, MetamorphicError>;

    fn call_batch(&self, inputs: Vec<Value>) -> Result<Vec<Value>, MetamorphicError> {
        inputs.into_iter().map(|input| self.call(input)).collect()
    }
}

/// Adapts a plain closure into a [`System`].
pub struct FnSystem<F>(pub F);

impl<F> System for FnSystem<F>
where
    F: Fn(Value) -> Result<Value, MetamorphicError>,
{
    fn call(&self, input: Value) -> Result<Value, MetamorphicError> {
        (self.0)(input)
    }
}

/// Adapts a batch-level closure into a [`System`]. Single calls go through
/// a one-element batch.
pub struct BatchFnSystem<F>(pub F);

impl<F> System for BatchFnSystem<F>
where
    F: Fn(Vec<Value>) -> Result<Vec<Value>, MetamorphicError>,
{
    fn call(&self, input: Value) -> Result<Value, MetamorphicError> {
        let mut outputs = self.call_batch(vec![input])?;
        outputs.pop().ok_or_else(|| {
            MetamorphicError::configuration("batch system returned no output for a single input")
        })
    }

    fn call_batch(&self, inputs: Vec<Value>) -> Result<Vec<Value>, MetamorphicError> {
        (self.0)(inputs)
    }
}

/// Final classification of one executed test case, as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Pass,
    Fail,
    Skipped(String),
}

enum Transformation {
    Single { name: String, f: TransformFn },
    General { name: String, f: GeneralTransformFn },
}

impl Transformation {
    fn name(&self) -> &str {
        match self {
            Transformation::Single { name, .. } => name,
            Transformation::General { name, .. } => name,
        }
    }
}

/// Cheap clone of the registered transformation, taken before execution so
/// the borrow on the relation's registries ends before the call.
enum TransformCall {
    Single(TransformFn),
    General(GeneralTransformFn),
}

enum RelationCheck {
    Single { name: String, f: RelationFn },
    General { name: String, f: GeneralRelationFn },
}

impl RelationCheck {
    fn name(&self) -> &str {
        match self {
            RelationCheck::Single { name, .. } => name,
            RelationCheck::General { name, .. } => name,
        }
    }
}

enum RelationCall {
    Single(RelationFn),
    General(GeneralRelationFn),
}

/// Per-SUT mutable execution state: the registered system, its batch size,
/// the cloned test cases, and the queue of pending inputs.
struct SutState {
    system: Arc<dyn System>,
    /// `None` means unbatched: the SUT receives one unwrapped input per
    /// call. `Some(n)` enables list calls of up to `n` inputs.
    batch_size: Option<usize>,
    store: CaseStore,
    queue: InputQueue,
}

/// Holds a single metamorphic relation and provides the functionality to
/// generate its test cases and execute them against registered SUTs.
pub struct MetamorphicRelation {
    mr_id: MrId,
    data: Vec<Value>,
    strategy: TestingStrategy,
    number_of_test_cases: usize,
    number_of_sources: usize,
    parameter_grid: ParameterGrid,
    transformation: Option<Transformation>,
    relation: Option<RelationCheck>,
    valid_inputs: Vec<ValidInputFn>,
    templates: Vec<TestCase>,
    suts: HashMap<SutId, SutState>,
    // Registration order of the SUT ids; the map alone would lose it.
    sut_order: Vec<SutId>,
}

impl std::fmt::Debug for MetamorphicRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetamorphicRelation")
            .field("mr_id", &self.mr_id)
            .field("strategy", &self.strategy)
            .field("number_of_test_cases", &self.number_of_test_cases)
            .field("number_of_sources", &self.number_of_sources)
            .finish_non_exhaustive()
    }
}

impl MetamorphicRelation {
    pub fn new(
        mr_id: impl Into<MrId>,
        data: Vec<Value>,
        strategy: TestingStrategy,
        number_of_test_cases: usize,
        number_of_sources: usize,
    ) -> Self {
        Self {
            mr_id: mr_id.into(),
            data,
            strategy,
            number_of_test_cases,
            number_of_sources,
            parameter_grid: ParameterGrid::new(),
            transformation: None,
            relation: None,
            valid_inputs: Vec::new(),
            templates: Vec::new(),
            suts: HashMap::new(),
            sut_order: Vec::new(),
        }
    }

    pub fn mr_id(&self) -> &str {
        &self.mr_id
    }

    /// Sets the parameter grid. Must happen before template generation.
    pub fn set_parameter_grid(&mut self, grid: ParameterGrid) -> Result<(), MetamorphicError> {
        if !self.templates.is_empty() {
            return Err(MetamorphicError::configuration(format!(
                "parameter grid for {} must be set before test cases are generated",
                self.mr_id
            )));
        }
        self.parameter_grid = grid;
        Ok(())
    }

    /// Generates the test-case templates for this relation. Fails fast on
    /// invalid generator parameters.
    pub fn generate_test_cases(
        &mut self,
        generator: &mut CaseGenerator,
    ) -> Result<(), MetamorphicError> {
        self.templates = generator.generate(
            &self.mr_id,
            &self.data,
            self.strategy,
            self.number_of_test_cases,
            self.number_of_sources,
            &self.parameter_grid,
        )?;
        Ok(())
    }

    pub fn templates(&self) -> &[TestCase] {
        &self.templates
    }

    // ------------------------------------------------------------------------
    // Set-once registration
    // ------------------------------------------------------------------------

    /// Registers the single-source transformation. Exactly one transform
    /// kind may ever be set; a second set of either kind fails.
    pub fn set_transformation(
        &mut self,
        name: impl Into<String>,
        f: TransformFn,
    ) -> Result<(), MetamorphicError> {
        match &self.transformation {
            Some(Transformation::Single { .. }) => Err(MetamorphicError::configuration(format!(
                "transformation has already been set on metamorphic relation {}",
                self.mr_id
            ))),
            Some(Transformation::General { .. }) => Err(MetamorphicError::configuration(format!(
                "cannot set transformation when a general transformation is already set on \
                 metamorphic relation {}",
                self.mr_id
            ))),
            None => {
                self.transformation = Some(Transformation::Single {
                    name: name.into(),
                    f,
                });
                Ok(())
            }
        }
    }

    /// Registers the general transformation. See [`Self::set_transformation`].
    pub fn set_general_transformation(
        &mut self,
        name: impl Into<String>,
        f: GeneralTransformFn,
    ) -> Result<(), MetamorphicError> {
        match &self.transformation {
            Some(Transformation::General { .. }) => Err(MetamorphicError::configuration(format!(
                "general transformation has already been set on metamorphic relation {}",
                self.mr_id
            ))),
            Some(Transformation::Single { .. }) => Err(MetamorphicError::configuration(format!(
                "cannot set general transformation when a transformation is already set on \
                 metamorphic relation {}",
                self.mr_id
            ))),
            None => {
                self.transformation = Some(Transformation::General {
                    name: name.into(),
                    f,
                });
                Ok(())
            }
        }
    }

    /// Registers the single-pair relation. Exactly one relation kind may
    /// ever be set; a second set of either kind fails.
    pub fn set_relation(
        &mut self,
        name: impl Into<String>,
        f: RelationFn,
    ) -> Result<(), MetamorphicError> {
        match &self.relation {
            Some(RelationCheck::Single { .. }) => Err(MetamorphicError::configuration(format!(
                "relation has already been set on metamorphic relation {}",
                self.mr_id
            ))),
            Some(RelationCheck::General { .. }) => Err(MetamorphicError::configuration(format!(
                "cannot set relation when a general relation is already set on metamorphic \
                 relation {}",
                self.mr_id
            ))),
            None => {
                self.relation = Some(RelationCheck::Single {
                    name: name.into(),
                    f,
                });
                Ok(())
            }
        }
    }

    /// Registers the general relation. See [`Self::set_relation`].
    pub fn set_general_relation(
        &mut self,
        name: impl Into<String>,
        f: GeneralRelationFn,
    ) -> Result<(), MetamorphicError> {
        match &self.relation {
            Some(RelationCheck::General { .. }) => Err(MetamorphicError::configuration(format!(
                "general relation has already been set on metamorphic relation {}",
                self.mr_id
            ))),
            Some(RelationCheck::Single { .. }) => Err(MetamorphicError::configuration(format!(
                "cannot set general relation when a relation is already set on metamorphic \
                 relation {}",
                self.mr_id
            ))),
            None => {
                self.relation = Some(RelationCheck::General {
                    name: name.into(),
                    f,
                });
                Ok(())
            }
        }
    }

    /// Adds a validity predicate. A test case is valid iff at least one
    /// registered predicate holds for every source output of the case.
    pub fn add_valid_input(&mut self, f: ValidInputFn) {
        self.valid_inputs.push(f);
    }

    /// Registers a system under test: clones the templates into a per-SUT
    /// case store, attaches the optional lazy data loader, and seeds the
    /// execution queue with every source input.
    ///
    /// A batch size of 0 is treated as unset (no batching).
    pub fn register_system(
        &mut self,
        sut_id: impl Into<SutId>,
        system: Arc<dyn System>,
        batch_size: Option<usize>,
        data_loader: Option<DataLoaderFn>,
    ) -> Result<(), MetamorphicError> {
        let sut_id = sut_id.into();
        if self.suts.contains_key(&sut_id) {
            return Err(MetamorphicError::configuration(format!(
                "system under test {sut_id} has already been set for metamorphic relation {}",
                self.mr_id
            )));
        }

        let mut store = CaseStore::from_templates(&self.templates);
        let mut queue = InputQueue::new();
        for id in store.ids() {
            store.get_mut(id).set_data_loader(data_loader.clone());
            for index in 0..store.get(id).source_inputs().len() {
                queue.push_back(QueueItem::new(id, index, Role::Source));
            }
        }

        self.sut_order.push(sut_id.clone());
        self.suts.insert(
            sut_id,
            SutState {
                system,
                batch_size: batch_size.filter(|&n| n > 0),
                store,
                queue,
            },
        );
        Ok(())
    }

    /// SUT ids in registration order.
    pub fn sut_ids(&self) -> Vec<SutId> {
        self.sut_order.clone()
    }

    pub fn case_ids(&self, sut_id: &str) -> Vec<CaseId> {
        self.suts
            .get(sut_id)
            .map(|state| state.store.ids().collect())
            .unwrap_or_default()
    }

    pub fn case(&self, sut_id: &str, id: CaseId) -> Option<&TestCase> {
        self.suts.get(sut_id).map(|state| state.store.get(id))
    }

    pub fn pending_inputs(&self, sut_id: &str) -> usize {
        self.suts.get(sut_id).map_or(0, |state| state.queue.len())
    }

    fn sut_state(&mut self, sut_id: &str) -> Result<&mut SutState, MetamorphicError> {
        let mr_id = self.mr_id.clone();
        self.suts.get_mut(sut_id).ok_or_else(|| {
            MetamorphicError::configuration(format!(
                "no system under test {sut_id} registered on metamorphic relation {mr_id}"
            ))
        })
    }

    // ------------------------------------------------------------------------
    // Batch scheduler
    // ------------------------------------------------------------------------

    /// Drains the queue for the given (test case, role) pair.
    ///
    /// Repeats while the queue still holds a matching item: collects up to
    /// batch-size matching items, tops the batch up from the front of the
    /// remaining queue with items of any other pending test case, and
    /// invokes the SUT once per assembled batch. On success each item's
    /// output slot is filled from the matching batch position. On failure
    /// every item of the batch is marked with a SUT execution error
    /// wrapping the original fault and the run aborts.
    ///
    /// After the drain, every test case whose source outputs just became
    /// complete is validity-checked and transformed, which enqueues its
    /// follow-up inputs.
    fn drain(&mut self, case: CaseId, sut_id: &str, role: Role) -> Result<(), MetamorphicError> {
        let mr_id = self.mr_id.clone();
        let state = self.sut_state(sut_id)?;
        let configured = state.batch_size;
        let batch_size = configured.unwrap_or(1);
        let system = Arc::clone(&state.system);
        let mut ran_items: Vec<QueueItem> = Vec::new();

        loop {
            let mut batch = state.queue.take_matching(case, role, batch_size);
            if batch.is_empty() {
                break;
            }
            while batch.len() < batch_size {
                match state.queue.pop_front() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }

            let result = if configured.is_some() {
                // Batched SUT calls cannot carry per-case parameters; the
                // SUT signature has no slot for them.
                if batch
                    .iter()
                    .any(|item| !state.store.get(item.case).parameters().is_empty())
                {
                    let error = MetamorphicError::configuration(format!(
                        "batch execution on metamorphic relation {mr_id} is incompatible with \
                         per-case SUT parameters"
                    ));
                    for item in &batch {
                        state.store.get_mut(item.case).set_error(error.clone());
                    }
                    return Err(error);
                }
                let inputs: Vec<Value> = batch.iter().map(|item| item.input(&state.store)).collect();
                let expected = inputs.len();
                system.call_batch(inputs).and_then(|outputs| {
                    if outputs.len() == expected {
                        Ok(outputs)
                    } else {
                        Err(MetamorphicError::configuration(format!(
                            "system under test {sut_id} returned {} outputs for a batch of {expected}",
                            outputs.len()
                        )))
                    }
                })
            } else {
                let input = batch[0].input(&state.store);
                system.call(input).map(|output| vec![output])
            };

            match result {
                Ok(outputs) => {
                    for (item, output) in batch.iter().zip(outputs) {
                        item.set_output(&mut state.store, output);
                    }
                    ran_items.extend(batch);
                }
                Err(fault) => {
                    let role_name = match role {
                        Role::Source => "source",
                        Role::Followup => "follow-up",
                    };
                    let sut_error = MetamorphicError::SutExecution {
                        message: format!(
                            "an error occurred on metamorphic relation {mr_id} while applying \
                             the system under test {sut_id} to the {role_name} input: {fault}"
                        ),
                        source: Some(Arc::new(fault)),
                    };
                    for item in &batch {
                        state.store.get_mut(item.case).set_error(sut_error.clone());
                    }
                    return Err(sut_error);
                }
            }
        }

        // Lifecycle advance: cases whose source outputs are now complete
        // get their validity check and transformation. Both are idempotent,
        // so items delivered as batch top-ups are handled exactly once.
        for item in ran_items {
            let complete = {
                let state = self.sut_state(sut_id)?;
                state.store.get(item.case).missing_source_outputs() == 0
            };
            if !complete {
                continue;
            }
            self.check_valid_input(item.case, sut_id)?;
            self.apply_transformation(item.case, sut_id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------------

    /// Executes the SUT for the pending source inputs of the test case.
    /// No-op if every source output is already present.
    pub fn create_source_outputs(
        &mut self,
        case: CaseId,
        sut_id: &str,
    ) -> Result<(), MetamorphicError> {
        {
            let state = self.sut_state(sut_id)?;
            if let Err(e) = state.store.get_mut(case).process_source_inputs() {
                state.store.get_mut(case).set_error(e.clone());
                if e.is_fatal() {
                    return Err(e);
                }
                return Ok(());
            }
            if state.store.get(case).missing_source_outputs() == 0 {
                return Ok(());
            }
        }
        self.drain(case, sut_id, Role::Source)
    }

    /// Executes the SUT for the pending follow-up inputs of the test case.
    /// Entirely skipped when the case is already in an error state.
    pub fn create_followup_outputs(
        &mut self,
        case: CaseId,
        sut_id: &str,
    ) -> Result<(), MetamorphicError> {
        {
            let state = self.sut_state(sut_id)?;
            let case_ref = state.store.get(case);
            if case_ref.error().is_some() || case_ref.missing_followup_outputs() == 0 {
                return Ok(());
            }
        }
        self.drain(case, sut_id, Role::Followup)
    }

    /// Runs the validity gate once per test case, after all source outputs
    /// are present. With no registered predicates every case is valid;
    /// otherwise the case is valid iff at least one predicate returns true
    /// for every source output.
    pub fn check_valid_input(
        &mut self,
        case: CaseId,
        sut_id: &str,
    ) -> Result<(), MetamorphicError> {
        let mr_id = self.mr_id.clone();
        let predicate_count = self.valid_inputs.len();
        let valid_inputs = self.valid_inputs.clone();
        let state = self.sut_state(sut_id)?;
        let case_ref = state.store.get(case);

        if case_ref.is_validated() || case_ref.error().is_some() {
            return Ok(());
        }
        debug_assert_eq!(case_ref.missing_source_outputs(), 0);

        let outputs = case_ref.source_output_values();
        let inputs = case_ref.source_inputs();
        state.store.get_mut(case).mark_validated();

        if predicate_count == 0 {
            return Ok(());
        }

        let valid = valid_inputs
            .iter()
            .any(|predicate| outputs.iter().all(|output| predicate(output)));

        if !valid {
            let render = |values: &[Value]| {
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            state
                .store
                .get_mut(case)
                .set_error(MetamorphicError::invalid_input(format!(
                    "the input of the current test case on metamorphic relation {mr_id} is not \
                     valid. source inputs: [{}], source outputs: [{}]. the input must satisfy at \
                     least one of the {predicate_count} registered valid input predicate(s)",
                    render(&inputs),
                    render(&outputs),
                )));
        }
        Ok(())
    }

    /// Applies the registered transformation to derive follow-up inputs,
    /// unwrapping any fixed/randomized parameterization, and enqueues the
    /// new inputs into the SUT's queue.
    ///
    /// An explicit skip request aborts only this test case; any other fault
    /// is a fatal transformation error.
    pub fn apply_transformation(
        &mut self,
        case: CaseId,
        sut_id: &str,
    ) -> Result<(), MetamorphicError> {
        let mr_id = self.mr_id.clone();
        {
            let state = self.sut_state(sut_id)?;
            let case_ref = state.store.get(case);
            if case_ref.error().is_some() || case_ref.has_followup_inputs() {
                return Ok(());
            }
        }

        let (transformation_name, call) = match &self.transformation {
            None => {
                return Err(MetamorphicError::configuration(format!(
                    "no transformation registered on metamorphic relation {mr_id}"
                )))
            }
            Some(Transformation::Single { name, f }) => {
                (name.clone(), TransformCall::Single(Arc::clone(f)))
            }
            Some(Transformation::General { name, f }) => {
                (name.clone(), TransformCall::General(Arc::clone(f)))
            }
        };

        let snapshot = self.sut_state(sut_id)?.store.get(case).clone();

        // The single-source form is only legal for 1-to-1 relations with no
        // SUT parameter grid.
        if matches!(call, TransformCall::Single(_)) {
            if !self.parameter_grid.is_empty() {
                return Err(MetamorphicError::configuration(format!(
                    "cannot add SUT parameters when using a single-source transformation on \
                     metamorphic relation {mr_id}"
                )));
            }
            if snapshot.source_inputs().len() != 1 {
                return Err(MetamorphicError::configuration(format!(
                    "a single-source transformation requires exactly one source input on \
                     metamorphic relation {mr_id}"
                )));
            }
        }

        let result = match call {
            TransformCall::Single(f) => snapshot
                .source_input()
                .and_then(|input| f(input, ParamMap::new())),
            TransformCall::General(f) => f(&snapshot, ParamMap::new()),
        };

        let state = self.sut_state(sut_id)?;
        let value = match result {
            Ok(value) => value,
            Err(e) if e.kind() == ErrorKind::Skipped => {
                state.store.get_mut(case).set_error(e);
                return Ok(());
            }
            Err(fault) => {
                let error = MetamorphicError::Transformation {
                    message: format!(
                        "an error occurred on metamorphic relation {mr_id} while applying the \
                         transformation {transformation_name}: {fault}"
                    ),
                    source: Some(Arc::new(fault)),
                };
                state.store.get_mut(case).set_error(error.clone());
                return Err(error);
            }
        };

        match unwrap_result(value) {
            Unwrapped::Plain(followups) => {
                state.store.get_mut(case).assign_followup_inputs(followups);
            }
            Unwrapped::Wrapped {
                value,
                kwargs,
                parameterized,
            } => {
                state.store.get_mut(case).assign_followup_inputs(value);
                if parameterized {
                    state.store.get_mut(case).merge_parameters(kwargs)?;
                }
            }
        }

        for index in 0..state.store.get(case).followup_inputs().len() {
            state
                .queue
                .push_back(QueueItem::new(case, index, Role::Followup));
        }
        Ok(())
    }

    /// Applies the registered relation and stores its boolean result.
    /// Any fault is a fatal relation error; an explicit skip request
    /// aborts only this test case.
    pub fn apply_relation(&mut self, case: CaseId, sut_id: &str) -> Result<(), MetamorphicError> {
        let mr_id = self.mr_id.clone();
        {
            let state = self.sut_state(sut_id)?;
            if state.store.get(case).error().is_some() {
                return Ok(());
            }
        }

        let (relation_name, call) = match &self.relation {
            None => {
                return Err(MetamorphicError::configuration(format!(
                    "no relation registered on metamorphic relation {mr_id}"
                )))
            }
            Some(RelationCheck::Single { name, f }) => {
                (name.clone(), RelationCall::Single(Arc::clone(f)))
            }
            Some(RelationCheck::General { name, f }) => {
                (name.clone(), RelationCall::General(Arc::clone(f)))
            }
        };

        let snapshot = self.sut_state(sut_id)?.store.get(case).clone();

        if matches!(call, RelationCall::Single(_)) {
            if !self.parameter_grid.is_empty() {
                return Err(MetamorphicError::configuration(format!(
                    "cannot add SUT parameters when using a single-pair relation on metamorphic \
                     relation {mr_id}"
                )));
            }
            if snapshot.source_outputs().len() != 1 {
                return Err(MetamorphicError::configuration(format!(
                    "a single-pair relation requires exactly one source output on metamorphic \
                     relation {mr_id}"
                )));
            }
            if snapshot.followup_outputs().len() != 1 {
                return Err(MetamorphicError::configuration(format!(
                    "a single-pair relation requires exactly one followup output on metamorphic \
                     relation {mr_id}"
                )));
            }
        }

        let result = match call {
            RelationCall::Single(f) => {
                let source_output = snapshot.source_output()?.ok_or_else(|| {
                    MetamorphicError::configuration(format!(
                        "relation applied before the source output was computed on metamorphic \
                         relation {mr_id}"
                    ))
                })?;
                let followup_output = snapshot.followup_output()?.ok_or_else(|| {
                    MetamorphicError::configuration(format!(
                        "relation applied before the followup output was computed on metamorphic \
                         relation {mr_id}"
                    ))
                })?;
                f(source_output, followup_output, ParamMap::new())
            }
            RelationCall::General(f) => f(&snapshot, ParamMap::new()),
        };

        let state = self.sut_state(sut_id)?;
        match result {
            Ok(value) => {
                let outcome = unwrap_result(value).into_value();
                if let Err(e) = state.store.get_mut(case).set_relation_result(outcome) {
                    let error = MetamorphicError::Relation {
                        message: format!(
                            "an error occurred on metamorphic relation {mr_id} while applying \
                             the relation {relation_name}: {e}"
                        ),
                        source: Some(Arc::new(e)),
                    };
                    state.store.get_mut(case).set_error(error.clone());
                    return Err(error);
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Skipped => {
                state.store.get_mut(case).set_error(e);
                Ok(())
            }
            Err(fault) => {
                let error = MetamorphicError::Relation {
                    message: format!(
                        "an error occurred on metamorphic relation {mr_id} while applying the \
                         relation {relation_name}: {fault}"
                    ),
                    source: Some(Arc::new(fault)),
                };
                state.store.get_mut(case).set_error(error.clone());
                Err(error)
            }
        }
    }

    /// Builds and stores the finalized execution report for a test case.
    /// Runs unconditionally, including after early failures.
    pub fn finalize_report(&mut self, case: CaseId, sut_id: &str) {
        let transformation_name = self
            .transformation
            .as_ref()
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let relation_name = self
            .relation
            .as_ref()
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let mr_id = self.mr_id.clone();

        if let Some(state) = self.suts.get_mut(sut_id) {
            let report = ExecutionReport::finalize(
                state.store.get(case),
                &mr_id,
                sut_id,
                &transformation_name,
                &relation_name,
            );
            state.store.get_mut(case).set_report(report);
        }
    }

    /// Runs the full lifecycle for one test case against one SUT and
    /// classifies the outcome.
    ///
    /// The finalized report is built regardless of how the lifecycle ended.
    /// Fatal errors are returned as `Err` so the host aborts the run;
    /// recoverable errors become [`TestOutcome::Skipped`].
    pub fn execute(&mut self, case: CaseId, sut_id: &str) -> Result<TestOutcome, MetamorphicError> {
        let result = self.run_lifecycle(case, sut_id);
        self.finalize_report(case, sut_id);
        result?;

        let state = self.sut_state(sut_id)?;
        let case_ref = state.store.get(case);
        match case_ref.error() {
            Some(e) if e.is_recoverable() => Ok(TestOutcome::Skipped(e.to_string())),
            Some(e) => Err(e.clone()),
            None => {
                if case_ref.relation_result() {
                    Ok(TestOutcome::Pass)
                } else {
                    Ok(TestOutcome::Fail)
                }
            }
        }
    }

    fn run_lifecycle(&mut self, case: CaseId, sut_id: &str) -> Result<(), MetamorphicError> {
        self.create_source_outputs(case, sut_id)?;
        self.create_followup_outputs(case, sut_id)?;
        self.apply_relation(case, sut_id)
    }
}
