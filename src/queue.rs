//! Execution queue for pending SUT inputs.
//!
//! The queue never owns test cases. It holds [`QueueItem`] handles carrying
//! a [`CaseId`] into a [`CaseStore`] arena plus the index of one input slot,
//! so removing an item from the queue never destroys a test case and no
//! reference cycles can form between the two.
//!
//! An item leaves the queue exactly once, at selection into a batch, never
//! at execution time. Re-entrant drains therefore cannot double-count it.

use std::collections::VecDeque;

use crate::case::TestCase;
use crate::value::Value;

/// Handle into a [`CaseStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseId(pub usize);

/// Whether a queue item refers to a source input or a follow-up input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Source,
    Followup,
}

/// Arena of test cases for one (relation, SUT) pair. The queue and the
/// relation engine both address cases through [`CaseId`] handles.
#[derive(Debug, Default, Clone)]
pub struct CaseStore {
    cases: Vec<TestCase>,
}

impl CaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the given templates into a fresh store.
    pub fn from_templates(templates: &[TestCase]) -> Self {
        Self {
            cases: templates.to_vec(),
        }
    }

    pub fn push(&mut self, case: TestCase) -> CaseId {
        self.cases.push(case);
        CaseId(self.cases.len() - 1)
    }

    pub fn get(&self, id: CaseId) -> &TestCase {
        &self.cases[id.0]
    }

    pub fn get_mut(&mut self, id: CaseId) -> &mut TestCase {
        &mut self.cases[id.0]
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = CaseId> {
        (0..self.cases.len()).map(CaseId)
    }
}

/// One pending SUT input: a back-reference to its owning test case, the
/// index of the input within that case, and the role of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueItem {
    pub case: CaseId,
    pub index: usize,
    pub role: Role,
}

impl QueueItem {
    pub fn new(case: CaseId, index: usize, role: Role) -> Self {
        Self { case, index, role }
    }

    /// The input value this item stands for.
    pub fn input(&self, store: &CaseStore) -> Value {
        match self.role {
            Role::Source => store.get(self.case).source_input_at(self.index),
            Role::Followup => store.get(self.case).followup_input_at(self.index),
        }
    }

    /// Delivers an output into the slot this item stands for.
    pub fn set_output(&self, store: &mut CaseStore, value: Value) {
        match self.role {
            Role::Source => store.get_mut(self.case).set_source_output_at(self.index, value),
            Role::Followup => store
                .get_mut(self.case)
                .set_followup_output_at(self.index, value),
        }
    }
}

/// FIFO queue of pending inputs for one SUT.
#[derive(Debug, Default, Clone)]
pub struct InputQueue {
    items: VecDeque<QueueItem>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    pub fn pop_front(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes and returns up to `max_items` queued items belonging to the
    /// given (test case, role) pair, in queue order. Items are removed at
    /// selection time; they never re-enter the queue.
    pub fn take_matching(&mut self, case: CaseId, role: Role, max_items: usize) -> Vec<QueueItem> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.items.len());

        while let Some(item) = self.items.pop_front() {
            if taken.len() < max_items && item.case == case && item.role == role {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }

        self.items = kept;
        taken
    }
}
