//! Suite-level registry of metamorphic relations.
//!
//! A [`Suite`] is an explicit, host-owned object rather than ambient global
//! state: constructing two suites gives two fully independent registries.
//! Relations are registered through [`RelationBuilder`], which carries the
//! documented defaults (exhaustive strategy, one test case, one source) and
//! fails fast on identifier collisions.

use std::collections::HashMap;

use crate::errors::MetamorphicError;
use crate::generator::{CaseGenerator, ParameterGrid, TestingStrategy};
use crate::relation::{MetamorphicRelation, MrId};
use crate::value::Value;

/// Declarative description of one relation, turned into a registered
/// [`MetamorphicRelation`] by [`Suite::add`].
pub struct RelationBuilder {
    mr_id: MrId,
    data: Vec<Value>,
    strategy: TestingStrategy,
    number_of_test_cases: usize,
    number_of_sources: usize,
    parameters: Vec<(String, Vec<Value>)>,
}

impl RelationBuilder {
    pub fn new(mr_id: impl Into<MrId>, data: Vec<Value>) -> Self {
        Self {
            mr_id: mr_id.into(),
            data,
            strategy: TestingStrategy::Exhaustive,
            number_of_test_cases: 1,
            number_of_sources: 1,
            parameters: Vec::new(),
        }
    }

    pub fn strategy(mut self, strategy: TestingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn test_cases(mut self, count: usize) -> Self {
        self.number_of_test_cases = count;
        self
    }

    pub fn sources(mut self, count: usize) -> Self {
        self.number_of_sources = count;
        self
    }

    /// Adds one SUT parameter with its candidate values. Duplicate names are
    /// detected when the relation is added to the suite, so the builder
    /// chain stays infallible.
    pub fn parameter(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.parameters.push((name.into(), values));
        self
    }
}

/// Host-owned registry of relations sharing one template generator.
pub struct Suite {
    relations: Vec<MetamorphicRelation>,
    index: HashMap<MrId, usize>,
    generator: CaseGenerator,
}

impl Default for Suite {
    fn default() -> Self {
        Self::new()
    }
}

impl Suite {
    pub fn new() -> Self {
        Self {
            relations: Vec::new(),
            index: HashMap::new(),
            generator: CaseGenerator::new(),
        }
    }

    /// A suite with a seeded template generator, for reproducible sampling.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            relations: Vec::new(),
            index: HashMap::new(),
            generator: CaseGenerator::with_seed(seed),
        }
    }

    /// Registers a relation and generates its test-case templates.
    /// Duplicate relation identifiers are a configuration error.
    pub fn add(
        &mut self,
        builder: RelationBuilder,
    ) -> Result<&mut MetamorphicRelation, MetamorphicError> {
        if self.index.contains_key(&builder.mr_id) {
            return Err(MetamorphicError::configuration(format!(
                "a metamorphic relation named {} already exists in this suite",
                builder.mr_id
            )));
        }

        let mut grid = ParameterGrid::new();
        for (name, values) in builder.parameters {
            grid.insert(name, values)?;
        }

        let mut relation = MetamorphicRelation::new(
            builder.mr_id.clone(),
            builder.data,
            builder.strategy,
            builder.number_of_test_cases,
            builder.number_of_sources,
        );
        relation.set_parameter_grid(grid)?;
        relation.generate_test_cases(&mut self.generator)?;

        let slot = self.relations.len();
        self.index.insert(builder.mr_id, slot);
        self.relations.push(relation);
        Ok(&mut self.relations[slot])
    }

    pub fn relation(&self, mr_id: &str) -> Option<&MetamorphicRelation> {
        self.index.get(mr_id).map(|&i| &self.relations[i])
    }

    pub fn relation_mut(&mut self, mr_id: &str) -> Option<&mut MetamorphicRelation> {
        self.index.get(mr_id).map(|&i| &mut self.relations[i])
    }

    /// Relations in registration order.
    pub fn relations(&self) -> impl Iterator<Item = &MetamorphicRelation> {
        self.relations.iter()
    }

    pub fn relations_mut(&mut self) -> impl Iterator<Item = &mut MetamorphicRelation> {
        self.relations.iter_mut()
    }

    pub fn relation_ids(&self) -> Vec<MrId> {
        self.relations.iter().map(|r| r.mr_id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod suite_tests {
    use super::*;

    fn numbers(n: usize) -> Vec<Value> {
        (1..=n).map(|i| Value::Number(i as f64)).collect()
    }

    #[test]
    fn builder_defaults_are_exhaustive_one_case_one_source() {
        let mut suite = Suite::with_seed(5);
        let relation = suite
            .add(RelationBuilder::new("mr1", numbers(4)))
            .unwrap();
        // Exhaustive with r = 1 over 4 data points.
        assert_eq!(relation.templates().len(), 4);
    }

    #[test]
    fn duplicate_relation_name_fails() {
        let mut suite = Suite::with_seed(5);
        suite.add(RelationBuilder::new("mr1", numbers(4))).unwrap();
        let err = suite
            .add(RelationBuilder::new("mr1", numbers(4)))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn relations_keep_registration_order() {
        let mut suite = Suite::with_seed(5);
        suite.add(RelationBuilder::new("mr_b", numbers(2))).unwrap();
        suite.add(RelationBuilder::new("mr_a", numbers(2))).unwrap();
        assert_eq!(suite.relation_ids(), vec!["mr_b", "mr_a"]);
    }

    #[test]
    fn parameter_grid_multiplies_templates() {
        let mut suite = Suite::with_seed(5);
        let relation = suite
            .add(
                RelationBuilder::new("mr1", numbers(3))
                    .parameter("n", vec![Value::Number(1.0), Value::Number(2.0)]),
            )
            .unwrap();
        // 3 subsets times a grid of 2.
        assert_eq!(relation.templates().len(), 6);
    }

    #[test]
    fn duplicate_parameter_name_fails_at_add() {
        let mut suite = Suite::with_seed(5);
        let err = suite
            .add(
                RelationBuilder::new("mr1", numbers(2))
                    .parameter("n", vec![Value::Number(1.0)])
                    .parameter("n", vec![Value::Number(2.0)]),
            )
            .unwrap_err();
        assert!(err.to_string().contains("already present"));
    }

    #[test]
    fn invalid_generation_parameters_surface_at_add() {
        let mut suite = Suite::with_seed(5);
        let err = suite
            .add(RelationBuilder::new("mr1", numbers(2)).sources(5))
            .unwrap_err();
        assert!(err.to_string().contains("number of sources"));
    }
}
