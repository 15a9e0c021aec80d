//! Test-case generation: turns a data source, a sampling strategy, and an
//! optional parameter grid into the list of unexecuted test-case templates
//! for one metamorphic relation.
//!
//! Templates come out in a stable, deterministic order (subsets first, grid
//! permutations nested inside), which is what gives test cases reproducible
//! numbering across runs.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

use crate::case::TestCase;
use crate::errors::MetamorphicError;
use crate::value::{ParamMap, Value};

/// Strategy for metamorphic test case creation.
///
/// `Sample` draws a requested number of random source subsets from the data.
/// `Exhaustive` creates a test case for every possible r-subset; the count
/// grows as C(n, r), so use it with care for r > 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestingStrategy {
    Exhaustive,
    Sample,
}

/// Ordered parameter grid: name -> candidate values. Insertion order is the
/// expansion order, which keeps template numbering deterministic.
#[derive(Debug, Clone, Default)]
pub struct ParameterGrid {
    entries: Vec<(String, Vec<Value>)>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter with its candidate values. Duplicate names are a
    /// configuration error.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), MetamorphicError> {
        let name = name.into();
        if self.entries.iter().any(|(n, _)| *n == name) {
            return Err(MetamorphicError::configuration(format!(
                "parameter '{name}' is already present in the grid"
            )));
        }
        self.entries.push((name, values));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expands the grid into all parameter permutations via cartesian
    /// product. An empty grid yields exactly one empty map.
    pub fn permutations(&self) -> Vec<ParamMap> {
        let mut maps = vec![ParamMap::new()];
        for (name, values) in &self.entries {
            let mut next = Vec::with_capacity(maps.len() * values.len());
            for map in &maps {
                for value in values {
                    let mut extended = map.clone();
                    extended.insert(name.clone(), value.clone());
                    next.push(extended);
                }
            }
            maps = next;
        }
        maps
    }
}

/// Number of r-subsets of an n-element set, saturating at `u128::MAX`.
pub fn binomial(n: usize, r: usize) -> u128 {
    if r > n {
        return 0;
    }
    if r == 1 {
        return n as u128;
    }
    let r = r.min(n - r);
    let mut result: u128 = 1;
    for i in 1..=r {
        result = result
            .saturating_mul((n - r + i) as u128)
            .saturating_div(i as u128);
    }
    result
}

/// Generates test-case templates for one metamorphic relation.
///
/// Holds the RNG used by the `Sample` strategy; seed it explicitly for
/// reproducible sampling.
pub struct CaseGenerator {
    rng: Xoshiro256StarStar,
}

impl Default for CaseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseGenerator {
    pub fn new() -> Self {
        Self {
            rng: Xoshiro256StarStar::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        }
    }

    /// Builds the template list: one template per (source subset, parameter
    /// permutation) pair. Fails fast with a configuration error on invalid
    /// generator parameters.
    pub fn generate(
        &mut self,
        mr_id: &str,
        data: &[Value],
        strategy: TestingStrategy,
        number_of_test_cases: usize,
        number_of_sources: usize,
        grid: &ParameterGrid,
    ) -> Result<Vec<TestCase>, MetamorphicError> {
        let n = data.len();
        let r = number_of_sources;
        let k = number_of_test_cases;

        if data.is_empty() {
            return Err(MetamorphicError::configuration(format!(
                "the provided data for {mr_id} is empty"
            )));
        }
        if k == 0 {
            return Err(MetamorphicError::configuration(format!(
                "number of test cases for {mr_id} must be at least 1"
            )));
        }
        if r == 0 {
            return Err(MetamorphicError::configuration(format!(
                "number of sources for {mr_id} must be at least 1"
            )));
        }
        if r > n {
            return Err(MetamorphicError::configuration(format!(
                "number of sources for {mr_id} is larger than the number of elements \
                 in the provided dataset"
            )));
        }
        if strategy == TestingStrategy::Sample && k as u128 > binomial(n, r) {
            return Err(MetamorphicError::configuration(format!(
                "you want to run more test cases for {mr_id} than there are possible \
                 source combinations in the provided data"
            )));
        }

        let permutations = grid.permutations();
        let subsets = match strategy {
            TestingStrategy::Sample => self.sample_subsets(data, k, r),
            TestingStrategy::Exhaustive => enumerate_combinations(data, r),
        };

        let mut templates = Vec::with_capacity(subsets.len() * permutations.len());
        for subset in subsets {
            for permutation in &permutations {
                let mut case = TestCase::new();
                case.assign_source_inputs(Value::List(subset.clone()));
                case.set_parameters(permutation.clone());
                templates.push(case);
            }
        }
        Ok(templates)
    }

    /// Draws `k` independent random r-subsets. Each draw is without internal
    /// replacement, but subsets may repeat across draws; there is no global
    /// dedup.
    fn sample_subsets(&mut self, data: &[Value], k: usize, r: usize) -> Vec<Vec<Value>> {
        (0..k)
            .map(|_| {
                sample(&mut self.rng, data.len(), r)
                    .into_iter()
                    .map(|i| data[i].clone())
                    .collect()
            })
            .collect()
    }
}

/// Enumerates all r-combinations of `data` in lexicographic index order;
/// within each subset the elements keep their original data order.
fn enumerate_combinations(data: &[Value], r: usize) -> Vec<Vec<Value>> {
    let n = data.len();
    let mut result = Vec::new();
    let mut indices: Vec<usize> = (0..r).collect();

    loop {
        result.push(indices.iter().map(|&i| data[i].clone()).collect());

        // Advance to the next combination, rightmost index first.
        let mut i = r;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if indices[i] != i + n - r {
                break;
            }
        }
        indices[i] += 1;
        for j in i + 1..r {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod generator_tests {
    use super::*;

    fn numbers(n: usize) -> Vec<Value> {
        (0..n).map(|i| Value::Number(i as f64)).collect()
    }

    #[test]
    fn binomial_basics() {
        assert_eq!(binomial(5, 1), 5);
        assert_eq!(binomial(5, 2), 10);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(52, 5), 2_598_960);
    }

    #[test]
    fn exhaustive_produces_binomial_times_grid() {
        let mut grid = ParameterGrid::new();
        grid.insert("x", vec![Value::Number(1.0), Value::Number(2.0)])
            .unwrap();
        grid.insert("y", vec![Value::Number(3.0), Value::Number(4.0)])
            .unwrap();

        let mut gen = CaseGenerator::with_seed(7);
        let templates = gen
            .generate("mr1", &numbers(5), TestingStrategy::Exhaustive, 1, 2, &grid)
            .unwrap();
        // C(5, 2) = 10 subsets, grid of size 4.
        assert_eq!(templates.len(), 40);
    }

    #[test]
    fn sample_produces_k_times_grid() {
        let mut grid = ParameterGrid::new();
        grid.insert("x", vec![Value::Number(1.0), Value::Number(2.0)])
            .unwrap();

        let mut gen = CaseGenerator::with_seed(7);
        let templates = gen
            .generate("mr1", &numbers(100), TestingStrategy::Sample, 6, 2, &grid)
            .unwrap();
        assert_eq!(templates.len(), 12);
    }

    #[test]
    fn empty_grid_yields_one_empty_permutation() {
        let grid = ParameterGrid::new();
        assert_eq!(grid.permutations(), vec![ParamMap::new()]);
    }

    #[test]
    fn grid_permutations_are_the_cartesian_product() {
        let mut grid = ParameterGrid::new();
        grid.insert("x", vec![Value::Number(1.0), Value::Number(2.0)])
            .unwrap();
        grid.insert("y", vec![Value::Number(3.0), Value::Number(4.0)])
            .unwrap();

        let perms = grid.permutations();
        assert_eq!(perms.len(), 4);
        assert_eq!(perms[0].get("x"), Some(&Value::Number(1.0)));
        assert_eq!(perms[0].get("y"), Some(&Value::Number(3.0)));
        assert_eq!(perms[3].get("x"), Some(&Value::Number(2.0)));
        assert_eq!(perms[3].get("y"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn duplicate_grid_name_is_a_configuration_error() {
        let mut grid = ParameterGrid::new();
        grid.insert("x", vec![Value::Number(1.0)]).unwrap();
        assert!(grid.insert("x", vec![Value::Number(2.0)]).is_err());
    }

    #[test]
    fn generation_validation_failures() {
        let mut gen = CaseGenerator::with_seed(1);
        let grid = ParameterGrid::new();

        // Empty data.
        assert!(gen
            .generate("mr1", &[], TestingStrategy::Sample, 1, 1, &grid)
            .is_err());
        // Zero test cases.
        assert!(gen
            .generate("mr1", &numbers(10), TestingStrategy::Sample, 0, 1, &grid)
            .is_err());
        // Zero sources.
        assert!(gen
            .generate("mr1", &numbers(10), TestingStrategy::Sample, 1, 0, &grid)
            .is_err());
        // More sources than data points.
        assert!(gen
            .generate("mr1", &numbers(3), TestingStrategy::Sample, 1, 4, &grid)
            .is_err());
        // More samples than possible subsets: C(4, 2) = 6 < 7.
        assert!(gen
            .generate("mr1", &numbers(4), TestingStrategy::Sample, 7, 2, &grid)
            .is_err());
        // Exactly the limit is fine.
        assert!(gen
            .generate("mr1", &numbers(4), TestingStrategy::Sample, 6, 2, &grid)
            .is_ok());
    }

    #[test]
    fn exhaustive_subsets_keep_data_order() {
        let mut gen = CaseGenerator::with_seed(1);
        let grid = ParameterGrid::new();
        let templates = gen
            .generate("mr1", &numbers(4), TestingStrategy::Exhaustive, 1, 2, &grid)
            .unwrap();
        assert_eq!(templates.len(), 6);
        assert_eq!(
            templates[0].source_inputs(),
            vec![Value::Number(0.0), Value::Number(1.0)]
        );
        assert_eq!(
            templates[5].source_inputs(),
            vec![Value::Number(2.0), Value::Number(3.0)]
        );
    }

    #[test]
    fn sampling_is_reproducible_with_a_seed() {
        let grid = ParameterGrid::new();
        let a = CaseGenerator::with_seed(42)
            .generate("mr1", &numbers(50), TestingStrategy::Sample, 5, 3, &grid)
            .unwrap();
        let b = CaseGenerator::with_seed(42)
            .generate("mr1", &numbers(50), TestingStrategy::Sample, 5, 3, &grid)
            .unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.source_inputs(), y.source_inputs());
        }
    }
}
