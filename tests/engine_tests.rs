//! End-to-end engine tests: batch scheduling, parameterized relations,
//! multi-source relations, and lazy data loading through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metamorph::errors::MetamorphicError;
use metamorph::loader::standard_loader;
use metamorph::params::{fixed_transform, GeneralRelationFn, GeneralTransformFn};
use metamorph::relations::equality;
use metamorph::runner::{run_suite, RunConfig};
use metamorph::suite::RelationBuilder;
use metamorph::{BatchFnSystem, ErrorKind, FnSystem, Suite, System, Value};

fn numbers(n: usize) -> Vec<Value> {
    (1..=n).map(|i| Value::Number(i as f64)).collect()
}

fn quiet() -> RunConfig {
    RunConfig {
        use_colors: false,
        quiet: true,
    }
}

/// Batched SUT doubling each input, counting how often it is invoked.
fn counting_doubler(calls: Arc<AtomicUsize>) -> Arc<dyn System> {
    Arc::new(BatchFnSystem(move |inputs: Vec<Value>| {
        calls.fetch_add(1, Ordering::SeqCst);
        inputs
            .into_iter()
            .map(|v| {
                let x = v
                    .as_number()
                    .ok_or_else(|| MetamorphicError::invalid_input("expected a number"))?;
                Ok(Value::Number(x * 2.0))
            })
            .collect()
    }))
}

#[test]
fn batching_amortizes_sut_calls_across_test_cases() {
    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(RelationBuilder::new("mr_double", numbers(64)))
        .unwrap();
    relation
        .set_transformation(
            "negate",
            Arc::new(|input, _| Ok(Value::Number(-input.as_number().unwrap_or(0.0)))),
        )
        .unwrap();
    // f(-x) == -f(x) for a linear SUT.
    relation
        .set_relation(
            "negated_equality",
            Arc::new(|f_x, f_xt, _| {
                let a = f_x.as_number().unwrap_or(0.0);
                let b = f_xt.as_number().unwrap_or(0.0);
                Ok(Value::Bool(a == -b))
            }),
        )
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    relation
        .register_system("doubler", counting_doubler(Arc::clone(&calls)), Some(16), None)
        .unwrap();

    let summary = run_suite(&mut suite, &quiet()).unwrap();
    assert_eq!(summary.passed, 64);
    assert_eq!(summary.failed, 0);

    // 64 source inputs plus 64 follow-up inputs, processed 16 at a time.
    // Batch top-up keeps every batch full, so exactly 128 / 16 invocations.
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[test]
fn source_drain_advances_a_full_batch_of_cases() {
    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(RelationBuilder::new("mr_double", numbers(64)))
        .unwrap();
    relation
        .set_transformation("identity", Arc::new(|input, _| Ok(input)))
        .unwrap();
    relation.set_relation("equality", equality()).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    relation
        .register_system("doubler", counting_doubler(Arc::clone(&calls)), Some(16), None)
        .unwrap();

    let relation = suite.relation_mut("mr_double").unwrap();
    let ids = relation.case_ids("doubler");

    // Draining the first case pulls 15 top-ups along with it: one SUT call
    // completes the source outputs of the first 16 cases.
    relation.create_source_outputs(ids[0], "doubler").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for &id in &ids[..16] {
        assert_eq!(
            relation.case("doubler", id).unwrap().missing_source_outputs(),
            0
        );
    }
    assert_eq!(
        relation.case("doubler", ids[16]).unwrap().missing_source_outputs(),
        1
    );

    // The second case was already served as a top-up: zero further calls.
    relation.create_source_outputs(ids[1], "doubler").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The seventeenth case starts the next batch.
    relation.create_source_outputs(ids[16], "doubler").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn batch_failure_poisons_only_the_failing_batch() {
    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(RelationBuilder::new("mr_broken", numbers(3)))
        .unwrap();
    relation
        .set_transformation("identity", Arc::new(|input, _| Ok(input)))
        .unwrap();
    relation.set_relation("equality", equality()).unwrap();
    relation
        .register_system(
            "faulty",
            Arc::new(BatchFnSystem(|_: Vec<Value>| {
                Err(MetamorphicError::configuration("device unavailable"))
            })),
            Some(2),
            None,
        )
        .unwrap();

    let err = run_suite(&mut suite, &quiet()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SutExecution);
    assert!(err.original_fault().is_some());

    // The 2-wide batch held the first two cases; the third was never run.
    let relation = suite.relation("mr_broken").unwrap();
    let ids = relation.case_ids("faulty");
    assert_eq!(
        relation.case("faulty", ids[0]).unwrap().error().unwrap().kind(),
        ErrorKind::SutExecution
    );
    assert_eq!(
        relation.case("faulty", ids[1]).unwrap().error().unwrap().kind(),
        ErrorKind::SutExecution
    );
    assert!(relation.case("faulty", ids[2]).unwrap().error().is_none());

    // Reports exist for the poisoned cases regardless.
    assert!(relation.case("faulty", ids[0]).unwrap().report().is_some());
}

#[test]
fn multi_source_relation_with_parameter_grid() {
    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(
            RelationBuilder::new("mr_sum_shift", numbers(4))
                .sources(2)
                .parameter("n", vec![Value::Number(1.0), Value::Number(2.0)]),
        )
        .unwrap();

    // Shift every source input by the grid parameter n.
    let transform: GeneralTransformFn = Arc::new(|case, _| {
        let n = case
            .parameters()
            .get("n")
            .and_then(Value::as_number)
            .ok_or_else(|| MetamorphicError::configuration("missing parameter n"))?;
        let shifted = case
            .source_inputs()
            .into_iter()
            .map(|v| Value::Number(v.as_number().unwrap_or(0.0) + n))
            .collect();
        Ok(Value::List(shifted))
    });
    relation
        .set_general_transformation("shift_by_n", transform)
        .unwrap();

    // For a linear SUT f(x) = 2x the output sums differ by exactly 2rn.
    let check: GeneralRelationFn = Arc::new(|case, _| {
        let n = case
            .parameters()
            .get("n")
            .and_then(Value::as_number)
            .ok_or_else(|| MetamorphicError::configuration("missing parameter n"))?;
        let sum = |values: Vec<Value>| -> f64 {
            values.iter().filter_map(Value::as_number).sum()
        };
        let source_sum = sum(case.source_output_values());
        let followup_sum = sum(case.followup_output_values());
        let r = case.source_inputs().len() as f64;
        Ok(Value::Bool(
            (followup_sum - source_sum - 2.0 * n * r).abs() < 1e-9,
        ))
    });
    relation.set_general_relation("sum_shift", check).unwrap();

    relation
        .register_system(
            "doubler",
            Arc::new(FnSystem(|input: Value| {
                Ok(Value::Number(input.as_number().unwrap_or(0.0) * 2.0))
            })),
            None,
            None,
        )
        .unwrap();

    let summary = run_suite(&mut suite, &quiet()).unwrap();
    // C(4, 2) = 6 subsets, grid of 2.
    assert_eq!(summary.passed, 12);
    assert_eq!(summary.failed, 0);
}

#[test]
fn fixed_wrapper_parameters_flow_into_the_report() {
    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(RelationBuilder::new("mr_shift", numbers(3)))
        .unwrap();

    // A fixed wrap injects n = 3 and records it on each test case.
    let shift = fixed_transform(
        "n",
        Value::Number(3.0),
        Arc::new(|input, kwargs| {
            let x = input
                .as_number()
                .ok_or_else(|| MetamorphicError::invalid_input("expected a number"))?;
            let n = kwargs
                .get("n")
                .and_then(Value::as_number)
                .ok_or_else(|| MetamorphicError::configuration("missing keyword n"))?;
            Ok(Value::Number(x + n))
        }),
    );
    relation.set_transformation("shift_by_3", shift).unwrap();
    relation
        .set_relation(
            "shifted_by_6",
            Arc::new(|f_x, f_xt, _| {
                let a = f_x.as_number().unwrap_or(0.0);
                let b = f_xt.as_number().unwrap_or(0.0);
                Ok(Value::Bool((b - a - 6.0).abs() < 1e-9))
            }),
        )
        .unwrap();
    relation
        .register_system(
            "doubler",
            Arc::new(FnSystem(|input: Value| {
                Ok(Value::Number(input.as_number().unwrap_or(0.0) * 2.0))
            })),
            None,
            None,
        )
        .unwrap();

    let summary = run_suite(&mut suite, &quiet()).unwrap();
    assert_eq!(summary.passed, 3);

    let relation = suite.relation("mr_shift").unwrap();
    for id in relation.case_ids("doubler") {
        let case = relation.case("doubler", id).unwrap();
        assert_eq!(case.parameters().get("n"), Some(&Value::Number(3.0)));
        let report = case.report().unwrap();
        assert_eq!(report.parameters.get("n"), Some(&Value::Number(3.0)));
    }
}

#[test]
fn path_inputs_are_resolved_through_the_data_loader() {
    let dir = std::env::temp_dir();
    let mut paths = Vec::new();
    for (i, word) in ["alpha", "beta"].iter().enumerate() {
        let path = dir.join(format!("metamorph_engine_loader_{i}.txt"));
        std::fs::write(&path, word).unwrap();
        paths.push(Value::String(path.display().to_string()));
    }

    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(RelationBuilder::new("mr_reverse", paths.clone()))
        .unwrap();
    relation
        .set_transformation(
            "reverse",
            Arc::new(|input, _| {
                let s = input
                    .as_str()
                    .map(|s| s.chars().rev().collect::<String>())
                    .ok_or_else(|| MetamorphicError::invalid_input("expected a string"))?;
                Ok(Value::String(s))
            }),
        )
        .unwrap();
    // Length is invariant under reversal.
    relation.set_relation("equality", equality()).unwrap();
    relation
        .register_system(
            "length",
            Arc::new(FnSystem(|input: Value| {
                let len = input
                    .as_str()
                    .map(|s| s.len() as f64)
                    .ok_or_else(|| MetamorphicError::invalid_input("expected a string"))?;
                Ok(Value::Number(len))
            })),
            None,
            Some(standard_loader()),
        )
        .unwrap();

    let summary = run_suite(&mut suite, &quiet()).unwrap();
    assert_eq!(summary.passed, 2);

    // The loader replaced the path with the file contents before execution.
    let relation = suite.relation("mr_reverse").unwrap();
    let id = relation.case_ids("length")[0];
    let report = relation.case("length", id).unwrap().report().unwrap();
    assert!(report.source_inputs[0] == "alpha" || report.source_inputs[0] == "beta");

    for value in paths {
        if let Value::String(p) = value {
            std::fs::remove_file(p).ok();
        }
    }
}

#[test]
fn unvalidated_inputs_are_skipped_without_failing_the_run() {
    let mut suite = Suite::with_seed(7);
    let relation = suite
        .add(RelationBuilder::new("mr_even_only", numbers(4)))
        .unwrap();
    relation
        .set_transformation("identity", Arc::new(|input, _| Ok(input)))
        .unwrap();
    relation.set_relation("equality", equality()).unwrap();
    // Only even SUT outputs are considered valid.
    relation.add_valid_input(Arc::new(|output| {
        output.as_number().is_some_and(|n| (n as i64) % 2 == 0)
    }));
    relation
        .register_system("identity", Arc::new(FnSystem(|input: Value| Ok(input))), None, None)
        .unwrap();

    let summary = run_suite(&mut suite, &quiet()).unwrap();
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.all_passed());
}
