//! Shared test utilities for crowdgate.

pub mod fixtures;
pub mod logging;

/// Table-driven test case structure.
#[derive(Debug, Clone)]
pub struct TestCase<I, E> {
    pub name: &'static str,
    pub input: I,
    pub expected: E,
    pub should_panic: bool,
}

/// Run table-driven tests, stopping at the first failing case.
pub fn run_table_tests<I, E, F>(cases: Vec<TestCase<I, E>>, test_fn: F) -> Result<(), String>
where
    I: std::fmt::Debug + Clone + std::panic::RefUnwindSafe,
    E: std::fmt::Debug + PartialEq,
    F: Fn(I) -> E + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    for case in cases {
        println!("[TEST] {}: {:?}", case.name, case.input);
        let result = std::panic::catch_unwind(|| test_fn(case.input.clone()));

        match (result, case.should_panic) {
            (Err(_), true) => {}
            (Ok(_), true) => return Err(format!("Test '{}' expected panic", case.name)),
            (Err(_), false) => return Err(format!("Test '{}' panicked unexpectedly", case.name)),
            (Ok(actual), false) if actual != case.expected => {
                return Err(format!(
                    "Test '{}' failed: expected {:?}, got {:?}",
                    case.name, case.expected, actual
                ));
            }
            (Ok(_), false) => {}
        }
    }
    Ok(())
}

/// Decision sequence the scheduler should produce for a seeded batch.
#[must_use]
pub fn expected_batch(seed: u64, batch_size: usize, gold_per_batch: usize) -> Vec<bool> {
    use rand::SeedableRng;
    use rand::seq::SliceRandom;
    use rand_chacha::ChaCha8Rng;

    let mut slots: Vec<bool> = (0..batch_size).map(|i| i < gold_per_batch).collect();
    slots.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    slots
}
