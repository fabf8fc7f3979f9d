//! Named verification scenarios.

use std::fmt;
use std::rc::Rc;

use crate::error::SimError;
use crate::kernel::Simulator;

/// A scenario body. It drives the simulator and checks results.
pub type TestcaseFn = Rc<dyn Fn(&mut Simulator) -> Result<(), SimError>>;

/// Scenarios registered on a simulator, in registration order.
#[derive(Default, Clone)]
pub struct TestcaseRegistry {
    cases: Vec<(String, TestcaseFn)>,
}

impl TestcaseRegistry {
    /// Adds a scenario. Names must be unique.
    pub fn register(&mut self, name: &str, case: TestcaseFn) -> Result<(), SimError> {
        if self.get(name).is_some() {
            return Err(SimError::config(format!(
                "testcase '{name}' is already registered"
            )));
        }
        self.cases.push((name.to_string(), case));
        Ok(())
    }

    /// Looks a scenario up by name.
    pub fn get(&self, name: &str) -> Option<TestcaseFn> {
        self.cases
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, case)| Rc::clone(case))
    }

    /// Scenario names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().map(|(n, _)| n.as_str())
    }

    /// Number of registered scenarios.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl fmt::Debug for TestcaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Result of one scenario run by [`Simulator::run_testcases`].
#[derive(Debug)]
pub struct TestcaseOutcome {
    /// Scenario name.
    pub name: String,
    /// How it ended.
    pub result: Result<(), SimError>,
}

impl TestcaseOutcome {
    /// Returns `true` if the scenario completed without error.
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}
