// The static list of evaluation initial conditions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical group an initial condition is reported under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Train,
    Test,
}

impl Group {
    pub fn label(&self) -> &'static str {
        match self {
            Group::Train => "train",
            Group::Test => "test",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// One evaluation case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCondition {
    /// Position in the plan, stable for the lifetime of the runner.
    pub index: usize,
    pub seed: u64,
    pub group: Group,
    /// Record video for this condition.
    pub visualize: bool,
}

/// Ordered, immutable list of initial conditions: train first, then test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitialConditionPlan {
    conditions: Vec<InitialCondition>,
}

impl InitialConditionPlan {
    /// Builds the plan. Seeds are consecutive per group starting at the given
    /// offsets; the first `n_*_vis` conditions of each group are visualized.
    pub fn build(
        n_train: usize,
        n_train_vis: usize,
        train_start_seed: u64,
        n_test: usize,
        n_test_vis: usize,
        test_start_seed: u64,
    ) -> Self {
        let mut conditions = Vec::with_capacity(n_train + n_test);
        let groups = [
            (Group::Train, n_train, n_train_vis, train_start_seed),
            (Group::Test, n_test, n_test_vis, test_start_seed),
        ];
        for (group, n, n_vis, start_seed) in groups {
            for i in 0..n {
                conditions.push(InitialCondition {
                    index: conditions.len(),
                    seed: start_seed + i as u64,
                    group,
                    visualize: i < n_vis,
                });
            }
        }
        Self { conditions }
    }

    pub fn len(&self) -> usize { self.conditions.len() }

    pub fn is_empty(&self) -> bool { self.conditions.is_empty() }

    pub fn get(&self, index: usize) -> Option<&InitialCondition> { self.conditions.get(index) }

    pub fn conditions(&self) -> &[InitialCondition] { &self.conditions }

    pub fn iter(&self) -> std::slice::Iter<'_, InitialCondition> { self.conditions.iter() }

    /// Groups in order of first appearance.
    pub fn groups(&self) -> Vec<Group> {
        let mut out: Vec<Group> = Vec::new();
        for c in &self.conditions {
            if !out.contains(&c.group) {
                out.push(c.group);
            }
        }
        out
    }
}
