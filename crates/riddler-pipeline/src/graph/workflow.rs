use std::collections::{HashMap, HashSet};

use riddler_core::error::Result;

use super::schedule;
use super::step::Step;
use super::yield_point::YieldPoint;

/// A validated, immutable step graph.
///
/// Holds the step registry in declaration order, the dependency edge list and
/// the yield registry. Cheap to share behind an `Arc`; every run and session
/// keeps its own state outside the graph.
#[derive(Debug, Clone)]
pub struct Workflow {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    edges: HashMap<String, Vec<String>>,
    yields: Vec<YieldPoint>,
}

impl Workflow {
    pub(crate) fn new(
        steps: Vec<Step>,
        edges: HashMap<String, Vec<String>>,
        yields: Vec<YieldPoint>,
    ) -> Self {
        let index = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self {
            steps,
            index,
            edges,
            yields,
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    /// Step names in declaration order.
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Declared dependencies of a step (explicit or implicit).
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn yields(&self) -> &[YieldPoint] {
        &self.yields
    }

    /// The first yield point registered to fire after `step`.
    pub fn yield_after(&self, step: &str) -> Option<&YieldPoint> {
        self.yields.iter().find(|y| y.fires_after(step))
    }

    /// Steps nothing else depends on.
    pub fn sinks(&self) -> HashSet<&str> {
        let depended_on: HashSet<&str> = self
            .edges
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        self.steps
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| !depended_on.contains(name))
            .collect()
    }

    /// Topological execution order.
    pub fn order(&self) -> Result<Vec<String>> {
        schedule::order(&self.step_names(), &self.edges)
    }
}
