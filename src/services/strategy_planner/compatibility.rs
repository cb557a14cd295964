//! Symmetric strategy compatibility matrix.
//!
//! Every pair of strategies is compatible unless explicitly forbidden.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct CompatibilityMatrix {
    incompatible: HashSet<(String, String)>,
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark two strategies as mutually incompatible.
    pub fn forbid(&mut self, a: &str, b: &str) {
        self.incompatible.insert(pair(a, b));
    }

    /// Remove a previously declared incompatibility.
    pub fn allow(&mut self, a: &str, b: &str) {
        self.incompatible.remove(&pair(a, b));
    }

    pub fn is_compatible(&self, a: &str, b: &str) -> bool {
        !self.incompatible.contains(&pair(a, b))
    }

    /// Number of forbidden pairs.
    pub fn len(&self) -> usize {
        self.incompatible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incompatible.is_empty()
    }
}
