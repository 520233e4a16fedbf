//! Security requirement resolution for a matched operation

use crate::spec::{Operation, SecurityRequirement, SpecIndex};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How multiple requirement sets on one operation are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequirementMode {
    /// Apply every scheme of every requirement set
    #[default]
    ApplyAll,
    /// Apply only the first requirement set whose schemes can all be satisfied
    FirstSatisfiable,
}

impl fmt::Display for RequirementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementMode::ApplyAll => write!(f, "apply_all"),
            RequirementMode::FirstSatisfiable => write!(f, "first_satisfiable"),
        }
    }
}

impl FromStr for RequirementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply_all" => Ok(Self::ApplyAll),
            "first_satisfiable" => Ok(Self::FirstSatisfiable),
            other => Err(format!(
                "unknown requirement mode '{}' (expected apply_all or first_satisfiable)",
                other
            )),
        }
    }
}

/// Decides which requirement sets apply to an operation
pub struct SecurityResolver {
    spec: Arc<SpecIndex>,
}

impl SecurityResolver {
    /// Create a resolver over a spec
    pub fn new(spec: Arc<SpecIndex>) -> Self {
        Self { spec }
    }

    /// Operation-level requirements win when declared (even if empty),
    /// otherwise the document's global requirements apply.
    pub fn resolve<'a>(&'a self, operation: Option<&'a Operation>) -> &'a [SecurityRequirement] {
        match operation.and_then(|op| op.requirements.as_deref()) {
            Some(own) => own,
            None => self.spec.global_security(),
        }
    }
}
