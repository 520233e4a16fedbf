//! Request routing against the document's declared paths
//!
//! Handles:
//! - Matching concrete request paths to compiled path templates
//! - Resolving which security requirements apply to the match

mod matcher;
mod resolver;

pub use matcher::{PathMatcher, PathTemplate};
pub use resolver::{RequirementMode, SecurityResolver};
