//! Nested boolean criteria model.
//!
//! A policy body yields one [`PolicyCriteria`] per act / necessity type. Its
//! conditions form a tree of [`ConditionNode`]s: leaves are atomic
//! conditions, groups combine children with `ALL` or `ANY`.
//!
//! The wire format is the one the structured extractor produces:
//!
//! ```json
//! {"ALL": [
//!     {"desc": "Condition A", "conditions": null},
//!     {"ANY": [{"desc": "Condition C", "conditions": null}]}
//! ]}
//! ```

mod types;
mod validate;
mod wire;

pub use types::{ConditionNode, CriteriaAnnotation, Operator, PolicyCriteria};
pub use validate::{CriteriaError, MAX_CONDITION_DEPTH};
