//! Shape validation for extractor output.

use thiserror::Error;

use super::types::{ConditionNode, PolicyCriteria};

/// Deepest condition tree accepted from an extractor.
pub const MAX_CONDITION_DEPTH: usize = 32;

/// Reasons a criteria tree is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CriteriaError {
    #[error("unknown operator '{0}', expected ALL or ANY")]
    UnknownOperator(String),

    #[error("group must have exactly one operator key, found [{}]", .keys.join(", "))]
    MalformedGroup { keys: Vec<String> },

    #[error("leaf condition '{0}' carries nested conditions")]
    LeafWithConditions(String),

    #[error("group at {path} has no children")]
    EmptyGroup { path: String },

    #[error("condition tree exceeds maximum depth {max}")]
    TooDeep { max: usize },

    #[error("criteria entry is missing '{0}'")]
    MissingField(&'static str),
}

impl ConditionNode {
    /// Check the tree shape.
    ///
    /// Walks the tree with an explicit stack so that malformed, very deep
    /// input is rejected instead of exhausting the call stack.
    ///
    /// # Examples
    /// ```
    /// use policy_harvester::criteria::ConditionNode;
    ///
    /// assert!(ConditionNode::leaf("Condition A").validate().is_ok());
    /// assert!(ConditionNode::all(vec![]).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), CriteriaError> {
        let mut stack: Vec<(&ConditionNode, usize, String)> =
            vec![(self, 1, String::from("$"))];

        while let Some((node, depth, path)) = stack.pop() {
            if depth > MAX_CONDITION_DEPTH {
                return Err(CriteriaError::TooDeep {
                    max: MAX_CONDITION_DEPTH,
                });
            }

            if let ConditionNode::Group { operator, children } = node {
                if children.is_empty() {
                    return Err(CriteriaError::EmptyGroup { path });
                }
                for (i, child) in children.iter().enumerate().rev() {
                    stack.push((child, depth + 1, format!("{path}.{operator}[{i}]")));
                }
            }
        }

        Ok(())
    }
}

impl PolicyCriteria {
    /// Check required fields and the condition tree.
    ///
    /// `conditions: None` is valid.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.medical_act.trim().is_empty() {
            return Err(CriteriaError::MissingField("medical_act"));
        }
        if self.necessity_type.trim().is_empty() {
            return Err(CriteriaError::MissingField("necessity_type"));
        }
        match &self.conditions {
            Some(tree) => tree.validate(),
            None => Ok(()),
        }
    }
}
