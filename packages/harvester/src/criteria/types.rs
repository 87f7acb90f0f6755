use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validate::CriteriaError;

/// How a group combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Every child must hold.
    All,
    /// At least one child must hold.
    Any,
}

impl Operator {
    /// Wire name of the operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Self::All),
            "ANY" => Ok(Self::Any),
            other => Err(CriteriaError::UnknownOperator(other.to_string())),
        }
    }
}

/// One node of a criteria tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "super::wire::WireNode")]
pub enum ConditionNode {
    /// Atomic condition.
    Leaf { desc: String },
    /// Children combined with an operator. Valid groups have at least one child.
    Group {
        operator: Operator,
        children: Vec<ConditionNode>,
    },
}

impl ConditionNode {
    #[must_use]
    pub fn leaf(desc: impl Into<String>) -> Self {
        Self::Leaf { desc: desc.into() }
    }

    #[must_use]
    pub fn all(children: Vec<ConditionNode>) -> Self {
        Self::Group {
            operator: Operator::All,
            children,
        }
    }

    #[must_use]
    pub fn any(children: Vec<ConditionNode>) -> Self {
        Self::Group {
            operator: Operator::Any,
            children,
        }
    }

    /// Nesting depth; a leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Group { children, .. } => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// Number of leaf conditions in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Group { children, .. } => children.iter().map(Self::leaf_count).sum(),
        }
    }

    /// Evaluate the tree given a truth assignment for leaf descriptions.
    ///
    /// # Examples
    /// ```
    /// use policy_harvester::criteria::ConditionNode;
    ///
    /// let tree = ConditionNode::all(vec![
    ///     ConditionNode::leaf("adult"),
    ///     ConditionNode::any(vec![ConditionNode::leaf("BMI >= 40"), ConditionNode::leaf("BMI >= 35")]),
    /// ]);
    /// assert!(tree.evaluate(&|desc| desc != "BMI >= 40"));
    /// assert!(!tree.evaluate(&|desc| desc == "adult"));
    /// ```
    pub fn evaluate<F>(&self, holds: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        match self {
            Self::Leaf { desc } => holds(desc),
            Self::Group {
                operator: Operator::All,
                children,
            } => children.iter().all(|c| c.evaluate(holds)),
            Self::Group {
                operator: Operator::Any,
                children,
            } => children.iter().any(|c| c.evaluate(holds)),
        }
    }
}

/// Criteria for one act / necessity-type combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCriteria {
    pub medical_act: String,

    #[serde(default)]
    pub sub_medical_act: Option<String>,

    pub necessity_type: String,

    #[serde(default)]
    pub description: String,

    /// `None` means the necessity applies unconditionally.
    #[serde(default)]
    pub conditions: Option<ConditionNode>,
}

/// One extraction run's output for a record.
///
/// Records accumulate these; a new run appends rather than replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaAnnotation {
    pub extractor_model: String,
    pub extracted_at: DateTime<Utc>,
    pub criteria: Vec<PolicyCriteria>,
}

impl CriteriaAnnotation {
    /// Annotation stamped with the current time.
    #[must_use]
    pub fn new(extractor_model: impl Into<String>, criteria: Vec<PolicyCriteria>) -> Self {
        Self {
            extractor_model: extractor_model.into(),
            extracted_at: Utc::now(),
            criteria,
        }
    }
}
