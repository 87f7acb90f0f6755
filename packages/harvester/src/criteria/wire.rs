//! Wire form of condition nodes.
//!
//! Leaves are `{"desc": ..., "conditions": null}`; groups are a single-key
//! object keyed by the operator.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::types::ConditionNode;
use super::validate::CriteriaError;

/// Shape-only view of a node, before operators are checked.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireNode {
    Leaf {
        desc: String,
        #[serde(default)]
        conditions: Option<serde_json::Value>,
    },
    Group(BTreeMap<String, Vec<WireNode>>),
}

impl TryFrom<WireNode> for ConditionNode {
    type Error = CriteriaError;

    fn try_from(node: WireNode) -> Result<Self, Self::Error> {
        match node {
            WireNode::Leaf { desc, conditions } => match conditions {
                None | Some(serde_json::Value::Null) => Ok(Self::Leaf { desc }),
                Some(_) => Err(CriteriaError::LeafWithConditions(desc)),
            },
            WireNode::Group(map) => {
                if map.len() != 1 {
                    return Err(CriteriaError::MalformedGroup {
                        keys: map.into_keys().collect(),
                    });
                }
                let Some((key, children)) = map.into_iter().next() else {
                    return Err(CriteriaError::MalformedGroup { keys: Vec::new() });
                };
                let operator = key.parse()?;
                let children = children
                    .into_iter()
                    .map(ConditionNode::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Group { operator, children })
            }
        }
    }
}

impl Serialize for ConditionNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Leaf { desc } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("desc", desc)?;
                map.serialize_entry("conditions", &Option::<()>::None)?;
                map.end()
            }
            Self::Group { operator, children } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(operator.as_str(), children)?;
                map.end()
            }
        }
    }
}
