// Stack models, native and synthesized

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EndpointId;

/// Stack identifier: numeric for native control-plane stacks, a deterministic
/// string for stacks synthesized from compose labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StackId {
    Native(i64),
    Synthetic(String),
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackId::Native(id) => write!(f, "{id}"),
            StackId::Synthetic(id) => f.write_str(id),
        }
    }
}

/// Snapshot key for a stack: "<endpoint_id>:<stack_id>".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackKey(String);

impl StackKey {
    pub fn new(endpoint_id: EndpointId, id: &StackId) -> Self {
        Self(format!("{endpoint_id}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StackKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Whether a stack came from the control plane or was derived from labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackProvenance {
    Native,
    Synthesized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub id: StackId,
    pub name: String,
    pub endpoint_id: EndpointId,
    pub provenance: StackProvenance,
}

impl Stack {
    pub fn key(&self) -> StackKey {
        StackKey::new(self.endpoint_id, &self.id)
    }

    pub fn is_native(&self) -> bool {
        self.provenance == StackProvenance::Native
    }
}
