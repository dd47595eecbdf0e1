// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field value kinds and the equality rules used for no-op suppression.
//!
//! A tracked field holds one of three value kinds:
//!
//! - [`Scalar`]: compared by equality; a re-write of an equal scalar is a no-op.
//! - [`FieldValue::Blob`]: an opaque payload (list-like data) that replicates
//!   wholesale on any change; compared by structural equality.
//! - [`FieldValue::Node`]: a nested [`ReplicationNode`], compared by handle
//!   identity. Writing the *same* node handle back is a no-op; writing a
//!   different node re-parents it.

use crate::node::ReplicationNode;
use serde::{Deserialize, Serialize};

/// A scalar field value.
///
/// Serializes untagged, so the wire shape is the natural JSON form
/// (`null`, `true`, `42`, `1.5`, `"text"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

/// The value stored in a tracked field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Plain scalar, replicated by value.
    Scalar(Scalar),
    /// Opaque blob: replaced wholesale on any change (e.g. list-like data).
    Blob(serde_json::Value),
    /// Structured child: a nested replication node, diffed recursively.
    Node(ReplicationNode),
}

impl FieldValue {
    /// Equality check for no-op suppression.
    ///
    /// Scalars and blobs compare structurally; nodes compare by handle
    /// identity. Mixed kinds are never equal.
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a == b,
            (FieldValue::Blob(a), FieldValue::Blob(b)) => a == b,
            (FieldValue::Node(a), FieldValue::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Short kind name for logs and mismatch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::Blob(_) => "blob",
            FieldValue::Node(_) => "node",
        }
    }

    /// Returns the nested node, if this value holds one.
    pub fn as_node(&self) -> Option<&ReplicationNode> {
        match self {
            FieldValue::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(v: Scalar) -> Self {
        FieldValue::Scalar(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Scalar(v.into())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Scalar(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Scalar(v.into())
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Scalar(v.into())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Scalar(v.into())
    }
}

impl From<ReplicationNode> for FieldValue {
    fn from(v: ReplicationNode) -> Self {
        FieldValue::Node(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_equality() {
        assert!(FieldValue::from(1i64).same_as(&FieldValue::from(1i64)));
        assert!(!FieldValue::from(1i64).same_as(&FieldValue::from(2i64)));
        assert!(FieldValue::from("a").same_as(&FieldValue::from("a")));
        assert!(!FieldValue::from("a").same_as(&FieldValue::from("b")));
    }

    #[test]
    fn test_mixed_kinds_never_equal() {
        let scalar = FieldValue::from(1i64);
        let blob = FieldValue::Blob(serde_json::json!([1]));
        assert!(!scalar.same_as(&blob));
        assert!(!blob.same_as(&scalar));
    }

    #[test]
    fn test_blob_structural_equality() {
        let a = FieldValue::Blob(serde_json::json!([1, 2, 3]));
        let b = FieldValue::Blob(serde_json::json!([1, 2, 3]));
        let c = FieldValue::Blob(serde_json::json!([1, 2]));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_node_identity_equality() {
        let n1 = ReplicationNode::new();
        let n2 = ReplicationNode::new();
        let v1 = FieldValue::Node(n1.clone());
        let v1b = FieldValue::Node(n1);
        let v2 = FieldValue::Node(n2);
        assert!(v1.same_as(&v1b));
        assert!(!v1.same_as(&v2));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(FieldValue::from(1i64).kind(), "scalar");
        assert_eq!(FieldValue::Blob(serde_json::json!([])).kind(), "blob");
        assert_eq!(FieldValue::Node(ReplicationNode::new()).kind(), "node");
    }

    #[test]
    fn test_scalar_serde_untagged() {
        let s: Scalar = serde_json::from_str("42").unwrap();
        assert_eq!(s, Scalar::Int(42));
        let s: Scalar = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(s, Scalar::Text("hi".to_string()));
        let s: Scalar = serde_json::from_str("null").unwrap();
        assert_eq!(s, Scalar::Null);
        assert_eq!(serde_json::to_string(&Scalar::Bool(true)).unwrap(), "true");
    }

    #[test]
    fn test_as_node() {
        let node = ReplicationNode::new();
        let v = FieldValue::Node(node.clone());
        assert!(v.as_node().unwrap().ptr_eq(&node));
        assert!(FieldValue::from(1i64).as_node().is_none());
    }
}
