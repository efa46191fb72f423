//! Serialization tests for the stored and exported shapes

use serde_json::{json, Value};

fn node_fixture() -> Value {
    json!({
        "id": "7f1d1a3e-2b1c-4c55-9d0e-4b7a8a1f0c11",
        "name": "LangGraph",
        "node_type": "idea",
        "description": "Graph-based agent orchestration",
        "attributes": {
            "homepage": "https://example.org",
            "stars": 1200,
            "tags": ["agents", "graphs"]
        },
        "source": { "source_type": "email", "source_id": "42" },
        "confidence": 0.9,
        "created_at": "2025-11-30T10:00:00Z",
        "updated_at": "2025-11-30T10:00:00Z"
    })
}

#[cfg(test)]
mod serialization_tests {
    use super::*;
    use crate::graph::{AttributeValue, Endpoint, GapStatus, InsightId, Node, NodeId};

    #[test]
    fn node_id_serializes_as_plain_string() {
        let id: NodeId = "7f1d1a3e-2b1c-4c55-9d0e-4b7a8a1f0c11".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"7f1d1a3e-2b1c-4c55-9d0e-4b7a8a1f0c11\"");
    }

    #[test]
    fn node_deserializes_from_fixture() {
        let node: Node = serde_json::from_value(node_fixture()).unwrap();
        assert_eq!(node.name, "LangGraph");
        assert_eq!(node.node_type, "idea");
        assert_eq!(node.attributes.get("stars"), Some(&AttributeValue::Int(1200)));
        assert_eq!(node.source.as_ref().unwrap().source_id, "42");
    }

    #[test]
    fn endpoint_is_tagged_by_kind() {
        let id = InsightId::new();
        let json = serde_json::to_value(Endpoint::Insight(id)).unwrap();
        assert_eq!(json["kind"], "insight");
        assert_eq!(json["id"], id.to_string());
    }

    #[test]
    fn gap_status_uses_snake_case() {
        let json = serde_json::to_string(&GapStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
    }

    #[test]
    fn text_representation_includes_attributes() {
        let node: Node = serde_json::from_value(node_fixture()).unwrap();
        let text = node.text_representation();
        assert!(text.contains("LangGraph"));
        assert!(text.contains("orchestration"));
        assert!(text.contains("agents"));
    }
}
