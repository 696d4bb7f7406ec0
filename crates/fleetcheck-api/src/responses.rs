//! Response documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a successful status run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// When the run finished
    pub generated_at: DateTime<Utc>,
    /// Directory the environment was loaded from
    pub base_dir: String,
    /// Nodes in environment order
    pub nodes: Vec<NodeStatus>,
    /// Checked applications in environment order
    pub applications: Vec<ApplicationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub host: String,
    pub reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub name: String,
    /// Image recorded by the last build
    pub image: String,
    /// Every target runs `image`
    pub deployed: bool,
    /// Sorted by node name
    pub targets: Vec<TargetStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub node: String,
    pub running: bool,
}

/// Result of an aborted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stage that failed
    pub stage: String,
    /// Offending node or application, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_document_shape() {
        let response = StatusResponse {
            generated_at: Utc::now(),
            base_dir: "/srv/fleet".to_string(),
            nodes: vec![NodeStatus {
                name: "a".to_string(),
                host: "10.0.0.1".to_string(),
                reachable: true,
            }],
            applications: vec![ApplicationStatus {
                name: "web".to_string(),
                image: "web:7".to_string(),
                deployed: true,
                targets: vec![TargetStatus {
                    node: "a".to_string(),
                    running: true,
                }],
            }],
        };
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["base_dir"], "/srv/fleet");
        assert_eq!(json["nodes"][0]["reachable"], true);
        assert_eq!(json["applications"][0]["image"], "web:7");
        assert_eq!(json["applications"][0]["targets"][0]["node"], "a");
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_error_without_entity_omits_field() {
        let response = ErrorResponse {
            stage: "deadline".to_string(),
            entity: None,
            message: "status run did not finish within 2s".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("entity").is_none());
        assert_eq!(json["stage"], "deadline");
    }
}
