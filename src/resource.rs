use std::fmt;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Imported,
    Failed,
    Skipped,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Imported => f.write_str("imported"),
            ImportStatus::Failed => f.write_str("failed"),
            ImportStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Outcome of checking one resource instance from state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tabled)]
#[serde(rename_all = "snake_case")]
pub struct ResourceResult {
    #[tabled(rename = "ADDRESS")]
    pub address: String,
    #[tabled(rename = "TYPE")]
    pub resource_type: String,
    #[tabled(rename = "ID")]
    pub resource_id: String,
    #[tabled(rename = "STATUS")]
    pub status: ImportStatus,
    #[tabled(rename = "DETAIL")]
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResourceResult {
        ResourceResult {
            address: "module.vpc.aws_subnet.private[0]".to_string(),
            resource_type: "aws_subnet".to_string(),
            resource_id: "subnet-0abc".to_string(),
            status: ImportStatus::Failed,
            detail: "Cannot import non-existent remote object".to_string(),
        }
    }

    #[test]
    fn test_result_serialization_snake_case() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"resource_type\":\"aws_subnet\""));
        assert!(json.contains("\"resource_id\":\"subnet-0abc\""));
        assert!(json.contains("\"status\":\"failed\""));
        assert!(!json.contains("resourceType"));
    }

    #[test]
    fn test_result_deserialization() {
        let json = r#"{
            "address": "aws_vpc.main",
            "resource_type": "aws_vpc",
            "resource_id": "vpc-1",
            "status": "imported",
            "detail": ""
        }"#;
        let result: ResourceResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.address, "aws_vpc.main");
        assert_eq!(result.status, ImportStatus::Imported);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ImportStatus::Imported.to_string(), "imported");
        assert_eq!(ImportStatus::Failed.to_string(), "failed");
        assert_eq!(ImportStatus::Skipped.to_string(), "skipped");
    }
}
