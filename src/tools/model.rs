//! Tool listing request/response models

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::ToolCondition;

/// Request DTO for listing a tool
#[derive(Debug, Deserialize, Validate)]
pub struct CreateToolRequest {
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: String,

    #[validate(length(min = 2, max = 60, message = "Category must be 2-60 characters"))]
    pub category: String,

    pub condition: ToolCondition,

    #[validate(range(min = 1, message = "Daily rate must be positive"))]
    pub daily_rate_pence: i64,

    #[validate(range(min = 1, message = "Assessed value must be positive"))]
    pub assessed_value_pence: i64,
}

/// Request DTO for updating a tool. Absent fields are left unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateToolRequest {
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 2, max = 60, message = "Category must be 2-60 characters"))]
    pub category: Option<String>,

    pub condition: Option<ToolCondition>,

    #[validate(range(min = 1, message = "Daily rate must be positive"))]
    pub daily_rate_pence: Option<i64>,

    #[validate(range(min = 1, message = "Assessed value must be positive"))]
    pub assessed_value_pence: Option<i64>,

    pub available: Option<bool>,
}

/// Query parameters for listing tools
#[derive(Debug, Deserialize)]
pub struct ListToolsQuery {
    pub owner_id: Option<Uuid>,
    pub category: Option<String>,
    pub available: Option<bool>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tool_validation() {
        let request = CreateToolRequest {
            name: "Angle grinder".to_string(),
            category: "power-tools".to_string(),
            condition: ToolCondition::Good,
            daily_rate_pence: 450,
            assessed_value_pence: 8000,
        };
        assert!(request.validate().is_ok());

        let request = CreateToolRequest {
            name: "x".to_string(),
            category: "power-tools".to_string(),
            condition: ToolCondition::Good,
            daily_rate_pence: 450,
            assessed_value_pence: 8000,
        };
        assert!(request.validate().is_err());

        let request = CreateToolRequest {
            name: "Angle grinder".to_string(),
            category: "power-tools".to_string(),
            condition: ToolCondition::Good,
            daily_rate_pence: 0,
            assessed_value_pence: 8000,
        };
        assert!(request.validate().is_err());
    }
}
