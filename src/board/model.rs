//! Tool request board models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Tool request status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Fulfilled,
    Closed,
}

/// A request for a tool nobody currently lists.
///
/// `upvote_count` always equals the number of rows in `request_upvotes`
/// for this request; both are maintained in the same transaction.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ToolRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub tool_name: String,
    pub category: String,
    pub postcode: String,
    pub description: Option<String>,
    pub upvote_count: i32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for creating a tool request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRequestDto {
    #[validate(length(min = 2, max = 120, message = "Tool name must be 2-120 characters"))]
    pub tool_name: String,

    #[validate(length(min = 2, max = 60, message = "Category must be 2-60 characters"))]
    pub category: String,

    #[validate(custom = "validate_postcode")]
    pub postcode: String,

    #[validate(length(max = 1000, message = "Description may not exceed 1000 characters"))]
    pub description: Option<String>,
}

/// Request DTO for setting a request's status (admin only)
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: RequestStatus,
}

/// Result of an upvote toggle
#[derive(Debug, Serialize)]
pub struct UpvoteToggleResponse {
    pub request_id: Uuid,
    pub upvoted: bool,
    pub upvote_count: i32,
}

/// Query parameters for listing tool requests
#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub category: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// Structural UK postcode check: an outward code (area letter followed by
/// district digits, 2-4 characters) and an inward code (digit plus two
/// letters), e.g. `SW1A 1AA` or `M1 1AE`.
pub fn validate_postcode(postcode: &str) -> Result<(), ValidationError> {
    let normalized = postcode.trim().to_uppercase();

    let (outward, inward) = match normalized.rsplit_once(' ') {
        Some(parts) => parts,
        // Accept the unspaced form by splitting off the 3-char inward code
        None if normalized.len() > 3 => normalized.split_at(normalized.len() - 3),
        None => return Err(ValidationError::new("postcode")),
    };

    let outward_ok = (2..=4).contains(&outward.len())
        && outward.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && outward.chars().all(|c| c.is_ascii_alphanumeric())
        && outward.chars().any(|c| c.is_ascii_digit());

    let inward_bytes = inward.as_bytes();
    let inward_ok = inward.len() == 3
        && inward_bytes[0].is_ascii_digit()
        && inward_bytes[1].is_ascii_alphabetic()
        && inward_bytes[2].is_ascii_alphabetic();

    if outward_ok && inward_ok {
        Ok(())
    } else {
        Err(ValidationError::new("postcode"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_postcodes() {
        for postcode in ["SW1A 1AA", "M1 1AE", "CR2 6XH", "DN55 1PT", "ec1a 1bb", "M11AE"] {
            assert!(
                validate_postcode(postcode).is_ok(),
                "expected {} to validate",
                postcode
            );
        }
    }

    #[test]
    fn test_invalid_postcodes() {
        for postcode in ["", "1AA", "SW1A", "12345", "SW1A 1A", "SW1A AAA", "!B1 1AA"] {
            assert!(
                validate_postcode(postcode).is_err(),
                "expected {} to fail",
                postcode
            );
        }
    }

    #[test]
    fn test_create_request_validation() {
        let dto = CreateRequestDto {
            tool_name: "Tile cutter".to_string(),
            category: "tiling".to_string(),
            postcode: "LS1 4AP".to_string(),
            description: Some("Needed for a bathroom refit".to_string()),
        };
        assert!(dto.validate().is_ok());

        let dto = CreateRequestDto {
            tool_name: "Tile cutter".to_string(),
            category: "tiling".to_string(),
            postcode: "not a postcode".to_string(),
            description: None,
        };
        assert!(dto.validate().is_err());
    }
}
