//! Tool listing service layer
//!
//! Listings are soft-deleted only, and every mutation that can change the
//! owner's available tool count triggers a tier recalculation.

use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::models::Tool;
use crate::tier::TierService;
use crate::tools::model::{CreateToolRequest, ListToolsQuery, UpdateToolRequest};

/// Tool service for managing listings
#[derive(Clone)]
pub struct ToolService {
    db_pool: PgPool,
    tier_service: TierService,
}

impl ToolService {
    pub fn new(db_pool: PgPool, tier_service: TierService) -> Self {
        Self {
            db_pool,
            tier_service,
        }
    }

    /// Create a tool listing and recalculate the owner's tier
    pub async fn create_tool(&self, owner_id: Uuid, request: CreateToolRequest) -> ApiResult<Tool> {
        request.validate()?;

        let tool = sqlx::query_as::<_, Tool>(
            r#"
            INSERT INTO tools (
                id, owner_id, name, category, condition, daily_rate_pence,
                assessed_value_pence, available, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, true, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&request.name)
        .bind(&request.category)
        .bind(request.condition)
        .bind(request.daily_rate_pence)
        .bind(request.assessed_value_pence)
        .fetch_one(&self.db_pool)
        .await?;

        self.tier_service.recalculate(owner_id).await?;

        tracing::info!(tool_id = %tool.id, owner_id = %owner_id, "Tool listed");

        Ok(tool)
    }

    /// Update a tool listing (owner only)
    pub async fn update_tool(
        &self,
        caller_id: Uuid,
        tool_id: Uuid,
        request: UpdateToolRequest,
    ) -> ApiResult<Tool> {
        request.validate()?;

        let tool = self.get_owned_tool(caller_id, tool_id).await?;

        let updated = sqlx::query_as::<_, Tool>(
            r#"
            UPDATE tools
            SET name = $1, category = $2, condition = $3,
                daily_rate_pence = $4, assessed_value_pence = $5,
                available = $6, updated_at = NOW()
            WHERE id = $7 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(request.name.unwrap_or(tool.name))
        .bind(request.category.unwrap_or(tool.category))
        .bind(request.condition.unwrap_or(tool.condition))
        .bind(request.daily_rate_pence.unwrap_or(tool.daily_rate_pence))
        .bind(
            request
                .assessed_value_pence
                .unwrap_or(tool.assessed_value_pence),
        )
        .bind(request.available.unwrap_or(tool.available))
        .bind(tool_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tool {} not found", tool_id)))?;

        self.tier_service.recalculate(caller_id).await?;

        Ok(updated)
    }

    /// Soft-delete a tool listing (owner only). The row is kept so
    /// historical rentals retain their references.
    pub async fn delete_tool(&self, caller_id: Uuid, tool_id: Uuid) -> ApiResult<()> {
        self.get_owned_tool(caller_id, tool_id).await?;

        let deleted = sqlx::query(
            r#"
            UPDATE tools
            SET deleted_at = NOW(), available = false, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(tool_id)
        .execute(&self.db_pool)
        .await?;

        if deleted.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Tool {} not found", tool_id)));
        }

        tracing::info!(tool_id = %tool_id, "Tool soft-deleted");

        // The deletion itself has committed; a failed recount is a
        // read-path auxiliary failure, logged and left for the next
        // recalculation.
        if let Err(e) = self.tier_service.recalculate(caller_id).await {
            tracing::warn!(
                owner_id = %caller_id,
                error = %e,
                "Tier recalculation after delete failed"
            );
        }

        Ok(())
    }

    /// Get a single tool by ID (soft-deleted listings are not returned)
    pub async fn get_tool(&self, id: &Uuid) -> ApiResult<Option<Tool>> {
        let tool =
            sqlx::query_as::<_, Tool>("SELECT * FROM tools WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(tool)
    }

    /// List tools with filtering and pagination
    pub async fn list_tools(&self, query: ListToolsQuery) -> ApiResult<Vec<Tool>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM tools WHERE deleted_at IS NULL");

        if let Some(owner_id) = query.owner_id {
            query_builder.push(" AND owner_id = ");
            query_builder.push_bind(owner_id);
        }
        if let Some(category) = query.category {
            query_builder.push(" AND category = ");
            query_builder.push_bind(category);
        }
        if let Some(available) = query.available {
            query_builder.push(" AND available = ");
            query_builder.push_bind(available);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset as i64);

        let tools = query_builder
            .build_query_as::<Tool>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(tools)
    }

    async fn get_owned_tool(&self, caller_id: Uuid, tool_id: Uuid) -> ApiResult<Tool> {
        let tool = sqlx::query_as::<_, Tool>(
            "SELECT * FROM tools WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(tool_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Tool {} not found", tool_id)))?;

        if tool.owner_id != caller_id {
            return Err(ApiError::Forbidden(
                "Only the owner may modify this tool".to_string(),
            ));
        }

        Ok(tool)
    }
}
