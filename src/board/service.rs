//! Tool request board service layer

use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::board::model::{
    CreateRequestDto, ListRequestsQuery, RequestStatus, ToolRequest, UpvoteToggleResponse,
};
use crate::error::{ApiError, ApiResult};

/// Board service for tool requests and upvotes
#[derive(Clone)]
pub struct BoardService {
    db_pool: PgPool,
}

impl BoardService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Create a tool request
    pub async fn create_request(
        &self,
        requester_id: Uuid,
        dto: CreateRequestDto,
    ) -> ApiResult<ToolRequest> {
        dto.validate()?;

        let request = sqlx::query_as::<_, ToolRequest>(
            r#"
            INSERT INTO tool_requests (
                id, requester_id, tool_name, category, postcode, description,
                upvote_count, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, 'open', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(requester_id)
        .bind(&dto.tool_name)
        .bind(&dto.category)
        .bind(dto.postcode.trim().to_uppercase())
        .bind(&dto.description)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(request_id = %request.id, "Tool request created");

        Ok(request)
    }

    /// Toggle a user's upvote on a request.
    ///
    /// The pair row and the counter move in one transaction, with the
    /// counter updated arithmetically in SQL (clamped at zero), so two
    /// concurrent toggles by different users never lose an increment.
    pub async fn toggle_upvote(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> ApiResult<UpvoteToggleResponse> {
        let mut tx = self.db_pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM request_upvotes WHERE request_id = $1 AND user_id = $2",
        )
        .bind(request_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let upvoted = deleted.rows_affected() == 0;

        let count: Option<(i32,)> = if upvoted {
            sqlx::query(
                "INSERT INTO request_upvotes (request_id, user_id, created_at) VALUES ($1, $2, NOW())",
            )
            .bind(request_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query_as(
                r#"
                UPDATE tool_requests
                SET upvote_count = upvote_count + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING upvote_count
                "#,
            )
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            sqlx::query_as(
                r#"
                UPDATE tool_requests
                SET upvote_count = GREATEST(upvote_count - 1, 0), updated_at = NOW()
                WHERE id = $1
                RETURNING upvote_count
                "#,
            )
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?
        };

        let Some((upvote_count,)) = count else {
            // Rolls back the pair mutation as well
            return Err(ApiError::NotFound(format!(
                "Tool request {} not found",
                request_id
            )));
        };

        tx.commit().await?;

        Ok(UpvoteToggleResponse {
            request_id,
            upvoted,
            upvote_count,
        })
    }

    /// Set a request's status (admin only). The only permitted
    /// transitions are `open -> fulfilled` and `open -> closed`.
    pub async fn set_status(
        &self,
        request_id: Uuid,
        status: RequestStatus,
    ) -> ApiResult<ToolRequest> {
        if status == RequestStatus::Open {
            return Err(ApiError::ValidationError(
                "A request cannot be reopened".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, ToolRequest>(
            r#"
            UPDATE tool_requests
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(request_id)
        .fetch_optional(&self.db_pool)
        .await?;

        match updated {
            Some(request) => Ok(request),
            None => {
                // Distinguish a missing request from a closed one
                if self.get_request(&request_id).await?.is_some() {
                    Err(ApiError::PreconditionFailed(
                        "Only open requests can change status".to_string(),
                    ))
                } else {
                    Err(ApiError::NotFound(format!(
                        "Tool request {} not found",
                        request_id
                    )))
                }
            }
        }
    }

    /// Get a single tool request by ID
    pub async fn get_request(&self, id: &Uuid) -> ApiResult<Option<ToolRequest>> {
        let request = sqlx::query_as::<_, ToolRequest>("SELECT * FROM tool_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(request)
    }

    /// List tool requests with filtering and pagination
    pub async fn list_requests(&self, query: ListRequestsQuery) -> ApiResult<Vec<ToolRequest>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM tool_requests WHERE 1=1");

        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        if let Some(category) = query.category {
            query_builder.push(" AND category = ");
            query_builder.push_bind(category);
        }

        query_builder.push(" ORDER BY upvote_count DESC, created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset as i64);

        let requests = query_builder
            .build_query_as::<ToolRequest>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(requests)
    }
}
