//! Tool request board tests

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use uuid::Uuid;

    use toolshare_server::board::{BoardService, CreateRequestDto, RequestStatus};
    use toolshare_server::models::{SubscriptionTier, TierGrant};

    /// Helper to create a test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/toolshare_test".to_string());

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database")
    }

    async fn insert_user(pool: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, username, email_verified, tier, tier_granted_by,
                available_tool_count, is_admin
            )
            VALUES ($1, $2, $3, true, $4, $5, 0, false)
            "#,
        )
        .bind(id)
        .bind(format!("{}@example.com", id))
        .bind(id.to_string())
        .bind(SubscriptionTier::None)
        .bind(TierGrant::Payment)
        .execute(pool)
        .await
        .expect("Failed to insert test user");
        id
    }

    fn request_dto() -> CreateRequestDto {
        CreateRequestDto {
            tool_name: "Wet tile saw".to_string(),
            category: "tiling".to_string(),
            postcode: "LS1 4AP".to_string(),
            description: Some("For a weekend bathroom refit".to_string()),
        }
    }

    #[tokio::test]
    async fn test_request_validation_rejects_bad_postcode() {
        let dto = CreateRequestDto {
            postcode: "not-a-postcode".to_string(),
            ..request_dto()
        };

        use validator::Validate;
        assert!(dto.validate().is_err());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_create_request_starts_open_with_zero_upvotes() {
        let pool = setup_test_db().await;
        let service = BoardService::new(pool.clone());
        let user = insert_user(&pool).await;

        let request = service.create_request(user, request_dto()).await.unwrap();

        assert_eq!(request.upvote_count, 0);
        assert_eq!(request.status, RequestStatus::Open);
        assert_eq!(request.postcode, "LS1 4AP");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_upvote_toggle_is_idempotent_per_user() {
        let pool = setup_test_db().await;
        let service = BoardService::new(pool.clone());
        let requester = insert_user(&pool).await;
        let voter = insert_user(&pool).await;

        let request = service
            .create_request(requester, request_dto())
            .await
            .unwrap();

        // First toggle: upvoted
        let first = service.toggle_upvote(request.id, voter).await.unwrap();
        assert!(first.upvoted);
        assert_eq!(first.upvote_count, 1);

        // Second toggle by the same user: back to the original state
        let second = service.toggle_upvote(request.id, voter).await.unwrap();
        assert!(!second.upvoted);
        assert_eq!(second.upvote_count, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_upvotes_from_different_users_accumulate() {
        let pool = setup_test_db().await;
        let service = BoardService::new(pool.clone());
        let requester = insert_user(&pool).await;
        let voter_a = insert_user(&pool).await;
        let voter_b = insert_user(&pool).await;

        let request = service
            .create_request(requester, request_dto())
            .await
            .unwrap();

        service.toggle_upvote(request.id, voter_a).await.unwrap();
        let second = service.toggle_upvote(request.id, voter_b).await.unwrap();
        assert_eq!(second.upvote_count, 2);

        // Counter matches the pair rows
        let (pairs,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM request_upvotes WHERE request_id = $1")
                .bind(request.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(pairs, 2);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_status_transitions_only_leave_open() {
        let pool = setup_test_db().await;
        let service = BoardService::new(pool.clone());
        let user = insert_user(&pool).await;

        let request = service.create_request(user, request_dto()).await.unwrap();

        let fulfilled = service
            .set_status(request.id, RequestStatus::Fulfilled)
            .await
            .unwrap();
        assert_eq!(fulfilled.status, RequestStatus::Fulfilled);

        // Fulfilled is final: closing it now is refused
        let result = service.set_status(request.id, RequestStatus::Closed).await;
        assert!(result.is_err());

        // Reopening is never permitted
        let result = service.set_status(request.id, RequestStatus::Open).await;
        assert!(result.is_err());
    }
}
