use booking_core::{CancellationToken, Producer};
use booking_domain::user::{CreateUserRequest, UpdateUserRequest};
use booking_domain::{User, UserRepository};
use booking_shared::models::events::{UserCreatedData, UserDeletedData, UserUpdatedData};
use booking_shared::{Envelope, EventType, Masked};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{publish_after_write, ServiceError, ServiceResult, USER_SERVICE};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamps paging input: `page < 1` becomes 1, a size outside `1..=100` becomes 20.
pub fn normalize_paging(page: i64, page_size: i64) -> (i64, i64) {
    let page = page.max(1);
    let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
        page_size
    } else {
        DEFAULT_PAGE_SIZE
    };
    (page, page_size)
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub struct UserService {
    repo: Arc<dyn UserRepository>,
    producer: Producer,
    shutdown: CancellationToken,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, producer: Producer, shutdown: CancellationToken) -> Self {
        Self {
            repo,
            producer,
            shutdown,
        }
    }

    pub async fn create_user(
        &self,
        req: CreateUserRequest,
        trace_id: Option<String>,
    ) -> ServiceResult<User> {
        let user = User::new(&req, Utc::now())?;
        if self.repo.get_by_email(&user.email).await?.is_some() {
            return Err(ServiceError::Conflict("user with this email already exists".into()));
        }
        self.repo.create(&user).await?;
        self.producer.metrics().record_user_created();

        let event = Envelope::new(
            EventType::UserCreated,
            USER_SERVICE,
            trace_id,
            UserCreatedData {
                user_id: user.id,
                email: user.email.clone(),
                name: user.name.clone(),
                created_at: user.created_at,
            },
        );
        publish_after_write(&self.producer, &self.shutdown, &user.id.to_string(), &event).await;

        info!(user_id = %user.id, email = %Masked(&user.email), "User created");
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> ServiceResult<User> {
        Ok(self.repo.get(id).await?)
    }

    /// Publishes `user.updated` only when a field actually changed.
    pub async fn update_user(
        &self,
        id: Uuid,
        req: UpdateUserRequest,
        trace_id: Option<String>,
    ) -> ServiceResult<User> {
        let mut user = self.repo.get(id).await?;
        let previous_email = user.email.clone();

        if !user.apply_update(&req, Utc::now())? {
            return Ok(user);
        }
        if user.email != previous_email {
            if let Some(other) = self.repo.get_by_email(&user.email).await? {
                if other.id != user.id {
                    return Err(ServiceError::Conflict("user with this email already exists".into()));
                }
            }
        }
        self.repo.update(&user).await?;

        let event = Envelope::new(
            EventType::UserUpdated,
            USER_SERVICE,
            trace_id,
            UserUpdatedData {
                user_id: user.id,
                email: user.email.clone(),
                name: user.name.clone(),
                updated_at: user.updated_at,
            },
        );
        publish_after_write(&self.producer, &self.shutdown, &user.id.to_string(), &event).await;

        info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    pub async fn delete_user(&self, id: Uuid, trace_id: Option<String>) -> ServiceResult<()> {
        self.repo.delete(id).await?;
        self.producer.metrics().record_user_deleted();

        let event = Envelope::new(
            EventType::UserDeleted,
            USER_SERVICE,
            trace_id,
            UserDeletedData {
                user_id: id,
                deleted_at: Utc::now(),
            },
        );
        publish_after_write(&self.producer, &self.shutdown, &id.to_string(), &event).await;

        info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn list_users(&self, page: i64, page_size: i64) -> ServiceResult<UserPage> {
        let (page, page_size) = normalize_paging(page, page_size);
        // Past the last row the store just returns an empty page.
        let offset = (page - 1).saturating_mul(page_size);
        let (users, total) = self.repo.list(page_size, offset).await?;
        Ok(UserPage {
            users,
            total,
            page,
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::{MemoryBroker, Metrics};
    use booking_domain::memory::InMemoryUserRepository;
    use booking_shared::topics;

    fn service(broker: &MemoryBroker) -> UserService {
        let producer = Producer::new(Arc::new(broker.clone()), Arc::new(Metrics::new().unwrap()));
        UserService::new(
            Arc::new(InMemoryUserRepository::new()),
            producer,
            CancellationToken::new(),
        )
    }

    fn create(email: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: email.into(),
            name: "Ada Lovelace".into(),
        }
    }

    #[test]
    fn test_paging_is_clamped() {
        assert_eq!(normalize_paging(0, 10), (1, 10));
        assert_eq!(normalize_paging(-4, 0), (1, 20));
        assert_eq!(normalize_paging(3, 101), (3, 20));
        assert_eq!(normalize_paging(2, 100), (2, 100));
    }

    #[tokio::test]
    async fn test_create_and_delete_are_counted() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);
        let user = svc.create_user(create("ada@example.com"), None).await.unwrap();
        assert!(svc.create_user(create("ada@example.com"), None).await.is_err());
        svc.delete_user(user.id, None).await.unwrap();

        let metrics = svc.producer.metrics();
        assert_eq!(metrics.users_created_count(), 1);
        assert_eq!(metrics.users_deleted_count(), 1);
    }

    #[tokio::test]
    async fn test_huge_page_number_returns_empty_page() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);
        svc.create_user(create("ada@example.com"), None).await.unwrap();

        let page = svc.list_users(i64::MAX, 100).await.unwrap();
        assert!(page.users.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.page, i64::MAX);
        assert_eq!(page.page_size, 100);
    }

    #[tokio::test]
    async fn test_create_publishes_user_created_keyed_by_id() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);

        let user = svc
            .create_user(create("ada@example.com"), Some("trace-9".into()))
            .await
            .unwrap();

        let published = broker.messages(topics::USER_EVENTS).await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, user.id.to_string().into_bytes());

        let event: Envelope<UserCreatedData> = serde_json::from_slice(&published[0].value).unwrap();
        assert_eq!(event.event_type(), EventType::UserCreated);
        assert_eq!(event.base.source, USER_SERVICE);
        assert_eq!(event.trace_id(), Some("trace-9"));
        assert_eq!(event.data.user_id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);
        svc.create_user(create("ada@example.com"), None).await.unwrap();

        let err = svc
            .create_user(create("ADA@example.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(broker.messages(topics::USER_EVENTS).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_survives_publish_failure() {
        let broker = MemoryBroker::with_partial_acks(1, 3);
        let svc = service(&broker);

        let user = svc.create_user(create("ada@example.com"), None).await.unwrap();
        assert_eq!(svc.get_user(user.id).await.unwrap().email, "ada@example.com");
        assert_eq!(broker.write_attempts(), 3);
    }

    #[tokio::test]
    async fn test_noop_update_publishes_nothing() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);
        let user = svc.create_user(create("ada@example.com"), None).await.unwrap();

        let same = UpdateUserRequest {
            name: Some("Ada Lovelace".into()),
            email: None,
        };
        svc.update_user(user.id, same, None).await.unwrap();
        assert_eq!(broker.messages(topics::USER_EVENTS).await.len(), 1);

        let rename = UpdateUserRequest {
            name: Some("Countess Lovelace".into()),
            email: None,
        };
        let updated = svc.update_user(user.id, rename, None).await.unwrap();
        assert_eq!(updated.name, "Countess Lovelace");

        let published = broker.messages(topics::USER_EVENTS).await;
        assert_eq!(published.len(), 2);
        let event: Envelope<UserUpdatedData> = serde_json::from_slice(&published[1].value).unwrap();
        assert_eq!(event.data.name, "Countess Lovelace");
    }

    #[tokio::test]
    async fn test_update_to_taken_email_is_conflict() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);
        svc.create_user(create("ada@example.com"), None).await.unwrap();
        let grace = svc.create_user(create("grace@example.com"), None).await.unwrap();

        let req = UpdateUserRequest {
            name: None,
            email: Some("ada@example.com".into()),
        };
        assert!(matches!(
            svc.update_user(grace.id, req, None).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_not_found() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);

        let err = svc.delete_user(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("user")));
        assert!(broker.messages(topics::USER_EVENTS).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_pages_through_users() {
        let broker = MemoryBroker::new();
        let svc = service(&broker);
        for i in 0..5 {
            svc.create_user(create(&format!("user{i}@example.com")), None)
                .await
                .unwrap();
        }

        let page = svc.list_users(2, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.users.len(), 2);

        let clamped = svc.list_users(0, 500).await.unwrap();
        assert_eq!((clamped.page, clamped.page_size), (1, 20));
        assert_eq!(clamped.users.len(), 5);
    }
}
