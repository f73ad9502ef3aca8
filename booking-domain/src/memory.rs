//! HashMap-backed repositories for tests and local runs without Postgres.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::repository::{BookingRepository, RepoResult, RepositoryError, UserRepository};
use crate::user::User;

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bookings.read().await.is_empty()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn create(&self, booking: &Booking) -> RepoResult<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(RepositoryError::Duplicate(format!("booking {}", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Booking> {
        self.bookings
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound("booking"))
    }

    async fn update_schedule(&self, booking: &Booking) -> RepoResult<()> {
        let mut bookings = self.bookings.write().await;
        let slot = bookings
            .get_mut(&booking.id)
            .ok_or(RepositoryError::NotFound("booking"))?;
        if slot.status != BookingStatus::Pending {
            return Err(RepositoryError::Stale("booking"));
        }
        slot.start_time = booking.start_time;
        slot.end_time = booking.end_time;
        slot.notes = booking.notes.clone();
        slot.updated_at = booking.updated_at;
        Ok(())
    }

    async fn update_status(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<()> {
        let mut bookings = self.bookings.write().await;
        let slot = bookings
            .get_mut(&booking.id)
            .ok_or(RepositoryError::NotFound("booking"))?;
        if slot.status != expected {
            return Err(RepositoryError::Stale("booking"));
        }
        slot.status = booking.status;
        slot.payment_id = booking.payment_id.clone();
        slot.reservation_id = booking.reservation_id.clone();
        slot.updated_at = booking.updated_at;
        Ok(())
    }

    async fn find_active_by_resource(&self, resource_id: Uuid) -> RepoResult<Vec<Booking>> {
        let mut active: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.resource_id == resource_id && b.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|b| b.start_time);
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> RepoResult<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Duplicate(format!("user with email {}", user.email)));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound("user"))
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update(&self, user: &User) -> RepoResult<()> {
        let mut users = self.users.write().await;
        let slot = users.get_mut(&user.id).ok_or(RepositoryError::NotFound("user"))?;
        *slot = user.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound("user"))
    }

    async fn list(&self, limit: i64, offset: i64) -> RepoResult<(Vec<User>, i64)> {
        let users = self.users.read().await;
        let mut all: Vec<&User> = users.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, users.len() as i64))
    }
}
