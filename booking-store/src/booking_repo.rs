use async_trait::async_trait;
use booking_domain::repository::RepoResult;
use booking_domain::{Booking, BookingRepository, BookingStatus, RepositoryError};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::repo_error;

const COLUMNS: &str = "id, user_id, resource_id, start_time, end_time, status, amount, currency, \
                       payment_id, reservation_id, notes, created_at, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A guarded update touched no row: either the booking is gone or its
    /// status moved on underneath the caller.
    async fn missed_update(&self, id: Uuid) -> RepositoryError {
        let exists: Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookings WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await;
        match exists {
            Ok(true) => RepositoryError::Stale("booking"),
            Ok(false) => RepositoryError::NotFound("booking"),
            Err(e) => repo_error("booking", e),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    resource_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
    amount: i64,
    currency: String,
    payment_id: Option<String>,
    reservation_id: Option<String>,
    notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepositoryError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status: BookingStatus = row.status.parse().map_err(RepositoryError::backend)?;
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            resource_id: row.resource_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status,
            amount: row.amount,
            currency: row.currency,
            payment_id: row.payment_id,
            reservation_id: row.reservation_id,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create(&self, booking: &Booking) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, resource_id, start_time, end_time, status, amount,
                                  currency, payment_id, reservation_id, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.resource_id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.status.as_str())
        .bind(booking.amount)
        .bind(&booking.currency)
        .bind(&booking.payment_id)
        .bind(&booking.reservation_id)
        .bind(&booking.notes)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("booking", e))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Booking> {
        let row: BookingRow = sqlx::query_as(&format!("SELECT {COLUMNS} FROM bookings WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| repo_error("booking", e))?;
        row.try_into()
    }

    async fn update_schedule(&self, booking: &Booking) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
               SET start_time = $2, end_time = $3, notes = $4, updated_at = $5
             WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(booking.id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(&booking.notes)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("booking", e))?;

        if result.rows_affected() == 0 {
            return Err(self.missed_update(booking.id).await);
        }
        Ok(())
    }

    async fn update_status(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
               SET status = $2, payment_id = $3, reservation_id = $4, updated_at = $5
             WHERE id = $1 AND status = $6
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(&booking.payment_id)
        .bind(&booking.reservation_id)
        .bind(booking.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("booking", e))?;

        if result.rows_affected() == 0 {
            return Err(self.missed_update(booking.id).await);
        }
        Ok(())
    }

    async fn find_active_by_resource(&self, resource_id: Uuid) -> RepoResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM bookings \
             WHERE resource_id = $1 AND status IN ('pending', 'confirmed') \
             ORDER BY start_time"
        ))
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| repo_error("booking", e))?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
