use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Failed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::Failed => "failed",
        }
    }

    /// Pending and confirmed bookings hold their resource.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::Failed
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "failed" => Ok(BookingStatus::Failed),
            other => Err(DomainError::Validation(format!("unknown booking status: {other}"))),
        }
    }
}

/// Guard run before committing any status change.
///
/// Allowed moves: `pending → confirmed → completed`, and
/// `pending | confirmed → cancelled | failed`. Terminal states never move.
pub fn can_transition(current: BookingStatus, next: BookingStatus) -> DomainResult<()> {
    use BookingStatus::*;

    let allowed = matches!(
        (current, next),
        (Pending, Confirmed)
            | (Confirmed, Completed)
            | (Pending, Cancelled)
            | (Confirmed, Cancelled)
            | (Pending, Failed)
            | (Confirmed, Failed)
    );

    if allowed {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition {
            from: current,
            to: next,
        })
    }
}

/// Same resource and intersecting half-open `[start, end)` intervals.
pub fn is_overlapping(a: &Booking, b: &Booking) -> bool {
    a.resource_id == b.resource_id && a.start_time < b.end_time && a.end_time > b.start_time
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// New booking in `pending`, rejecting empty or inverted intervals.
    pub fn new_pending(req: &CreateBookingRequest, now: DateTime<Utc>) -> DomainResult<Self> {
        if req.end_time <= req.start_time {
            return Err(DomainError::InvalidInterval);
        }
        if req.amount < 0 {
            return Err(DomainError::Validation("amount must not be negative".into()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            resource_id: req.resource_id,
            start_time: req.start_time,
            end_time: req.end_time,
            status: BookingStatus::Pending,
            amount: req.amount,
            currency: req.currency.clone(),
            payment_id: None,
            reservation_id: None,
            notes: req.notes.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status.is_active()
    }

    pub fn can_be_updated(&self) -> bool {
        self.status == BookingStatus::Pending
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn is_overlapping(&self, other: &Booking) -> bool {
        is_overlapping(self, other)
    }

    /// Fails with `Overlap` on the first other active booking that intersects this one.
    pub fn ensure_no_overlap<'a>(
        &self,
        others: impl IntoIterator<Item = &'a Booking>,
    ) -> DomainResult<()> {
        match others
            .into_iter()
            .find(|other| other.id != self.id && other.is_active() && self.is_overlapping(other))
        {
            Some(other) => Err(DomainError::Overlap {
                booking_id: self.id,
                other_id: other.id,
                resource_id: self.resource_id,
            }),
            None => Ok(()),
        }
    }

    pub fn transition_to(&mut self, next: BookingStatus, now: DateTime<Utc>) -> DomainResult<()> {
        can_transition(self.status, next)?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Applies an update request; only allowed while `pending`.
    pub fn apply_update(&mut self, req: &UpdateBookingRequest, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.can_be_updated() {
            return Err(DomainError::NotModifiable(self.status));
        }

        let start = req.start_time.unwrap_or(self.start_time);
        let end = req.end_time.unwrap_or(self.end_time);
        if end <= start {
            return Err(DomainError::InvalidInterval);
        }

        self.start_time = start;
        self.end_time = end;
        if let Some(notes) = &req.notes {
            self.notes = notes.clone();
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBookingRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0).unwrap()
    }

    fn booking(resource_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Booking {
        let req = CreateBookingRequest {
            user_id: Uuid::new_v4(),
            resource_id,
            start_time: start,
            end_time: end,
            amount: 5000,
            currency: "USD".into(),
            notes: None,
        };
        Booking::new_pending(&req, at(9, 0)).unwrap()
    }

    #[test]
    fn test_half_open_overlap() {
        let room = Uuid::new_v4();
        let a = booking(room, at(10, 0), at(11, 0));
        let b = booking(room, at(10, 30), at(11, 30));
        let c = booking(room, at(11, 0), at(12, 0));

        assert!(is_overlapping(&a, &b));
        assert!(is_overlapping(&b, &a));
        assert!(!is_overlapping(&a, &c));
        assert!(!is_overlapping(&c, &a));
    }

    #[test]
    fn test_overlap_requires_same_resource() {
        let a = booking(Uuid::new_v4(), at(10, 0), at(11, 0));
        let b = booking(Uuid::new_v4(), at(10, 0), at(11, 0));
        assert!(!a.is_overlapping(&b));
    }

    #[test]
    fn test_contained_interval_overlaps() {
        let room = Uuid::new_v4();
        let outer = booking(room, at(9, 0), at(12, 0));
        let inner = booking(room, at(10, 0), at(10, 15));
        assert!(outer.is_overlapping(&inner));
    }

    #[test]
    fn test_inverted_interval_rejected() {
        let req = CreateBookingRequest {
            user_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            start_time: at(11, 0),
            end_time: at(11, 0),
            amount: 0,
            currency: "USD".into(),
            notes: None,
        };
        assert_eq!(Booking::new_pending(&req, at(9, 0)), Err(DomainError::InvalidInterval));
    }

    #[test]
    fn test_status_lifecycle() {
        let mut b = booking(Uuid::new_v4(), at(10, 0), at(11, 0));
        assert!(b.can_be_updated());
        assert!(b.can_be_cancelled());

        b.transition_to(BookingStatus::Confirmed, at(9, 30)).unwrap();
        assert!(!b.can_be_updated());
        assert!(b.can_be_cancelled());
        assert_eq!(b.updated_at, at(9, 30));

        b.transition_to(BookingStatus::Completed, at(11, 5)).unwrap();
        assert!(!b.can_be_cancelled());
        assert!(!b.is_active());
    }

    #[test]
    fn test_terminal_states_are_final() {
        use BookingStatus::*;
        for terminal in [Cancelled, Completed, Failed] {
            for next in [Pending, Confirmed, Cancelled, Completed, Failed] {
                let err = can_transition(terminal, next).unwrap_err();
                assert!(err.is_conflict());
            }
        }
    }

    #[test]
    fn test_no_backwards_or_skipping_moves() {
        use BookingStatus::*;
        assert!(can_transition(Confirmed, Pending).is_err());
        assert!(can_transition(Pending, Completed).is_err());
        assert!(can_transition(Pending, Pending).is_err());
        assert!(can_transition(Pending, Failed).is_ok());
        assert!(can_transition(Confirmed, Cancelled).is_ok());
    }

    #[test]
    fn test_ensure_no_overlap_ignores_inactive_and_self() {
        let room = Uuid::new_v4();
        let candidate = booking(room, at(10, 0), at(11, 0));
        let mut cancelled = booking(room, at(10, 0), at(11, 0));
        cancelled.status = BookingStatus::Cancelled;
        let itself = candidate.clone();

        assert!(candidate.ensure_no_overlap([&cancelled, &itself]).is_ok());

        let active = booking(room, at(10, 45), at(11, 15));
        let err = candidate.ensure_no_overlap([&active]).unwrap_err();
        assert!(matches!(err, DomainError::Overlap { other_id, .. } if other_id == active.id));
    }

    #[test]
    fn test_update_only_while_pending() {
        let mut b = booking(Uuid::new_v4(), at(10, 0), at(11, 0));
        let req = UpdateBookingRequest {
            end_time: Some(at(11, 30)),
            notes: Some("window seat".into()),
            ..Default::default()
        };
        b.apply_update(&req, at(9, 10)).unwrap();
        assert_eq!(b.end_time, at(11, 30));
        assert_eq!(b.notes, "window seat");

        b.transition_to(BookingStatus::Confirmed, at(9, 20)).unwrap();
        assert!(b.apply_update(&req, at(9, 30)).is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&BookingStatus::Confirmed).unwrap(), "\"confirmed\"");
        assert_eq!("failed".parse::<BookingStatus>().unwrap(), BookingStatus::Failed);
    }
}
