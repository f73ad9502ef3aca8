use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, DomainResult};

pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(req: &CreateUserRequest, now: DateTime<Utc>) -> DomainResult<Self> {
        req.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            email: req.email.trim().to_lowercase(),
            name: req.name.trim().to_string(),
            role: DEFAULT_ROLE.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies the non-empty fields of `req`. Returns whether anything changed.
    pub fn apply_update(&mut self, req: &UpdateUserRequest, now: DateTime<Utc>) -> DomainResult<bool> {
        req.validate()?;

        let mut changed = false;
        if let Some(name) = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if name != self.name {
                self.name = name.to_string();
                changed = true;
            }
        }
        if let Some(email) = req.email.as_deref().map(|e| e.trim().to_lowercase()) {
            if !email.is_empty() && email != self.email {
                self.email = email;
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

impl CreateUserRequest {
    pub fn validate(&self) -> DomainResult<()> {
        validate_email(&self.email)?;
        validate_name(&self.name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            validate_email(email)?;
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            validate_name(name)?;
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> DomainResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("invalid email address: {email}")))
    }
}

fn validate_name(name: &str) -> DomainResult<()> {
    let len = name.trim().chars().count();
    if (2..=100).contains(&len) {
        Ok(())
    } else {
        Err(DomainError::Validation("name must be between 2 and 100 characters".into()))
    }
}
