//! Normalized identity observation.
//!
//! # Responsibility
//! - Normalize raw email/phone input into comparable keys.
//! - Reject observations that carry no identifier at all.
//!
//! # Invariants
//! - Stored fields are trimmed and never empty.
//! - Emails are lower-cased; phone numbers keep their original characters.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Validation failures for incoming observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Both email and phone number are absent or blank after trimming.
    MissingIdentifier,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifier => {
                write!(f, "At least one of email or phoneNumber must be provided")
            }
        }
    }
}

impl Error for ValidationError {}

/// An (email?, phone?) pair submitted for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Observation {
    /// Normalizes raw input and validates that at least one identifier
    /// survives.
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Result<Self, ValidationError> {
        let email = normalize_email(email);
        let phone_number = normalize_phone(phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(ValidationError::MissingIdentifier);
        }
        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

/// Trims and lower-cases an email. Blank input becomes `None`.
pub fn normalize_email(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

/// Trims a phone number. Blank input becomes `None`.
pub fn normalize_phone(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
