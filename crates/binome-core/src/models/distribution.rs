//! Distribution (field visit) model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::LatLng;
use crate::util::{next_timestamp, unix_millis_now};

/// Client-generated identifier of a distribution.
///
/// New ids are UUID v7 strings, but any non-empty string is accepted so
/// records created by older clients keep their identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributionId(String);

impl DistributionId {
    /// Create a new unique id using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DistributionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DistributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DistributionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput(
                "Distribution id cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for DistributionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Outcome of a visit. Exactly one per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    /// Visit completed, payment fields apply
    Done,
    /// Nobody answered, come back later
    Retry,
    Refused,
    /// Nothing to collect at this address
    #[default]
    Empty,
}

impl VisitStatus {
    pub const ALL: [Self; 4] = [Self::Done, Self::Retry, Self::Refused, Self::Empty];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Retry => "retry",
            Self::Refused => "refused",
            Self::Empty => "empty",
        }
    }

    /// Whether amount and payment method are meaningful for this status.
    #[must_use]
    pub const fn takes_payment(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown visit status: {s}")))
    }
}

/// How a completed visit was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Check,
    Card,
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [Self; 4] = [Self::Cash, Self::Check, Self::Card, Self::Transfer];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Check => "check",
            Self::Card => "card",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == normalized)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown payment method: {s}")))
    }
}

/// A visit performed by a team at an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    /// Stable client-generated identifier, used as the reconciliation key
    pub id: DistributionId,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub status: VisitStatus,
    /// Amount collected, only meaningful when `status` is `Done`
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: String,
    /// Team that owns the record
    pub owner_id: String,
    /// Creation timestamp (Unix ms). Older records may lack one.
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Last update timestamp (Unix ms)
    #[serde(default)]
    pub updated_at: i64,
}

impl Distribution {
    /// Create a new distribution with a fresh id and timestamps
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        point: LatLng,
        owner_id: impl Into<String>,
        status: VisitStatus,
    ) -> Self {
        let now = unix_millis_now();
        Self {
            id: DistributionId::new(),
            address: address.into(),
            lat: point.lat,
            lng: point.lng,
            status,
            amount: 0.0,
            payment_method: None,
            notes: String::new(),
            owner_id: owner_id.into(),
            created_at: Some(now),
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// Check field-level invariants.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Distribution address cannot be empty".to_string(),
            ));
        }
        if !self.point().is_valid() {
            return Err(Error::InvalidInput(format!(
                "Invalid coordinates: {}, {}",
                self.lat, self.lng
            )));
        }
        if self.owner_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Distribution owner cannot be empty".to_string(),
            ));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(Error::InvalidInput(
                "Amount must be a non-negative number".to_string(),
            ));
        }
        if self.amount > 0.0 && !self.status.takes_payment() {
            return Err(Error::InvalidInput(format!(
                "An amount can only be recorded for completed visits (status is {})",
                self.status
            )));
        }
        Ok(())
    }

    /// Trim text fields and clear payment fields the status does not use.
    pub fn normalize(&mut self) {
        self.address = self.address.trim().to_string();
        self.notes = self.notes.trim().to_string();
        self.owner_id = self.owner_id.trim().to_string();
        if !self.status.takes_payment() {
            self.amount = 0.0;
            self.payment_method = None;
        }
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }
}
