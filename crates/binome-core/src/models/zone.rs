//! Zone model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::{LatLng, Shape};
use crate::util::{next_timestamp, unix_millis_now};

/// Identifier of a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    /// Create a new unique zone id using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A named geographic region, optionally assigned to a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    /// Display color, usually a `#rrggbb` string
    #[serde(default)]
    pub color: String,
    pub shape: Shape,
    #[serde(default)]
    pub owner_team_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: i64,
}

impl Zone {
    pub const DEFAULT_COLOR: &'static str = "#3388ff";

    /// Create a new zone with a fresh id and timestamps
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        let now = unix_millis_now();
        Self {
            id: ZoneId::new(),
            name: name.into(),
            color: Self::DEFAULT_COLOR.to_string(),
            shape,
            owner_team_id: None,
            created_at: Some(now),
            updated_at: now,
        }
    }

    /// Whether `point` lies inside the zone
    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        self.shape.contains(point)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Zone name cannot be empty".to_string()));
        }
        self.shape
            .check()
            .map_err(|reason| Error::InvalidInput(format!("Invalid zone shape: {reason}")))
    }

    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.color = self.color.trim().to_string();
        if self.color.is_empty() {
            self.color = Self::DEFAULT_COLOR.to_string();
        }
        self.owner_team_id = crate::util::normalize_text_option(self.owner_team_id.take());
    }

    pub fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_defaults_color_and_contains_point() {
        let zone = Zone::new(
            "North",
            Shape::Circle {
                center: LatLng::new(48.85, 2.35),
                radius_meters: 500.0,
            },
        );
        assert_eq!(zone.color, Zone::DEFAULT_COLOR);
        assert!(zone.contains(LatLng::new(48.85, 2.35)));
        assert!(zone.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_zone() {
        let zone = Zone::new("Empty", Shape::Polygon { vertices: vec![] });
        assert!(matches!(zone.validate(), Err(Error::InvalidInput(_))));

        let unnamed = Zone::new(
            " ",
            Shape::Circle {
                center: LatLng::new(0.0, 0.0),
                radius_meters: 10.0,
            },
        );
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn normalize_drops_blank_owner_and_color() {
        let mut zone = Zone::new(
            " South ",
            Shape::Circle {
                center: LatLng::new(0.0, 0.0),
                radius_meters: 10.0,
            },
        );
        zone.color = "  ".to_string();
        zone.owner_team_id = Some("   ".to_string());
        zone.normalize();

        assert_eq!(zone.name, "South");
        assert_eq!(zone.color, Zone::DEFAULT_COLOR);
        assert_eq!(zone.owner_team_id, None);
    }
}
