//! Mapping between local records and remote rows

use serde_json::{json, Value};

use crate::gateway::{Fields, RemoteRecord};
use crate::models::{Distribution, Zone};
use crate::store::ReplicaRecord;

/// Remote field that carries the client-generated id of a distribution.
pub const LOCAL_ID_FIELD: &str = "localId";
/// Remote field that carries the id of a zone.
pub const ZONE_ID_FIELD: &str = "zoneId";
/// Remote field distributions are scoped by when a team syncs its own rows.
pub const OWNER_FIELD: &str = "ownerId";

/// How a collection is brought in line with its remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Match rows by embedded local id (then by fallback key) and diff
    Indexed,
    /// Delete every remote row and recreate every local record
    ReplaceAll,
}

/// A replica record that can be mirrored to a remote table.
pub trait SyncRecord: ReplicaRecord {
    const STRATEGY: SyncStrategy;

    /// Natural-key field used to adopt rows written before local ids existed.
    const FALLBACK_FIELD: Option<&'static str>;

    /// Full set of fields mirrored remotely, local id included.
    fn remote_fields(&self) -> Fields;

    /// Normalized natural key of this record.
    fn fallback_key(&self) -> Option<String> {
        None
    }

    fn created_at(&self) -> Option<i64>;

    fn set_created_at(&mut self, created_at: i64);
}

/// Normalize a natural key so cosmetic differences do not break matching.
pub fn normalize_key(raw: &str) -> Option<String> {
    let key = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Embedded local id of a remote row, if any.
pub fn remote_local_id(record: &RemoteRecord) -> Option<&str> {
    record.text_field(LOCAL_ID_FIELD)
}

/// Natural key of a remote row under `R`'s fallback field.
pub fn remote_fallback_key<R: SyncRecord>(record: &RemoteRecord) -> Option<String> {
    R::FALLBACK_FIELD
        .and_then(|field| record.text_field(field))
        .and_then(normalize_key)
}

impl SyncRecord for Distribution {
    const STRATEGY: SyncStrategy = SyncStrategy::Indexed;
    const FALLBACK_FIELD: Option<&'static str> = Some("address");

    fn remote_fields(&self) -> Fields {
        to_fields(json!({
            LOCAL_ID_FIELD: self.id.as_str(),
            "address": self.address,
            "lat": self.lat,
            "lng": self.lng,
            "status": self.status.as_str(),
            "amount": self.amount,
            "paymentMethod": self.payment_method.map(|method| method.as_str()),
            "notes": self.notes,
            OWNER_FIELD: self.owner_id,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        }))
    }

    fn fallback_key(&self) -> Option<String> {
        normalize_key(&self.address)
    }

    fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    fn set_created_at(&mut self, created_at: i64) {
        self.created_at = Some(created_at);
    }
}

impl SyncRecord for Zone {
    const STRATEGY: SyncStrategy = SyncStrategy::ReplaceAll;
    const FALLBACK_FIELD: Option<&'static str> = None;

    fn remote_fields(&self) -> Fields {
        // Shapes are nested; tabular stores keep them as JSON text.
        let shape = serde_json::to_string(&self.shape).unwrap_or_default();
        to_fields(json!({
            ZONE_ID_FIELD: self.id.as_str(),
            "name": self.name,
            "color": self.color,
            "shape": shape,
            "ownerTeamId": self.owner_team_id,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        }))
    }

    fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    fn set_created_at(&mut self, created_at: i64) {
        self.created_at = Some(created_at);
    }
}

fn to_fields(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}

/// Whether a remote row differs from the fields a local record would write.
///
/// Only fields the local record mirrors are compared; extra remote columns
/// are ignored. Remote stores drop empty cells, so a missing cell equals
/// `null`, `""` and `false`. Numbers compare by value.
pub fn fields_diverge(local: &Fields, remote: &Fields) -> bool {
    local
        .iter()
        .any(|(name, value)| !values_match(value, remote.get(name)))
}

fn values_match(local: &Value, remote: Option<&Value>) -> bool {
    match (local, remote) {
        (Value::Number(a), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0),
            _ => a == b,
        },
        (local, None | Some(Value::Null)) => is_blank(local),
        (local, Some(remote)) if is_blank(local) && is_blank(remote) => true,
        (local, Some(remote)) => local == remote,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Bool(flag) => !flag,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LatLng, Shape};
    use crate::models::VisitStatus;

    fn fields(value: Value) -> Fields {
        to_fields(value)
    }

    #[test]
    fn distribution_fields_embed_local_id() {
        let distribution = Distribution::new(
            "3 impasse Verte",
            LatLng::new(45.0, 4.0),
            "team-2",
            VisitStatus::Refused,
        );
        let fields = distribution.remote_fields();
        assert_eq!(fields[LOCAL_ID_FIELD], distribution.id.as_str());
        assert_eq!(fields[OWNER_FIELD], "team-2");
        assert_eq!(fields["status"], "refused");
        assert_eq!(fields["paymentMethod"], Value::Null);
    }

    #[test]
    fn zone_shape_is_stored_as_json_text() {
        let zone = Zone::new(
            "North",
            Shape::Circle {
                center: LatLng::new(1.0, 2.0),
                radius_meters: 100.0,
            },
        );
        let fields = zone.remote_fields();
        let shape: Shape = serde_json::from_str(fields["shape"].as_str().unwrap()).unwrap();
        assert_eq!(shape, zone.shape);
    }

    #[test]
    fn normalize_key_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_key("  12  Rue des LILAS "),
            Some("12 rue des lilas".to_string())
        );
        assert_eq!(normalize_key("   "), None);
    }

    #[test]
    fn missing_cells_match_blank_values() {
        let local = fields(json!({ "notes": "", "paymentMethod": null, "archived": false }));
        assert!(!fields_diverge(&local, &Fields::new()));
    }

    #[test]
    fn numbers_compare_by_value() {
        let local = fields(json!({ "amount": 5.0 }));
        assert!(!fields_diverge(&local, &fields(json!({ "amount": 5 }))));
        assert!(fields_diverge(&local, &fields(json!({ "amount": 5.5 }))));
    }

    #[test]
    fn extra_remote_columns_are_ignored() {
        let local = fields(json!({ "address": "X" }));
        let remote = fields(json!({ "address": "X", "Created": "2024-01-01" }));
        assert!(!fields_diverge(&local, &remote));
        assert!(fields_diverge(&local, &fields(json!({ "address": "Y" }))));
    }
}
