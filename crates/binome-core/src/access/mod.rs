//! Role-based visibility of distributions and zones.
//!
//! Filtering only ever borrows from the caller's slices; storage is never
//! touched. A record the session may not see is simply left out.

use crate::geometry::LatLng;
use crate::models::{Distribution, Session, Zone};

/// Whether `session` may see `distribution`.
#[must_use]
pub fn can_see_distribution(session: &Session, distribution: &Distribution) -> bool {
    session.is_admin || distribution.owner_id == session.user_id
}

/// Whether `session` may see `zone`.
///
/// Non-admins see a zone when their assignment matches the zone id or the
/// zone name, or when the zone is assigned to their team. Assignments were
/// recorded in all three shapes over time, so every rule is checked.
#[must_use]
pub fn can_see_zone(session: &Session, zone: &Zone) -> bool {
    if session.is_admin {
        return true;
    }

    let assigned = session.assigned_zone.as_deref();
    assigned == Some(zone.id.as_str())
        || assigned == Some(zone.name.as_str())
        || zone.owner_team_id.as_deref() == Some(session.user_id.as_str())
}

/// Distributions visible to `session`, in input order.
pub fn visible_distributions<'a>(
    session: &Session,
    distributions: &'a [Distribution],
) -> Vec<&'a Distribution> {
    distributions
        .iter()
        .filter(|distribution| can_see_distribution(session, distribution))
        .collect()
}

/// Zones visible to `session`, in input order.
pub fn visible_zones<'a>(session: &Session, zones: &'a [Zone]) -> Vec<&'a Zone> {
    zones
        .iter()
        .filter(|zone| can_see_zone(session, zone))
        .collect()
}

/// Visible zones that contain `point`.
pub fn zones_for_point<'a>(session: &Session, point: LatLng, zones: &'a [Zone]) -> Vec<&'a Zone> {
    zones
        .iter()
        .filter(|zone| can_see_zone(session, zone) && zone.contains(point))
        .collect()
}

/// Visible distributions located inside `zone`.
///
/// Returns nothing when the zone itself is hidden from `session`.
pub fn distributions_in_zone<'a>(
    session: &Session,
    zone: &Zone,
    distributions: &'a [Distribution],
) -> Vec<&'a Distribution> {
    if !can_see_zone(session, zone) {
        return Vec::new();
    }
    distributions
        .iter()
        .filter(|distribution| {
            can_see_distribution(session, distribution) && zone.contains(distribution.point())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Shape;
    use crate::models::{VisitStatus, ZoneId};
    use pretty_assertions::assert_eq;

    fn member(assigned_zone: &str) -> Session {
        Session {
            user_id: "team-7".to_string(),
            display_name: "Binôme 7".to_string(),
            assigned_zone: Some(assigned_zone.to_string()),
            is_admin: false,
            expires_at: i64::MAX,
        }
    }

    fn admin() -> Session {
        Session {
            user_id: "admin".to_string(),
            display_name: "Coordination".to_string(),
            assigned_zone: None,
            is_admin: true,
            expires_at: i64::MAX,
        }
    }

    fn square_zone(id: &str, name: &str) -> Zone {
        let mut zone = Zone::new(
            name,
            Shape::Rectangle {
                south_west: LatLng::new(0.0, 0.0),
                north_east: LatLng::new(10.0, 10.0),
            },
        );
        zone.id = ZoneId::from(id);
        zone
    }

    fn visit(owner: &str, point: LatLng) -> Distribution {
        Distribution::new("1 place du Marché", point, owner, VisitStatus::Retry)
    }

    #[test]
    fn member_sees_zone_by_name_or_id_only() {
        let session = member("North");
        let by_name = square_zone("z-1", "North");
        let by_id = square_zone("North", "Centre");
        let other = square_zone("z-3", "South");

        assert!(can_see_zone(&session, &by_name));
        assert!(can_see_zone(&session, &by_id));
        assert!(!can_see_zone(&session, &other));
    }

    #[test]
    fn member_sees_zone_assigned_to_their_team() {
        let session = member("North");
        let mut zone = square_zone("z-4", "East");
        assert!(!can_see_zone(&session, &zone));

        zone.owner_team_id = Some("team-7".to_string());
        assert!(can_see_zone(&session, &zone));
    }

    #[test]
    fn member_without_assignment_sees_no_unowned_zone() {
        let mut session = member("North");
        session.assigned_zone = None;
        assert!(!can_see_zone(&session, &square_zone("z-1", "North")));
    }

    #[test]
    fn member_sees_only_owned_distributions() {
        let session = member("North");
        let records = vec![
            visit("team-7", LatLng::new(1.0, 1.0)),
            visit("team-8", LatLng::new(1.0, 1.0)),
            visit("team-7", LatLng::new(2.0, 2.0)),
        ];

        let visible = visible_distributions(&session, &records);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|record| record.owner_id == "team-7"));
    }

    #[test]
    fn admin_sees_everything() {
        let session = admin();
        let records = vec![visit("team-8", LatLng::new(1.0, 1.0))];
        let zones = vec![square_zone("z-3", "South")];

        assert_eq!(visible_distributions(&session, &records).len(), 1);
        assert_eq!(visible_zones(&session, &zones).len(), 1);
    }

    #[test]
    fn containment_queries_respect_visibility() {
        let session = member("North");
        let zones = vec![square_zone("z-1", "North"), square_zone("z-2", "South")];

        let found = zones_for_point(&session, LatLng::new(5.0, 5.0), &zones);
        assert_eq!(
            found.iter().map(|zone| zone.name.as_str()).collect::<Vec<_>>(),
            vec!["North"]
        );

        let records = vec![
            visit("team-7", LatLng::new(5.0, 5.0)),
            visit("team-7", LatLng::new(50.0, 50.0)),
            visit("team-8", LatLng::new(5.0, 5.0)),
        ];
        assert_eq!(distributions_in_zone(&session, &zones[0], &records).len(), 1);
        assert!(distributions_in_zone(&session, &zones[1], &records).is_empty());
    }

    #[test]
    fn filtering_leaves_input_untouched() {
        let session = member("North");
        let records = vec![visit("team-8", LatLng::new(1.0, 1.0))];
        let before = records.clone();
        assert!(visible_distributions(&session, &records).is_empty());
        assert_eq!(records, before);
    }
}
