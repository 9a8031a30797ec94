//! JSON payloads the backend embeds into pages.
//!
//! Each payload is an ordered list of flat records keyed by `pk`. Unknown
//! fields are ignored so the backend may add columns freely.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Element id of the embedded people list.
pub const PERSON_SET: &str = "person-set-data";
/// Element id of the embedded organisation list.
pub const ORGANISATION_SET: &str = "organisation-set-data";
/// Element id of the embedded person-to-person relationships.
pub const RELATIONSHIP_SET: &str = "relationship-set-data";
/// Element id of the embedded person-to-organisation relationships.
pub const ORGANISATION_RELATIONSHIP_SET: &str = "organisation-relationship-set-data";
/// Element id of the embedded map pins.
pub const MAP_MARKERS: &str = "map-markers";

/// A person node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub pk: u64,
    pub name: String,
}

/// An organisation node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationRecord {
    pub pk: u64,
    pub name: String,
}

/// Reference to the record at one end of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub pk: u64,
}

/// A directed relationship between two records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub pk: u64,
    pub source: Endpoint,
    pub target: Endpoint,
    /// Relationship kind slug, e.g. `organisation-membership`.
    #[serde(default)]
    pub kind: Option<String>,
}

/// A pin shown on the map. Records without a location are sent with
/// null coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl MapMarker {
    /// Name with the backend's `&apos;` entity turned back into `'`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name.replace("&apos;", "'")
    }

    /// Both coordinates, if the record has a location.
    #[must_use]
    pub const fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// True if the record has coordinates and they are on the globe.
    #[must_use]
    pub fn has_valid_position(&self) -> bool {
        self.position().is_some_and(|(lat, lng)| {
            (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
        })
    }
}

/// Parses one embedded payload.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if `text` is not a list of the expected
/// records.
pub fn parse<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_people_ignoring_extra_fields() {
        let people: Vec<PersonRecord> = parse(
            r#"[{"pk": 1, "name": "Ada", "email": "ada@example.org"}, {"pk": 2, "name": "Bo"}]"#,
        )
        .unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].name, "Ada");
    }

    #[test]
    fn parses_relationships_with_optional_kind() {
        let rels: Vec<RelationshipRecord> = parse(
            r#"[
                {"pk": 5, "source": {"pk": 1}, "target": {"pk": 2}},
                {"pk": 6, "source": {"pk": 1, "name": "Ada"}, "target": {"pk": 9},
                 "kind": "organisation-membership"}
            ]"#,
        )
        .unwrap();
        assert_eq!(rels[0].kind, None);
        assert_eq!(rels[1].kind.as_deref(), Some("organisation-membership"));
        assert_eq!(rels[1].target.pk, 9);
    }

    #[test]
    fn marker_names_are_unescaped() {
        let markers: Vec<MapMarker> =
            parse(r#"[{"name": "St John&apos;s", "lat": 50.9, "lng": -1.4, "url": "/org/3"}]"#)
                .unwrap();
        assert_eq!(markers[0].display_name(), "St John's");
        assert!(markers[0].has_valid_position());
    }

    #[test]
    fn out_of_range_marker_is_flagged() {
        let marker = MapMarker {
            name: "x".into(),
            lat: Some(91.0),
            lng: Some(0.0),
            url: None,
        };
        assert!(!marker.has_valid_position());
    }

    #[test]
    fn markers_without_location_still_parse() {
        let markers: Vec<MapMarker> = parse(
            r#"[
                {"name": "Ada", "lat": 50.93, "lng": -1.39, "organisation": "Uni",
                 "org_lat": 50.9, "org_lng": -1.4, "country": "United Kingdom",
                 "url": "/people/1", "type": "Person"},
                {"name": "Bo", "lat": null, "lng": null, "organisation": null,
                 "org_lat": null, "org_lng": null, "country": null,
                 "url": "/people/2", "type": "Person"}
            ]"#,
        )
        .unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].position(), Some((50.93, -1.39)));
        assert!(markers[0].has_valid_position());
        assert_eq!(markers[1].position(), None);
        assert!(!markers[1].has_valid_position());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse::<PersonRecord>(r#"{"pk": 1}"#).is_err());
    }
}
