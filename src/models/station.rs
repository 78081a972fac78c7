//! Station model and the directory record normaliser

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Result, SmogMapError};

/// Placeholder name for records that carry none.
pub const MISSING_NAME: &str = "—";

/// Key of the station array in a directory response.
const STATION_LIST_KEY: &str = "Lista stacji pomiarowych";

// Field-mapping table: the first present, non-null key wins. The plain
// English keys are `Station`'s own field names, so a serialized station
// normalises back to itself.
const ID_KEYS: &[&str] = &["Identyfikator stacji", "id"];
const NAME_KEYS: &[&str] = &["Nazwa stacji", "stationName", "name"];
const LAT_KEYS: &[&str] = &["WGS84 φ N", "gegrLat", "lat"];
const LON_KEYS: &[&str] = &["WGS84 λ E", "gegrLon", "lon"];
const CITY_KEYS: &[&str] = &["Nazwa miasta", "city"];
const ADDRESS_KEYS: &[&str] = &["Ulica", "addressStreet", "address"];
const VOIVODESHIP_KEYS: &[&str] = &["Województwo", "voivodeship"];
const CODE_KEYS: &[&str] = &["Kod stacji", "stationCode", "code"];

/// A fixed-location air quality monitoring point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// String form of the upstream numeric id
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
    pub address: Option<String>,
    pub voivodeship: Option<String>,
    pub code: Option<String>,
}

/// The full station list as of one fetch (or cache hit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDirectorySnapshot {
    pub stations: Vec<Station>,
    pub fetched_at: DateTime<Utc>,
}

impl Station {
    /// Inclusive on all edges
    #[must_use]
    pub fn is_within(&self, bbox: &super::BoundingBox) -> bool {
        bbox.contains(self.lat, self.lon)
    }
}

fn first_present<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn text_field(raw: &Value, keys: &[&str]) -> Option<String> {
    first_present(raw, keys).and_then(as_text)
}

/// `city` is a plain string in the current API and an object in the legacy one.
fn city_field(raw: &Value) -> Option<String> {
    match first_present(raw, CITY_KEYS)? {
        Value::Object(city) => city.get("name").and_then(as_text),
        other => as_text(other),
    }
}

fn voivodeship_field(raw: &Value) -> Option<String> {
    text_field(raw, VOIVODESHIP_KEYS).or_else(|| {
        raw.pointer("/city/commune/provinceName")
            .and_then(as_text)
    })
}

/// Normalise one raw directory record.
///
/// Fails only when the record cannot be placed on the map: no id, or no
/// finite coordinates. Every other missing field degrades to `None` (or
/// [`MISSING_NAME`] for the name).
pub fn raw_to_station(raw: &Value) -> Result<Station> {
    let id = text_field(raw, ID_KEYS)
        .ok_or_else(|| SmogMapError::data_shape("station record without an id"))?;

    let lat = first_present(raw, LAT_KEYS).and_then(as_coordinate);
    let lon = first_present(raw, LON_KEYS).and_then(as_coordinate);
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(SmogMapError::data_shape(format!(
            "station {id} has no usable coordinates"
        )));
    };

    Ok(Station {
        name: text_field(raw, NAME_KEYS).unwrap_or_else(|| MISSING_NAME.to_string()),
        lat,
        lon,
        city: city_field(raw),
        address: text_field(raw, ADDRESS_KEYS),
        voivodeship: voivodeship_field(raw),
        code: text_field(raw, CODE_KEYS),
        id,
    })
}

/// Locate the station array inside a directory response.
fn station_records(response: &Value) -> &[Value] {
    if let Some(list) = response.get(STATION_LIST_KEY).and_then(Value::as_array) {
        return list.as_slice();
    }
    match response {
        Value::Array(list) => list.as_slice(),
        Value::Object(fields) => fields
            .values()
            .find_map(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        _ => &[],
    }
}

/// Normalise a whole directory response, keeping directory order.
///
/// Unplaceable records are skipped and later duplicates of an id dropped, so
/// the result never repeats an id.
pub fn normalize_station_list(response: &Value) -> Vec<Station> {
    let mut seen = HashSet::new();
    let mut stations = Vec::new();

    for raw in station_records(response) {
        match raw_to_station(raw) {
            Ok(station) => {
                if seen.insert(station.id.clone()) {
                    stations.push(station);
                } else {
                    warn!("Dropping duplicate station id {}", station.id);
                }
            }
            Err(e) => warn!("Skipping station record: {e}"),
        }
    }

    stations
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn gios_record() -> Value {
        json!({
            "Identyfikator stacji": 114,
            "Kod stacji": "DsWrocWybCon",
            "Nazwa stacji": "Wrocław, ul. Wyb. J. Conrada-Korzeniowskiego",
            "WGS84 φ N": "51.129378",
            "WGS84 λ E": "17.029250",
            "Identyfikator miasta": 1064,
            "Nazwa miasta": "Wrocław",
            "Gmina": "Wrocław",
            "Powiat": "Wrocław",
            "Województwo": "DOLNOŚLĄSKIE",
            "Ulica": "ul. Wyb. J. Conrada-Korzeniowskiego 18"
        })
    }

    #[test]
    fn test_gios_record_normalisation() {
        let station = raw_to_station(&gios_record()).unwrap();
        assert_eq!(station.id, "114");
        assert_eq!(station.name, "Wrocław, ul. Wyb. J. Conrada-Korzeniowskiego");
        assert_eq!(station.lat, 51.129378);
        assert_eq!(station.lon, 17.029250);
        assert_eq!(station.city.as_deref(), Some("Wrocław"));
        assert_eq!(station.voivodeship.as_deref(), Some("DOLNOŚLĄSKIE"));
        assert_eq!(station.code.as_deref(), Some("DsWrocWybCon"));
    }

    #[test]
    fn test_legacy_record_normalisation() {
        let raw = json!({
            "id": 14,
            "stationName": "Działoszyn",
            "gegrLat": "50.972167",
            "gegrLon": "14.941319",
            "city": {
                "id": 192,
                "name": "Działoszyn",
                "commune": {
                    "communeName": "Bogatynia",
                    "districtName": "zgorzelecki",
                    "provinceName": "DOLNOŚLĄSKIE"
                }
            },
            "addressStreet": null
        });

        let station = raw_to_station(&raw).unwrap();
        assert_eq!(station.id, "14");
        assert_eq!(station.name, "Działoszyn");
        assert_eq!(station.city.as_deref(), Some("Działoszyn"));
        assert_eq!(station.voivodeship.as_deref(), Some("DOLNOŚLĄSKIE"));
        assert_eq!(station.address, None);
    }

    #[test]
    fn test_missing_optional_fields_degrade() {
        let raw = json!({ "Identyfikator stacji": 7, "WGS84 φ N": 50.0, "WGS84 λ E": 20.0 });
        let station = raw_to_station(&raw).unwrap();
        assert_eq!(station.name, MISSING_NAME);
        assert_eq!(station.city, None);
        assert_eq!(station.address, None);
        assert_eq!(station.voivodeship, None);
        assert_eq!(station.code, None);
    }

    #[rstest]
    #[case::no_id(json!({ "WGS84 φ N": 50.0, "WGS84 λ E": 20.0 }))]
    #[case::no_lat(json!({ "Identyfikator stacji": 1, "WGS84 λ E": 20.0 }))]
    #[case::garbage_lon(json!({ "Identyfikator stacji": 1, "WGS84 φ N": 50.0, "WGS84 λ E": "east" }))]
    #[case::not_an_object(json!("station"))]
    fn test_unplaceable_records_are_rejected(#[case] raw: Value) {
        assert!(matches!(
            raw_to_station(&raw),
            Err(SmogMapError::DataShape { .. })
        ));
    }

    #[test]
    fn test_normalisation_is_idempotent() {
        let once = raw_to_station(&gios_record()).unwrap();
        let twice = raw_to_station(&serde_json::to_value(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_list_extraction_and_dedup() {
        let response = json!({
            "totalPages": 1,
            "Lista stacji pomiarowych": [
                { "Identyfikator stacji": 1, "WGS84 φ N": 50.0, "WGS84 λ E": 20.0 },
                { "Identyfikator stacji": 2 },
                { "Identyfikator stacji": 1, "WGS84 φ N": 51.0, "WGS84 λ E": 21.0 },
                { "Identyfikator stacji": "3", "WGS84 φ N": 52.0, "WGS84 λ E": 22.0 }
            ]
        });

        let stations = normalize_station_list(&response);
        let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(stations[0].lat, 50.0);
    }

    #[rstest]
    #[case::other_key(json!({ "links": {}, "stations": [{ "id": 9, "lat": 1.0, "lon": 2.0 }] }))]
    #[case::bare_array(json!([{ "id": 9, "lat": 1.0, "lon": 2.0 }]))]
    fn test_list_extraction_fallbacks(#[case] response: Value) {
        let stations = normalize_station_list(&response);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "9");
    }

    #[test]
    fn test_unrecognised_response_is_empty() {
        assert!(normalize_station_list(&json!({ "error": "nope" })).is_empty());
        assert!(normalize_station_list(&Value::Null).is_empty());
    }
}
