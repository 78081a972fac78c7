//! Pollutant measurement series for the station detail panel

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Warsaw;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MEASUREMENT_LIST_KEYS: &[&str] = &["Lista danych pomiarowych", "values"];
const DATE_KEYS: &[&str] = &["Data", "date"];
const VALUE_KEYS: &[&str] = &["Wartość", "value"];
const STATION_CODE_KEYS: &[&str] = &["Kod stanowiska", "Station Code"];

/// Pollutants tracked in the detail panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm10,
    Pm25,
    O3,
    No2,
    So2,
}

impl Pollutant {
    pub const ALL: [Pollutant; 5] = [
        Pollutant::Pm10,
        Pollutant::Pm25,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
    ];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm25 => "pm25",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
        }
    }

    /// Match a sensor's parameter code (e.g. `"PM2.5"`, `"no2"`).
    #[must_use]
    pub fn from_param_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "PM10" => Some(Pollutant::Pm10),
            "PM2.5" | "PM25" => Some(Pollutant::Pm25),
            "O3" => Some(Pollutant::O3),
            "NO2" => Some(Pollutant::No2),
            "SO2" => Some(Pollutant::So2),
            _ => None,
        }
    }
}

/// One reading of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(rename = "dateISO")]
    pub date: DateTime<Utc>,
    pub value: f64,
    pub station_code: Option<String>,
}

impl Measurement {
    /// ISO-8601 UTC timestamp with millisecond precision
    #[must_use]
    pub fn date_iso(&self) -> String {
        self.date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

/// Recent measurement series of one station, one per pollutant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationDetailsData {
    pub pm10: Vec<Measurement>,
    pub pm25: Vec<Measurement>,
    pub o3: Vec<Measurement>,
    pub no2: Vec<Measurement>,
    pub so2: Vec<Measurement>,
}

impl StationDetailsData {
    #[must_use]
    pub fn series(&self, pollutant: Pollutant) -> &[Measurement] {
        match pollutant {
            Pollutant::Pm10 => &self.pm10,
            Pollutant::Pm25 => &self.pm25,
            Pollutant::O3 => &self.o3,
            Pollutant::No2 => &self.no2,
            Pollutant::So2 => &self.so2,
        }
    }

    pub fn series_mut(&mut self, pollutant: Pollutant) -> &mut Vec<Measurement> {
        match pollutant {
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::Pm25 => &mut self.pm25,
            Pollutant::O3 => &mut self.o3,
            Pollutant::No2 => &mut self.no2,
            Pollutant::So2 => &mut self.so2,
        }
    }

    /// Newest reading of a pollutant, if any survived the window
    #[must_use]
    pub fn latest(&self, pollutant: Pollutant) -> Option<&Measurement> {
        self.series(pollutant).last()
    }
}

fn first_present<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

/// Parse an upstream timestamp. RFC 3339 strings carry their own offset;
/// naive `YYYY-MM-DD HH:MM[:SS]` strings are local Polish time.
pub fn parse_measurement_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())?;

    // Ambiguous autumn hour resolves to the earlier instant.
    Warsaw
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_entry(raw: &Value) -> Option<Measurement> {
    let date = first_present(raw, DATE_KEYS)
        .and_then(Value::as_str)
        .and_then(parse_measurement_date)?;

    let value = match first_present(raw, VALUE_KEYS)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())?;

    let station_code = first_present(raw, STATION_CODE_KEYS)
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(Measurement {
        date,
        value,
        station_code,
    })
}

/// Normalise a sensor data response into a chronological series covering
/// `[now - window, ..]`. Entries without a date or value are dropped.
pub fn extract_measurements(
    response: &Value,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<Measurement> {
    let Some(entries) = first_present(response, MEASUREMENT_LIST_KEYS).and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let cutoff = now - window;
    let mut series: Vec<Measurement> = entries
        .iter()
        .filter_map(parse_entry)
        .filter(|m| m.date >= cutoff)
        .collect();

    series.sort_by_key(|m| m.date);
    series
}
