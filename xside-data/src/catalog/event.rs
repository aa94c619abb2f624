//! Display events reported back to the catalog service.

use chrono::{DateTime, SecondsFormat, Utc};
use geo::Point;
use serde::Serialize;
use serde_json::{Value, json};
use xside_core::ImagePath;

/// Kind of display event, encoded with the service's short codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// Playback started.
    #[serde(rename = "S")]
    Start,
    /// An image was shown.
    #[serde(rename = "SH")]
    Show,
    /// Playback stopped.
    #[serde(rename = "P")]
    Stop,
    /// A recoverable problem occurred.
    #[serde(rename = "WA")]
    Warning,
    /// An unrecoverable problem occurred.
    #[serde(rename = "ER")]
    Error,
}

/// One display event located at a GPS position.
///
/// # Examples
///
/// ```
/// use geo::Point;
/// use xside_data::catalog::{DisplayEvent, EventKind};
///
/// let event = DisplayEvent::new(EventKind::Start, Point::new(37.6, 55.7));
/// let payload = event.to_feature_collection();
/// assert_eq!(payload["features"][0]["properties"]["event"], "S");
/// assert_eq!(payload["features"][0]["geometry"]["coordinates"][0], 37.6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Image the event refers to, if any.
    pub item_file: Option<ImagePath>,
    /// Free-form details, sent JSON-encoded.
    pub data: Option<Value>,
    /// When the event happened; `None` stamps the time of sending.
    pub timestamp: Option<DateTime<Utc>>,
    /// Position as `(lon, lat)`.
    pub position: Point<f64>,
}

impl DisplayEvent {
    /// Create an event of `kind` at `position`.
    #[must_use]
    pub const fn new(kind: EventKind, position: Point<f64>) -> Self {
        Self {
            kind,
            item_file: None,
            data: None,
            timestamp: None,
            position,
        }
    }

    /// Attach the image the event refers to.
    #[must_use]
    pub fn with_item_file(mut self, item_file: ImagePath) -> Self {
        self.item_file = Some(item_file);
        self
    }

    /// Attach free-form details.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the event time.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Encode the event as a single-feature GeoJSON `FeatureCollection`.
    #[must_use]
    pub fn to_feature_collection(&self) -> Value {
        let timestamp = self
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Micros, false);
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {
                    "event": self.kind,
                    "item_file": self.item_file.as_ref().map_or("", ImagePath::as_str),
                    "data": self.data.as_ref().map(Value::to_string),
                    "timestamp": timestamp,
                },
                "geometry": {
                    "type": "Point",
                    "coordinates": [self.position.x(), self.position.y()],
                },
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(EventKind::Start, "S")]
    #[case(EventKind::Show, "SH")]
    #[case(EventKind::Stop, "P")]
    #[case(EventKind::Warning, "WA")]
    #[case(EventKind::Error, "ER")]
    fn kinds_use_short_codes(#[case] kind: EventKind, #[case] code: &str) {
        assert_eq!(serde_json::to_value(kind).expect("encode"), json!(code));
    }

    #[rstest]
    fn encodes_full_event() {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 0)
            .single()
            .expect("valid time");
        let event = DisplayEvent::new(EventKind::Show, Point::new(37.55, 55.74))
            .with_item_file(ImagePath::new("images/c1/a.png").expect("valid path"))
            .with_data(json!({"item_id": 3}))
            .with_timestamp(timestamp);

        let payload = event.to_feature_collection();
        let feature = &payload["features"][0];
        assert_eq!(payload["type"], "FeatureCollection");
        assert_eq!(feature["properties"]["event"], "SH");
        assert_eq!(feature["properties"]["item_file"], "images/c1/a.png");
        assert_eq!(feature["properties"]["data"], r#"{"item_id":3}"#);
        assert_eq!(
            feature["properties"]["timestamp"],
            "2024-05-01T12:30:00.000000+00:00"
        );
        assert_eq!(feature["geometry"], json!({"type": "Point", "coordinates": [37.55, 55.74]}));
    }

    #[rstest]
    fn missing_details_are_null_or_empty() {
        let payload = DisplayEvent::new(EventKind::Error, Point::new(0.0, 0.0)).to_feature_collection();
        let properties = &payload["features"][0]["properties"];
        assert_eq!(properties["item_file"], "");
        assert_eq!(properties["data"], Value::Null);
        assert!(properties["timestamp"].as_str().is_some_and(|stamp| stamp.ends_with("+00:00")));
    }
}
