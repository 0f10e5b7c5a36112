//! Waypoints and their JSON persistence.
//!
//! A dimension's waypoints live in a single document:
//!
//! ```json
//! { "waypoints": [ { "hidden": false, "name": "Base", "x": 10, "y": 64, "z": -20,
//!                    "color": "#00FF00", "type": "home" } ] }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use super::error::MapError;
use super::files::replace_file;

/// Color given to waypoints without a (valid) color
pub const DEFAULT_WAYPOINT_COLOR: u32 = 0xFFFFFF;

/// Registered waypoint types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WaypointType {
    #[default]
    Default,
    Death,
    Home,
}

impl WaypointType {
    pub const ALL: [WaypointType; 3] =
        [WaypointType::Default, WaypointType::Death, WaypointType::Home];

    /// Identifier stored in the waypoint file
    pub fn id(&self) -> &'static str {
        match self {
            WaypointType::Default => "default",
            WaypointType::Death => "death",
            WaypointType::Home => "home",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    /// Look up a type id, falling back to `Default` for unknown ids.
    pub fn from_id_or_default(id: &str) -> Self {
        Self::from_id(id).unwrap_or_default()
    }
}

/// A named point of interest in one dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Waypoint {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// RGB color, 24 bits
    pub color: u32,
    pub waypoint_type: WaypointType,
    pub hidden: bool,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            z,
            color: DEFAULT_WAYPOINT_COLOR,
            waypoint_type: WaypointType::Default,
            hidden: false,
        }
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color & 0xFFFFFF;
        self
    }

    pub fn with_type(mut self, waypoint_type: WaypointType) -> Self {
        self.waypoint_type = waypoint_type;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Format a color as `#RRGGBB` (uppercase, low 24 bits only).
pub fn format_color(color: u32) -> String {
    format!("#{:06X}", color & 0xFFFFFF)
}

/// Parse a textual color.
///
/// Accepts `#RRGGBB`, `0x` prefixed hex and plain decimal, with an optional
/// sign. The result is masked to 24 bits.
pub fn decode_color(text: &str) -> Option<u32> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let hex = digits
        .strip_prefix('#')
        .or_else(|| digits.strip_prefix("0x"))
        .or_else(|| digits.strip_prefix("0X"));
    let (radix, body) = match hex {
        Some(body) => (16, body),
        None => (10, digits),
    };

    // the sign was consumed above, a second one is malformed
    if body.starts_with(|c: char| c == '-' || c == '+') {
        return None;
    }
    let magnitude = i64::from_str_radix(body, radix).ok()?;

    let value = if negative { -magnitude } else { magnitude };
    let value = i32::try_from(value).ok()?;
    Some(value as u32 & 0xFFFFFF)
}

fn color_from_json(value: Option<&Value>) -> u32 {
    let parsed = match value {
        Some(Value::String(s)) => decode_color(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(|v| v as u32 & 0xFFFFFF),
        _ => None,
    };
    parsed.unwrap_or(DEFAULT_WAYPOINT_COLOR)
}

fn type_from_json(value: Option<&Value>) -> WaypointType {
    match value {
        Some(Value::String(id)) => WaypointType::from_id_or_default(id),
        _ => WaypointType::Default,
    }
}

/// Waypoint entry as written to disk.
#[derive(Serialize)]
struct WaypointRecord<'a> {
    hidden: bool,
    name: &'a str,
    x: i32,
    y: i32,
    z: i32,
    color: String,
    #[serde(rename = "type")]
    waypoint_type: &'static str,
}

#[derive(Serialize)]
struct WaypointDocument<'a> {
    waypoints: Vec<WaypointRecord<'a>>,
}

/// Waypoint entry as read from disk. Optional fields are kept as raw JSON
/// so a bad value only resets that field.
#[derive(Deserialize)]
struct RawWaypoint {
    hidden: bool,
    name: String,
    x: i32,
    y: i32,
    z: i32,
    #[serde(default)]
    color: Option<Value>,
    #[serde(default, rename = "type")]
    waypoint_type: Option<Value>,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    waypoints: Vec<RawWaypoint>,
}

impl From<RawWaypoint> for Waypoint {
    fn from(raw: RawWaypoint) -> Self {
        Waypoint {
            color: color_from_json(raw.color.as_ref()),
            waypoint_type: type_from_json(raw.waypoint_type.as_ref()),
            name: raw.name,
            x: raw.x,
            y: raw.y,
            z: raw.z,
            hidden: raw.hidden,
        }
    }
}

/// Parse a waypoint document from a JSON string.
pub fn parse_waypoints(json: &str) -> Result<Vec<Waypoint>, MapError> {
    let doc: RawDocument = serde_json::from_str(json)?;
    Ok(doc.waypoints.into_iter().map(Waypoint::from).collect())
}

/// Render waypoints as a pretty-printed JSON document.
pub fn waypoints_to_json(waypoints: &[Waypoint]) -> Result<String, MapError> {
    Ok(serde_json::to_string_pretty(&document(waypoints))?)
}

fn document(waypoints: &[Waypoint]) -> WaypointDocument<'_> {
    WaypointDocument {
        waypoints: waypoints
            .iter()
            .map(|w| WaypointRecord {
                hidden: w.hidden,
                name: &w.name,
                x: w.x,
                y: w.y,
                z: w.z,
                color: format_color(w.color),
                waypoint_type: w.waypoint_type.id(),
            })
            .collect(),
    }
}

/// Read a waypoint file.
pub fn read_waypoints(path: &Path) -> Result<Vec<Waypoint>, MapError> {
    let reader = BufReader::new(File::open(path)?);
    let doc: RawDocument = serde_json::from_reader(reader)?;
    Ok(doc.waypoints.into_iter().map(Waypoint::from).collect())
}

/// Write a waypoint file, atomically replacing the previous one.
pub fn write_waypoints(path: &Path, waypoints: &[Waypoint]) -> Result<(), MapError> {
    replace_file(path, |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &document(waypoints))?;
        writer.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base() -> Waypoint {
        Waypoint::new("Base", 10, 64, -20)
            .with_color(0x00FF00)
            .with_type(WaypointType::Home)
    }

    #[test]
    fn test_format_color() {
        assert_eq!(format_color(0x00FF00), "#00FF00");
        assert_eq!(format_color(0xabcdef), "#ABCDEF");
        assert_eq!(format_color(0xFF123456), "#123456");
    }

    #[test]
    fn test_decode_color_forms() {
        assert_eq!(decode_color("#00FF00"), Some(0x00FF00));
        assert_eq!(decode_color("#abcdef"), Some(0xABCDEF));
        assert_eq!(decode_color("0xFF0000"), Some(0xFF0000));
        assert_eq!(decode_color("65280"), Some(0x00FF00));
        assert_eq!(decode_color("-1"), Some(0xFFFFFF));
    }

    #[test]
    fn test_decode_color_invalid() {
        assert_eq!(decode_color("green"), None);
        assert_eq!(decode_color("#GG0000"), None);
        assert_eq!(decode_color(""), None);
        assert_eq!(decode_color("--5"), None);
        assert_eq!(decode_color("#FFFFFFFFF"), None);
    }

    #[test]
    fn test_type_lookup() {
        assert_eq!(WaypointType::from_id("home"), Some(WaypointType::Home));
        assert_eq!(WaypointType::from_id("nope"), None);
        assert_eq!(WaypointType::from_id_or_default("nope"), WaypointType::Default);
    }

    #[test]
    fn test_serialized_fields() {
        let json = waypoints_to_json(&[base()]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let entry = &value["waypoints"][0];

        assert_eq!(entry["color"], "#00FF00");
        assert_eq!(entry["type"], "home");
        assert_eq!(entry["name"], "Base");
        assert_eq!(entry["hidden"], false);
        assert_eq!(entry["x"], 10);
        assert_eq!(entry["y"], 64);
        assert_eq!(entry["z"], -20);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waypoints.json");
        let waypoints = vec![
            base(),
            Waypoint::new("Grave", -5, 12, 300)
                .with_type(WaypointType::Death)
                .hidden(true),
        ];

        write_waypoints(&path, &waypoints).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"color\": \"#00FF00\""));

        let loaded = read_waypoints(&path).unwrap();
        assert_eq!(loaded, waypoints);
    }

    #[test]
    fn test_write_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("waypoints.json");

        write_waypoints(&path, &[base(), Waypoint::new("Other", 0, 0, 0)]).unwrap();
        write_waypoints(&path, &[base()]).unwrap();

        assert_eq!(read_waypoints(&path).unwrap(), vec![base()]);
        // only the target file remains, no temporary leftovers
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_bad_color_falls_back() {
        let json = r#"{"waypoints":[{"hidden":false,"name":"A","x":1,"y":2,"z":3,"color":"purple"}]}"#;
        let loaded = parse_waypoints(json).unwrap();
        assert_eq!(loaded[0].color, DEFAULT_WAYPOINT_COLOR);
        assert_eq!(loaded[0].name, "A");
    }

    #[test]
    fn test_numeric_color_accepted() {
        let json = r#"{"waypoints":[{"hidden":false,"name":"A","x":1,"y":2,"z":3,"color":255}]}"#;
        assert_eq!(parse_waypoints(json).unwrap()[0].color, 0x0000FF);
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let json = r#"{"waypoints":[{"hidden":true,"name":"A","x":1,"y":2,"z":3,"type":"portal"}]}"#;
        let loaded = parse_waypoints(json).unwrap();
        assert_eq!(loaded[0].waypoint_type, WaypointType::Default);
        assert!(loaded[0].hidden);
    }

    #[test]
    fn test_optional_fields_missing() {
        let json = r#"{"waypoints":[{"hidden":false,"name":"A","x":1,"y":2,"z":3}]}"#;
        let loaded = parse_waypoints(json).unwrap();
        assert_eq!(loaded[0].color, DEFAULT_WAYPOINT_COLOR);
        assert_eq!(loaded[0].waypoint_type, WaypointType::Default);
    }

    #[test]
    fn test_missing_waypoints_key() {
        assert!(parse_waypoints("{}").unwrap().is_empty());
    }

    #[test]
    fn test_missing_required_field_fails_document() {
        let json = r#"{"waypoints":[{"name":"A","x":1,"y":2,"z":3}]}"#;
        assert!(matches!(parse_waypoints(json), Err(MapError::Json(_))));
    }

    #[test]
    fn test_malformed_document() {
        assert!(parse_waypoints("{\"waypoints\": [").is_err());
        assert!(parse_waypoints("[]").is_err());
    }
}
