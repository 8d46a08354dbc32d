//! Layout and option files.
//!
//! A layout file is a list of placed entities, each named the way the game
//! names them. The format is picked from the file extension.

use balancer_core::error::LayoutError;
use balancer_core::report::TestOptions;
use balancer_core::segment::{Layout, UndergroundType};
use balancer_spatial::{Direction, GridPosition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a file.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The entities parsed but do not form a valid layout.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file from its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Deserialize a string in the given format. `path` only labels errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    path: &Path,
) -> Result<T, DataLoadError> {
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Schema
// ===========================================================================

/// One placed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub position: GridPosition,
    /// Eight-way direction index, north = 0, clockwise.
    #[serde(default)]
    pub direction: u8,
    /// Only for underground belts.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub io_type: Option<UndergroundType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutFile {
    pub entities: Vec<EntityRecord>,
}

impl LayoutFile {
    /// Place every entity, in file order.
    pub fn to_layout(&self) -> Result<Layout, LayoutError> {
        let mut layout = Layout::new();
        for entity in &self.entities {
            let direction = Direction::from_index(entity.direction)
                .ok_or(LayoutError::InvalidDirection(entity.direction))?;
            layout.add_entity(&entity.name, entity.position, direction, entity.io_type)?;
        }
        Ok(layout)
    }
}

// ===========================================================================
// Loading
// ===========================================================================

pub fn load_layout(path: &Path) -> Result<Layout, DataLoadError> {
    let file: LayoutFile = deserialize_file(path)?;
    debug!(path = %path.display(), entities = file.entities.len(), "layout file read");
    Ok(file.to_layout()?)
}

pub fn load_options(path: &Path) -> Result<TestOptions, DataLoadError> {
    deserialize_file(path)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use balancer_core::segment::SpeedClass;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "balancer_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const SPLITTER_JSON: &str = r#"{
        "entities": [
            {"name": "fast-transport-belt", "position": {"x": 0, "y": 1}, "direction": 0},
            {"name": "fast-splitter", "position": {"x": 0, "y": 0}, "direction": 0},
            {"name": "fast-transport-belt", "position": {"x": 0, "y": -1}, "direction": 0},
            {"name": "fast-transport-belt", "position": {"x": 1, "y": -1}, "direction": 0}
        ]
    }"#;

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("a.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("a.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        for name in ["a.yaml", "a"] {
            assert!(matches!(
                detect_format(Path::new(name)),
                Err(DataLoadError::UnsupportedFormat { .. })
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Layouts
    // -----------------------------------------------------------------------

    #[test]
    fn json_layout_places_entities() {
        let file: LayoutFile =
            deserialize_str(SPLITTER_JSON, Format::Json, Path::new("layout.json")).unwrap();
        let layout = file.to_layout().unwrap();
        assert_eq!(layout.len(), 4);
        assert!(
            layout
                .iter()
                .all(|(_, segment)| segment.speed == SpeedClass::Fast)
        );
    }

    #[test]
    fn ron_layout_with_underground() {
        let content = r#"(
            entities: [
                (name: "underground-belt", position: (x: 0, y: 0), direction: 2, type: Some(input)),
                (name: "underground-belt", position: (x: 3, y: 0), direction: 2, type: Some(output)),
            ],
        )"#;
        let file: LayoutFile =
            deserialize_str(content, Format::Ron, Path::new("layout.ron")).unwrap();
        assert_eq!(file.entities[1].io_type, Some(UndergroundType::Output));
        assert_eq!(file.to_layout().unwrap().len(), 2);
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let file = LayoutFile {
            entities: vec![EntityRecord {
                name: "inserter".into(),
                position: GridPosition::new(0, 0),
                direction: 0,
                io_type: None,
            }],
        };
        assert_eq!(
            file.to_layout().unwrap_err(),
            LayoutError::UnknownEntity("inserter".into())
        );
    }

    #[test]
    fn bad_direction_is_rejected() {
        let file = LayoutFile {
            entities: vec![EntityRecord {
                name: "transport-belt".into(),
                position: GridPosition::new(0, 0),
                direction: 9,
                io_type: None,
            }],
        };
        assert_eq!(
            file.to_layout().unwrap_err(),
            LayoutError::InvalidDirection(9)
        );
    }

    #[test]
    fn load_layout_from_disk() {
        let dir = make_test_dir("layout");
        let path = dir.join("splitter.json");
        fs::write(&path, SPLITTER_JSON).unwrap();

        let layout = load_layout(&path).unwrap();
        assert_eq!(layout.len(), 4);

        cleanup(&dir);
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = make_test_dir("parse");
        let path = dir.join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        match load_layout(&path) {
            Err(DataLoadError::Parse { file, .. }) => assert_eq!(file, path),
            other => panic!("expected parse error, got {other:?}"),
        }

        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Options
    // -----------------------------------------------------------------------

    #[test]
    fn toml_options_use_defaults() {
        let dir = make_test_dir("options");
        let path = dir.join("options.toml");
        fs::write(&path, "throughput = true\nextensiveSweep = true\n").unwrap();

        let options = load_options(&path).unwrap();
        assert!(options.balance);
        assert!(options.throughput);
        assert!(options.extensive_sweep);
        assert!(!options.trickle);

        cleanup(&dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_options(Path::new("/nonexistent/balancer/options.ron"));
        assert!(matches!(result, Err(DataLoadError::Io(_))));
    }
}
