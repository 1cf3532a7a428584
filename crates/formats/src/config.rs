use std::fmt;
use std::fs;
use std::path::Path;

use foundation::math::EquirectFrame;
use foundation::{FloorId, Step};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: &str = "1";

pub const ENV_CONFIG_PATH: &str = "WALKTHROUGH_CONFIG";
pub const ENV_IMAGE_BASE: &str = "WALKTHROUGH_IMAGE_BASE";

const DEFAULT_IMAGE_BASE: &str =
    "https://pub-a901561e98c4422f9a0df782ce967b67.r2.dev/Boomerang_Club_360";

/// Static description of one floor of the walkthrough.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FloorConfig {
    pub id: FloorId,
    pub name: String,
    pub total_steps: Step,
    /// Image directory; relative values are joined onto `image_base_url`.
    pub image_dir: String,
    /// Location of the SVG whose first path yields the minimap waypoints.
    pub svg_path: String,
    /// Background floor-plan image drawn under the minimap.
    pub bg_image: String,
}

impl FloorConfig {
    pub fn contains_step(&self, step: Step) -> bool {
        (1..=self.total_steps).contains(&step)
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanoramaSize {
    pub width: f64,
    pub height: f64,
}

impl From<PanoramaSize> for EquirectFrame {
    fn from(size: PanoramaSize) -> Self {
        EquirectFrame::new(size.width, size.height)
    }
}

/// Zoom bounds in percent; 100% renders at `base_fov_deg`.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoomConfig {
    pub min: u32,
    pub max: u32,
    pub step: u32,
    pub base_fov_deg: f64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: 75,
            max: 150,
            step: 5,
            base_fov_deg: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "default_version")]
    pub version: String,
    pub image_base_url: String,
    #[serde(default = "default_image_ext")]
    pub image_ext: String,
    #[serde(default = "default_panorama")]
    pub equirect: PanoramaSize,
    /// Neighbouring steps preloaded on each side of the current step.
    #[serde(default = "default_preload_radius")]
    pub preload_radius: u32,
    /// Steps `2..=startup_preload` are fetched in the background at startup.
    #[serde(default = "default_startup_preload")]
    pub startup_preload: u32,
    #[serde(default)]
    pub zoom: ZoomConfig,
    pub default_floor: FloorId,
    pub floors: Vec<FloorConfig>,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_image_ext() -> String {
    "jpg".to_string()
}

fn default_panorama() -> PanoramaSize {
    PanoramaSize {
        width: 4096.0,
        height: 2048.0,
    }
}

fn default_preload_radius() -> u32 {
    5
}

fn default_startup_preload() -> u32 {
    10
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    UnsupportedVersion { found: String },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {err}"),
            ConfigError::Parse(err) => write!(f, "config parse error: {err}"),
            ConfigError::UnsupportedVersion { found } => {
                write!(f, "unsupported config version: {found}")
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for ViewerConfig {
    fn default() -> Self {
        let floor = |id: &str, name: &str, total_steps: Step, dir: &str, svg: &str, plan: &str| {
            FloorConfig {
                id: FloorId::new(id),
                name: name.to_string(),
                total_steps,
                image_dir: dir.to_string(),
                svg_path: format!("./data/paths/{svg}"),
                bg_image: format!("./data/floorplans/{plan}"),
            }
        };

        Self {
            version: default_version(),
            image_base_url: DEFAULT_IMAGE_BASE.to_string(),
            image_ext: default_image_ext(),
            equirect: default_panorama(),
            preload_radius: default_preload_radius(),
            startup_preload: default_startup_preload(),
            zoom: ZoomConfig::default(),
            default_floor: FloorId::new("3rd"),
            floors: vec![
                floor(
                    "ground",
                    "Ground Floor",
                    36,
                    "ground-floor",
                    "Ground.svg",
                    "ground_floor_plan.png",
                ),
                floor("3rd", "3rd Floor", 18, "floor-3", "Floor_3.svg", "floor_3_plan.png"),
                floor("roof", "Roof", 19, "roof", "Roof.svg", "roof_plan.png"),
            ],
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = serde_json::from_str(payload).map_err(ConfigError::Parse)?;
        if config.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
            });
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let payload = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&payload)
    }

    /// Built-in defaults, or the file named by `WALKTHROUGH_CONFIG`, with
    /// `WALKTHROUGH_IMAGE_BASE` overriding the image base URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(base) = std::env::var(ENV_IMAGE_BASE) {
            config.image_base_url = base;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.floors.is_empty() {
            return Err(ConfigError::Invalid("no floors configured".to_string()));
        }
        for (i, floor) in self.floors.iter().enumerate() {
            if floor.total_steps == 0 {
                return Err(ConfigError::Invalid(format!(
                    "floor {} has no steps",
                    floor.id
                )));
            }
            if self.floors[..i].iter().any(|f| f.id == floor.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate floor id {}",
                    floor.id
                )));
            }
        }
        if self.floor(&self.default_floor).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default floor {} is not configured",
                self.default_floor
            )));
        }
        let z = self.zoom;
        if z.step == 0 || z.min == 0 || z.min > z.max || z.base_fov_deg <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "bad zoom bounds: min={} max={} step={} fov={}",
                z.min, z.max, z.step, z.base_fov_deg
            )));
        }
        if !(self.equirect.width > 0.0 && self.equirect.height > 0.0) {
            return Err(ConfigError::Invalid("panorama size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn floor(&self, id: &FloorId) -> Option<&FloorConfig> {
        self.floors.iter().find(|f| &f.id == id)
    }

    pub fn frame(&self) -> EquirectFrame {
        self.equirect.into()
    }

    /// Resolved image directory for a floor, without a trailing slash.
    pub fn image_dir(&self, floor: &FloorConfig) -> String {
        let dir = floor.image_dir.trim_end_matches('/');
        if dir.contains("://") || dir.starts_with('/') || self.image_base_url.is_empty() {
            return dir.to_string();
        }
        format!("{}/{}", self.image_base_url.trim_end_matches('/'), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ViewerConfig};
    use foundation::FloorId;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_describe_three_floors() {
        let config = ViewerConfig::default();
        config.validate().expect("defaults are valid");

        let steps: Vec<_> = config
            .floors
            .iter()
            .map(|f| (f.id.as_str(), f.total_steps))
            .collect();
        assert_eq!(steps, vec![("ground", 36), ("3rd", 18), ("roof", 19)]);
        assert_eq!(config.default_floor, FloorId::new("3rd"));
    }

    #[test]
    fn image_dir_joins_relative_dirs() {
        let mut config = ViewerConfig::default();
        config.image_base_url = "https://cdn.example/tour/".to_string();
        let roof = config.floor(&FloorId::new("roof")).expect("roof").clone();
        assert_eq!(config.image_dir(&roof), "https://cdn.example/tour/roof");

        let mut local = roof.clone();
        local.image_dir = "/srv/images/roof/".to_string();
        assert_eq!(config.image_dir(&local), "/srv/images/roof");
    }

    #[test]
    fn json_round_trip_with_defaults_applied() {
        let payload = r#"{
            "image_base_url": "https://cdn.example",
            "default_floor": "a",
            "floors": [
                { "id": "a", "name": "A", "total_steps": 3, "image_dir": "a",
                  "svg_path": "a.svg", "bg_image": "a.png" }
            ]
        }"#;
        let config = ViewerConfig::from_json_str(payload).expect("parse");
        assert_eq!(config.image_ext, "jpg");
        assert_eq!(config.preload_radius, 5);
        assert_eq!(config.zoom.min, 75);
        assert_eq!(config.floors[0].total_steps, 3);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viewer.json");
        let payload = serde_json::to_string(&ViewerConfig::default()).expect("serialize");
        std::fs::write(&path, payload).expect("write");

        let config = ViewerConfig::load(&path).expect("load");
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn rejects_unknown_default_floor() {
        let mut config = ViewerConfig::default();
        config.default_floor = FloorId::new("basement");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_floors_and_empty_floors() {
        let mut config = ViewerConfig::default();
        let dup = config.floors[0].clone();
        config.floors.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ViewerConfig::default();
        config.floors[1].total_steps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut config = ViewerConfig::default();
        config.version = "9".to_string();
        let payload = serde_json::to_string(&config).expect("serialize");
        assert!(matches!(
            ViewerConfig::from_json_str(&payload),
            Err(ConfigError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_inverted_zoom() {
        let mut config = ViewerConfig::default();
        config.zoom.min = 200;
        assert!(config.validate().is_err());
    }
}
