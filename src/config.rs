//! YAML settings of the command line

use std::fs;

use serde::Deserialize;
use time::Duration;
use tracing::debug;

use crate::analysis::{ActivityMethod, SpeedCategories, TransportModeMethod};
#[cfg(feature = "csv")]
use crate::io::{CsvLayout, GeometryEncoding};
use crate::preprocessing::StaypointOptions;
use crate::{Error, Result};

/// Name of the settings file, looked up in the working and home directories
pub const FILE_NAME: &str = ".trajframe.yaml";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub columns: ColumnsConfig,
    pub staypoints: StaypointsConfig,
    pub activity: ActivityConfig,
    pub transport: TransportConfig,
}

/// Column names of the CSV files
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub longitude: String,
    pub latitude: String,
    /// WKT geometry
    pub geometry: String,
    pub index: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            longitude: "longitude".to_string(),
            latitude: "latitude".to_string(),
            geometry: "geom".to_string(),
            index: "id".to_string(),
        }
    }
}

#[cfg(feature = "csv")]
impl ColumnsConfig {
    pub fn positionfixes_layout(&self) -> CsvLayout {
        CsvLayout {
            geometry: GeometryEncoding::LonLat {
                lon: self.longitude.clone(),
                lat: self.latitude.clone(),
            },
            geometry_name: self.geometry.clone(),
            ..CsvLayout::positionfixes()
        }
    }

    pub fn staypoints_layout(&self) -> CsvLayout {
        CsvLayout {
            geometry: GeometryEncoding::Wkt(self.geometry.clone()),
            geometry_name: self.geometry.clone(),
            index: Some(self.index.clone()),
            ..CsvLayout::staypoints()
        }
    }

    pub fn triplegs_layout(&self) -> CsvLayout {
        CsvLayout {
            geometry: GeometryEncoding::Wkt(self.geometry.clone()),
            geometry_name: self.geometry.clone(),
            index: Some(self.index.clone()),
            ..CsvLayout::triplegs()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StaypointsConfig {
    pub method: String,
    /// Meters
    pub dist_threshold: f64,
    /// Seconds
    pub time_threshold: f64,
}

impl Default for StaypointsConfig {
    fn default() -> Self {
        Self {
            method: "sliding".to_string(),
            dist_threshold: 100.0,
            time_threshold: 300.0,
        }
    }
}

impl StaypointsConfig {
    pub fn options(&self) -> Result<StaypointOptions> {
        if !(0.0..=i64::MAX as f64).contains(&self.time_threshold) {
            return Err(Error::Config(format!(
                "staypoints.time_threshold must be a non negative number of seconds, got {}",
                self.time_threshold
            )));
        }

        Ok(StaypointOptions {
            method: self.method.parse()?,
            dist_threshold: self.dist_threshold,
            time_threshold: Duration::seconds_f64(self.time_threshold),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub method: String,
    /// Minutes
    pub time_threshold: f64,
    pub column: String,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            method: "time_threshold".to_string(),
            time_threshold: 15.0,
            column: "is_activity".to_string(),
        }
    }
}

impl ActivityConfig {
    pub fn method(&self) -> Result<ActivityMethod> {
        self.method.parse()
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Category {
    /// m/s
    pub upper_bound: f64,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub method: String,
    /// Speed bands, the default bands when missing
    pub categories: Option<Vec<Category>>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            method: "simple-coarse".to_string(),
            categories: None,
        }
    }
}

impl TransportConfig {
    pub fn method(&self) -> Result<TransportModeMethod> {
        self.method.parse()
    }

    pub fn categories(&self) -> Result<SpeedCategories> {
        match &self.categories {
            Some(categories) => SpeedCategories::new(
                categories
                    .iter()
                    .map(|c| (c.upper_bound, c.label.clone()))
                    .collect(),
            ),
            None => Ok(SpeedCategories::default()),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::parse(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    fn parse(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // an empty document is null for serde_yaml
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(yaml)
    }

    /// Settings of the first readable file among `candidates`, defaults
    /// when there is none
    pub fn load_from(candidates: &[String]) -> Result<Self> {
        for fi in candidates {
            if let Ok(s) = fs::read_to_string(fi) {
                debug!("Settings loaded from {}", fi);
                return Self::parse(&s).map_err(|e| Error::Config(format!("{}: {}", fi, e)));
            }
        }

        Ok(Self::default())
    }

    /// Settings from `provided`, `.trajframe.yaml` or `~/.trajframe.yaml`
    #[cfg(feature = "cli")]
    pub fn load(provided: Option<String>) -> Result<Self> {
        let mut options = vec![];

        if let Some(sprovided) = provided {
            options.push(sprovided);
        }

        options.push(FILE_NAME.to_string());

        if let Some(home) = dirs::home_dir() {
            if let Some(shome) = home.to_str() {
                options.push(format!("{}/{}", shome, FILE_NAME));
            }
        }

        Self::load_from(&options)
    }
}
