//! Preprocessing: positionfixes to staypoints, tripleg simplification, tours

mod staypoints;
mod tours;
mod triplegs;

pub use staypoints::{ExtractionMethod, StaypointOptions};
pub use tours::TourOptions;
