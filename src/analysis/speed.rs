//! Average tripleg speed

use geo::Geometry;

use super::durations;
use crate::frame::Column;
use crate::geogr::haversine_length;
use crate::model::Triplegs;
use crate::Result;

impl Triplegs {
    /// Average speed of every tripleg in m/s: haversine length over duration
    ///
    /// Rows without a line geometry or timestamps have no speed.
    pub fn speeds(&self) -> Result<Vec<Option<f64>>> {
        let frame = self.frame();
        let durations = durations(frame)?;
        let geometries = frame.geometries().unwrap_or_default();

        Ok(durations
            .iter()
            .enumerate()
            .map(|(pos, duration)| {
                let line = match geometries.get(pos) {
                    Some(Some(Geometry::LineString(line))) => line,
                    _ => return None,
                };
                duration.map(|d| haversine_length(line) / d.as_seconds_f64())
            })
            .collect())
    }

    /// The triplegs with their speed in a `speed` column
    pub fn with_speed(&self) -> Result<Triplegs> {
        let speeds = Column::from(self.speeds()?);

        self.derive_same(|f| f.with_column("speed", speeds))
    }
}
