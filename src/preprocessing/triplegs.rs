use geo::{Geometry, Simplify};

use crate::frame::Column;
use crate::model::Triplegs;
use crate::Result;

impl Triplegs {
    /// Douglas-Peucker simplification of every tripleg line
    ///
    /// `epsilon` is in the units of the coordinates, degrees for WGS84.
    pub fn smoothen(&self, epsilon: f64) -> Result<Triplegs> {
        let frame = self.frame();
        let Some(name) = frame.geometry_name() else {
            return Ok(self.clone());
        };

        let lines = frame
            .geometries()
            .unwrap_or_default()
            .iter()
            .map(|g| match g {
                Some(Geometry::LineString(line)) => Some(Geometry::LineString(line.simplify(&epsilon))),
                other => other.clone(),
            })
            .collect::<Vec<Option<Geometry<f64>>>>();

        self.derive_same(|f| f.with_column(name, Column::from(lines)))
    }
}
