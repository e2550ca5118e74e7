//! Structural contracts of the typed views

use arrow::datatypes::DataType;

use crate::frame::Frame;
use crate::geogr::{geom_type, is_valid};
use crate::{Error, Result};

/// Geometry shape required by a contract
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    LineString,
    MultiPoint,
}

impl GeometryType {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::MultiPoint => "MultiPoint",
        }
    }
}

/// Requirements a table has to meet to be handled as a typed view
///
/// [`Contract::validate`] reports the first violated requirement and
/// [`Contract::check`] is its boolean form, so both always agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contract {
    pub entity: &'static str,
    pub required: &'static [&'static str],
    /// Columns that must hold timezone aware timestamps
    pub timestamps: &'static [&'static str],
    pub geometry: Option<GeometryType>,
}

impl Contract {
    /// Validate the table, naming the violated requirement on failure
    ///
    /// `validate_geometry` toggles the validity and type checks of the
    /// geometries; a geometry bearing contract always needs an active
    /// geometry column.
    pub fn validate(&self, frame: &Frame, validate_geometry: bool) -> Result<()> {
        if frame.is_empty() {
            return Err(Error::Empty {
                entity: self.entity,
            });
        }

        if self.required.iter().any(|c| !frame.contains(c)) {
            return Err(Error::MissingColumns {
                entity: self.entity,
                required: self.required.join(", "),
                present: frame.column_names().join(", "),
            });
        }

        for name in self.timestamps {
            let column = frame.column_or_err(name)?;
            if !matches!(column.data_type(), Some(DataType::Timestamp(_, Some(_)))) {
                return Err(Error::NotTimezoneAware {
                    column: name.to_string(),
                    dtype: column.dtype().to_string(),
                });
            }
        }

        let Some(expected) = self.geometry else {
            return Ok(());
        };
        let geometries = frame.geometries().ok_or(Error::MissingGeometry {
            entity: self.entity,
        })?;

        if validate_geometry {
            let valid = geometries.iter().all(|g| g.as_ref().map_or(false, is_valid));
            if !valid {
                return Err(Error::InvalidGeometry {
                    entity: self.entity,
                });
            }

            // only the first one is checked
            if let Some(Some(first)) = geometries.first() {
                let found = geom_type(first);
                if found != expected.name() {
                    return Err(Error::GeometryType {
                        entity: self.entity,
                        expected: expected.name(),
                        found,
                    });
                }
            }
        }

        Ok(())
    }

    /// Whether the table meets the contract
    pub fn check(&self, frame: &Frame, validate_geometry: bool) -> bool {
        self.validate(frame, validate_geometry).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::TimestampMicrosecondArray;
    use geo::{line_string, Point};
    use time::macros::{datetime, offset};
    use time::PrimitiveDateTime;

    use super::*;
    use crate::frame::{Column, DType};

    const LEGS: Contract = Contract {
        entity: "legs",
        required: &["user_id", "started_at"],
        timestamps: &["started_at"],
        geometry: Some(GeometryType::LineString),
    };

    fn legs() -> Result<Frame> {
        Frame::new(vec![
            ("user_id", Column::from(vec![1])),
            (
                "started_at",
                Column::from(vec![datetime!(2021-05-24 0:00).assume_offset(offset!(+2))]),
            ),
            (
                "geom",
                Column::geometries(vec![line_string![(x: 0., y: 0.), (x: 1., y: 1.)]]),
            ),
        ])?
        .with_geometry("geom")
    }

    #[test]
    fn valid_table() -> Result<()> {
        let frame = legs()?;

        LEGS.validate(&frame, true)?;
        assert!(LEGS.check(&frame, true));

        Ok(())
    }

    #[test]
    fn empty_fails_first() -> Result<()> {
        let frame = legs()?.filter(&[false])?;

        assert!(matches!(
            LEGS.validate(&frame, false),
            Err(Error::Empty { entity: "legs" })
        ));
        assert!(!LEGS.check(&frame, false));

        Ok(())
    }

    #[test]
    fn missing_column_is_named() -> Result<()> {
        let frame = legs()?.drop(&["user_id"])?;

        let err = LEGS.validate(&frame, true).unwrap_err();
        assert_eq!(
            "To process a table as a collection of legs, it must have the columns [user_id, started_at], but it has [started_at, geom]",
            err.to_string()
        );

        Ok(())
    }

    #[test]
    fn naive_timestamps() -> Result<()> {
        let naive: Vec<PrimitiveDateTime> = vec![datetime!(2021-05-24 0:00)];
        let frame = legs()?.with_column("started_at", Column::from(naive))?;

        assert!(matches!(
            LEGS.validate(&frame, true),
            Err(Error::NotTimezoneAware { ref column, .. }) if column == "started_at"
        ));

        Ok(())
    }

    #[test]
    fn named_zones_are_timezone_aware() -> Result<()> {
        let stamps = TimestampMicrosecondArray::from(vec![0]).with_timezone("UTC");
        let frame = legs()?.with_column("started_at", Column::from_array(Arc::new(stamps))?)?;

        LEGS.validate(&frame, true)?;

        Ok(())
    }

    #[test]
    fn geometry_checks() -> Result<()> {
        let frame = legs()?.with_column("geom", Column::geometries(vec![Point::new(1., 1.)]))?;

        assert!(matches!(
            LEGS.validate(&frame, true),
            Err(Error::GeometryType {
                expected: "LineString",
                found: "Point",
                ..
            })
        ));
        // type and validity are only checked on demand
        assert!(LEGS.check(&frame, false));

        let frame = legs()?.drop(&["geom"])?;
        assert!(matches!(
            LEGS.validate(&frame, false),
            Err(Error::MissingGeometry { .. })
        ));

        let frame = legs()?.with_column("geom", Column::nulls(DType::Geometry, 1))?;
        assert!(matches!(
            LEGS.validate(&frame, true),
            Err(Error::InvalidGeometry { .. })
        ));

        Ok(())
    }
}
