//! CSV files

use std::io::{Read, Write};

use csv::{Reader, StringRecord, Writer};
use geo::{Geometry, Point};
use time::format_description::{well_known, FormatItem};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use wkt::{ToWkt, TryFromWkt};

use crate::frame::{Column, DType, Frame, Value};
use crate::model::{Positionfixes, Staypoints, Triplegs};
use crate::{Error, Result};

/// Where the geometry of a CSV row comes from
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryEncoding {
    None,
    /// Longitude and latitude columns, merged into a point
    LonLat { lon: String, lat: String },
    /// A WKT column
    Wkt(String),
}

/// How the columns of a CSV file are read
#[derive(Clone, Debug, PartialEq)]
pub struct CsvLayout {
    /// Columns parsed as timestamps
    pub timestamps: Vec<String>,
    pub geometry: GeometryEncoding,
    /// Name of the active geometry column
    pub geometry_name: String,
    /// Column holding the row labels
    pub index: Option<String>,
}

impl CsvLayout {
    /// `tracked_at` and a point out of `longitude` and `latitude`
    pub fn positionfixes() -> Self {
        Self {
            timestamps: vec!["tracked_at".to_string()],
            geometry: GeometryEncoding::LonLat {
                lon: "longitude".to_string(),
                lat: "latitude".to_string(),
            },
            geometry_name: "geom".to_string(),
            index: None,
        }
    }

    /// `started_at`, `finished_at` and a WKT `geom`, labelled by `id`
    pub fn staypoints() -> Self {
        Self {
            timestamps: vec!["started_at".to_string(), "finished_at".to_string()],
            geometry: GeometryEncoding::Wkt("geom".to_string()),
            geometry_name: "geom".to_string(),
            index: Some("id".to_string()),
        }
    }

    /// Same columns as staypoints, with line strings in `geom`
    pub fn triplegs() -> Self {
        Self::staypoints()
    }
}

/// Read a whole CSV file into a table
///
/// Timestamps with an offset are timezone aware, the others are naive. The
/// remaining columns are integers, floats, booleans or text, whichever fits
/// all of their cells. Empty cells are nulls.
pub fn read_csv<R: Read>(mut rdr: Reader<R>, layout: &CsvLayout) -> Result<Frame> {
    let mut header = rdr.headers()?.clone();
    header.trim();
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();

    let mut rows: Vec<StringRecord> = vec![];
    for row in rdr.records() {
        let mut rec = row?;
        rec.trim();
        if rec.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(rec);
    }

    let cells = |idx: usize| rows.iter().map(move |r| r.get(idx).filter(|c| !c.is_empty()));
    let position = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    };

    let mut columns: Vec<(String, Column)> = vec![];
    let mut consumed: Vec<usize> = vec![];

    match &layout.geometry {
        GeometryEncoding::None => {}
        GeometryEncoding::LonLat { lon, lat } => {
            let (ilon, ilat) = (position(lon)?, position(lat)?);
            let lons = parse_floats(cells(ilon))?;
            let lats = parse_floats(cells(ilat))?;

            let points: Vec<Option<Geometry<f64>>> = lons
                .into_iter()
                .zip(lats)
                .map(|c| match c {
                    (Some(x), Some(y)) => Some(Geometry::Point(Point::new(x, y))),
                    _ => None,
                })
                .collect();
            columns.push((layout.geometry_name.clone(), Column::from(points)));
            consumed.extend([ilon, ilat]);
        }
        GeometryEncoding::Wkt(name) => {
            let idx = position(name)?;
            let geometries = cells(idx)
                .enumerate()
                .map(|(row, cell)| {
                    cell.map(|c| {
                        Geometry::<f64>::try_from_wkt_str(c).map_err(|e| Error::Parse {
                            row,
                            message: format!("Invalid WKT: {}", e),
                        })
                    })
                    .transpose()
                })
                .collect::<Result<Vec<_>>>()?;
            columns.push((layout.geometry_name.clone(), Column::from(geometries)));
            consumed.push(idx);
        }
    }

    let mut index = None;
    if let Some(name) = &layout.index {
        let idx = position(name)?;
        let labels = parse_ints(cells(idx))?
            .into_iter()
            .enumerate()
            .map(|(row, label)| {
                label.ok_or_else(|| Error::Parse {
                    row,
                    message: format!("Missing {}", name),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        index = Some(labels);
        consumed.push(idx);
    }

    for (idx, name) in header.iter().enumerate() {
        if consumed.contains(&idx) {
            continue;
        }

        let column = if layout.timestamps.contains(name) {
            parse_timestamps(cells(idx))?
        } else {
            infer(cells(idx))
        };
        columns.push((name.clone(), column));
    }

    // header order, the geometry where its source columns were
    let order = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .or(match &layout.geometry {
                GeometryEncoding::LonLat { lon, .. } if name == layout.geometry_name => {
                    header.iter().position(|h| h == lon)
                }
                _ => None,
            })
            .unwrap_or(usize::MAX)
    };
    columns.sort_by_key(|(name, _)| order(name));

    let mut frame = Frame::new(columns)?;
    if let Some(index) = index {
        frame = frame.with_index(index)?;
    }
    if layout.geometry != GeometryEncoding::None {
        frame = frame.with_geometry(&layout.geometry_name)?;
    }

    Ok(frame)
}

/// Positionfixes with the geometry from `longitude` and `latitude`
pub fn read_positionfixes_csv<R: Read>(rdr: Reader<R>, layout: &CsvLayout) -> Result<Positionfixes> {
    Positionfixes::new(read_csv(rdr, layout)?)
}

pub fn read_staypoints_csv<R: Read>(rdr: Reader<R>, layout: &CsvLayout) -> Result<Staypoints> {
    Staypoints::new(read_csv(rdr, layout)?)
}

pub fn read_triplegs_csv<R: Read>(rdr: Reader<R>, layout: &CsvLayout) -> Result<Triplegs> {
    Triplegs::new(read_csv(rdr, layout)?)
}

/// Write a table with its index as `id`, RFC3339 timestamps and WKT
/// geometries
pub fn write_csv<W: Write>(frame: &Frame, wtr: &mut Writer<W>) -> Result<()> {
    let mut header = vec!["id"];
    header.extend(frame.column_names());
    wtr.write_record(&header)?;

    for pos in 0..frame.len() {
        let mut rec = vec![frame.index()[pos].to_string()];
        for (_, column) in frame.columns() {
            rec.push(format_cell(column.get(pos))?);
        }
        wtr.write_record(&rec)?;
    }

    wtr.flush()?;

    Ok(())
}

fn format_cell(value: Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Int(v) => v.to_string(),
        // keeps the decimal point of integral values, `2.0` reads back as a float
        Value::Float(v) => format!("{:?}", v),
        Value::Bool(v) => v.to_string(),
        Value::Str(v) => v,
        Value::Timestamp(v) => v.format(NAIVE)?,
        Value::TimestampTz(v) => v.format(&well_known::Rfc3339)?,
        Value::Geometry(g) => g.wkt_string(),
    })
}

fn parse_floats<'a>(cells: impl Iterator<Item = Option<&'a str>>) -> Result<Vec<Option<f64>>> {
    cells
        .enumerate()
        .map(|(row, cell)| {
            cell.map(|c| {
                c.parse::<f64>().map_err(|e| Error::Parse {
                    row,
                    message: format!("Invalid number `{}`: {}", c, e),
                })
            })
            .transpose()
        })
        .collect()
}

fn parse_ints<'a>(cells: impl Iterator<Item = Option<&'a str>>) -> Result<Vec<Option<i64>>> {
    cells
        .enumerate()
        .map(|(row, cell)| {
            cell.map(|c| {
                c.parse::<i64>().map_err(|e| Error::Parse {
                    row,
                    message: format!("Invalid integer `{}`: {}", c, e),
                })
            })
            .transpose()
        })
        .collect()
}

const NAIVE: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const NAIVE_T: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
/// pandas style, a space instead of the `T`
const SPACED: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
);

enum Parsed {
    Aware(OffsetDateTime),
    Naive(PrimitiveDateTime),
}

fn parse_time(cell: &str) -> Option<Parsed> {
    OffsetDateTime::parse(cell, &well_known::Rfc3339)
        .or_else(|_| OffsetDateTime::parse(cell, SPACED))
        .map(Parsed::Aware)
        .or_else(|_| PrimitiveDateTime::parse(cell, NAIVE).map(Parsed::Naive))
        .or_else(|_| PrimitiveDateTime::parse(cell, NAIVE_T).map(Parsed::Naive))
        .ok()
}

/// Timezone aware column when every timestamp has an offset, naive when none has
fn parse_timestamps<'a>(cells: impl Iterator<Item = Option<&'a str>>) -> Result<Column> {
    let parsed = cells
        .enumerate()
        .map(|(row, cell)| {
            cell.map(|c| {
                parse_time(c).ok_or_else(|| Error::Parse {
                    row,
                    message: format!("Failed on parse the time `{}`", c),
                })
            })
            .transpose()
        })
        .collect::<Result<Vec<_>>>()?;

    let is_naive = |p: &Option<Parsed>| matches!(p, Some(Parsed::Naive(_)));
    let is_aware = |p: &Option<Parsed>| matches!(p, Some(Parsed::Aware(_)));

    match (parsed.iter().position(is_aware), parsed.iter().position(is_naive)) {
        (Some(_), Some(row)) => Err(Error::Parse {
            row,
            message: "Timestamps with and without offset are mixed".to_string(),
        }),
        (_, Some(_)) => Ok(Column::from(
            parsed
                .into_iter()
                .map(|p| match p {
                    Some(Parsed::Naive(t)) => Some(t),
                    _ => None,
                })
                .collect::<Vec<Option<PrimitiveDateTime>>>(),
        )),
        (_, None) => Ok(Column::from(
            parsed
                .into_iter()
                .map(|p| match p {
                    Some(Parsed::Aware(t)) => Some(t),
                    _ => None,
                })
                .collect::<Vec<Option<OffsetDateTime>>>(),
        )),
    }
}

/// Narrowest dtype every non empty cell parses as
fn infer<'a>(cells: impl Iterator<Item = Option<&'a str>> + Clone) -> Column {
    let fits = |dtype: DType| {
        cells.clone().flatten().all(|c| match dtype {
            DType::Int => c.parse::<i64>().is_ok(),
            DType::Float => c.parse::<f64>().is_ok(),
            DType::Bool => c.parse::<bool>().is_ok(),
            _ => true,
        })
    };

    if fits(DType::Int) {
        Column::from(cells.map(|c| c.and_then(|c| c.parse().ok())).collect::<Vec<Option<i64>>>())
    } else if fits(DType::Float) {
        Column::from(cells.map(|c| c.and_then(|c| c.parse().ok())).collect::<Vec<Option<f64>>>())
    } else if fits(DType::Bool) {
        Column::from(cells.map(|c| c.and_then(|c| c.parse().ok())).collect::<Vec<Option<bool>>>())
    } else {
        Column::from(cells.collect::<Vec<Option<&str>>>())
    }
}

#[cfg(test)]
mod tests {
    use csv::{ReaderBuilder, WriterBuilder};
    use geo::line_string;
    use time::macros::datetime;

    use super::*;

    fn reader(data: &str) -> Reader<&[u8]> {
        ReaderBuilder::new()
            .flexible(true)
            .from_reader(data.as_bytes())
    }

    #[test]
    fn positionfixes() -> Result<()> {
        let data = "\
            user_id,tracked_at,latitude,longitude,elevation,accuracy
            0,2008-10-23T02:53:04+00:00,39.984094,116.318417,492,
            0,2008-10-23 02:53:10+00:00,39.984198,116.319322,492,4.5
            1,2008-10-23T02:53:15+02:00,39.984224,116.319402,491,3
        ";

        let pfs = read_positionfixes_csv(reader(data), &CsvLayout::positionfixes())?;

        assert_eq!(3, pfs.len());
        assert_eq!(
            vec!["user_id", "tracked_at", "geom", "elevation", "accuracy"],
            pfs.frame().column_names()
        );
        assert_eq!(Some(DType::Int), pfs.column("user_id").map(|c| c.dtype()));
        assert_eq!(Some(DType::Float), pfs.column("accuracy").map(|c| c.dtype()));
        assert_eq!(
            Value::TimestampTz(datetime!(2008-10-23 2:53:10 UTC)),
            pfs.frame().column_or_err("tracked_at")?.get(1)
        );
        assert_eq!(
            Value::Geometry(Geometry::Point(Point::new(116.318417, 39.984094))),
            pfs.frame().column_or_err("geom")?.get(0)
        );

        Ok(())
    }

    #[test]
    fn naive_timestamps_are_not_positionfixes() -> Result<()> {
        let data = "\
            user_id,tracked_at,latitude,longitude
            0,2008-10-23 02:53:04,39.984094,116.318417
        ";

        let frame = read_csv(reader(data), &CsvLayout::positionfixes())?;
        assert_eq!(Some(DType::Timestamp), frame.column("tracked_at").map(|c| c.dtype()));
        assert!(matches!(
            Positionfixes::new(frame),
            Err(Error::NotTimezoneAware { .. })
        ));

        Ok(())
    }

    #[test]
    fn triplegs_from_wkt() -> Result<()> {
        let data = "\
            id,user_id,started_at,finished_at,geom,mode
            12,1,2015-11-27T08:00:00Z,2015-11-27T08:15:00Z,\"LINESTRING (8.54 47.37, 8.55 47.38)\",walk
            13,1,2015-11-27T09:00:00Z,2015-11-27T09:40:00Z,\"LINESTRING (8.55 47.38, 8.60 47.40)\",
        ";

        let tpls = read_triplegs_csv(reader(data), &CsvLayout::triplegs())?;

        assert_eq!(&[12, 13], tpls.frame().index());
        assert_eq!(Some("geom"), tpls.frame().geometry_name());
        assert_eq!(
            Column::from(vec![Some("walk"), None]),
            tpls.frame().column_or_err("mode")?
        );

        Ok(())
    }

    #[test]
    fn broken_rows() {
        let data = "\
            user_id,tracked_at,latitude,longitude
            0,yesterday,39.984094,116.318417
        ";
        assert!(matches!(
            read_csv(reader(data), &CsvLayout::positionfixes()),
            Err(Error::Parse { row: 0, .. })
        ));

        let data = "\
            user_id,tracked_at,lat,lon
            0,2008-10-23T02:53:04Z,39.984094,116.318417
        ";
        assert!(matches!(
            read_csv(reader(data), &CsvLayout::positionfixes()),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn write_then_read() -> Result<()> {
        let frame = Frame::new(vec![
            ("user_id", Column::from(vec![1, 2])),
            (
                "started_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:00 +01:00),
                    datetime!(2021-05-24 9:00 +01:00),
                ]),
            ),
            (
                "finished_at",
                Column::from(vec![
                    datetime!(2021-05-24 8:30 UTC),
                    datetime!(2021-05-24 9:30 UTC),
                ]),
            ),
            (
                "geom",
                Column::geometries(vec![
                    line_string![(x: 8.5, y: 47.3), (x: 8.6, y: 47.3)],
                    line_string![(x: 8.6, y: 47.3), (x: 8.7, y: 47.4)],
                ]),
            ),
            ("speed", Column::from(vec![Some(1.5), None])),
        ])?
        .with_geometry("geom")?
        .with_index(vec![7, 9])?;

        let mut wtr = WriterBuilder::new().from_writer(vec![]);
        write_csv(&frame, &mut wtr)?;
        let data = String::from_utf8(wtr.into_inner().map_err(|e| Error::Config(e.to_string()))?)
            .map_err(|e| Error::Config(e.to_string()))?;

        assert!(data.starts_with("id,user_id,started_at,finished_at,geom,speed\n"));
        assert!(data.contains("2021-05-24T09:00:00+01:00"));
        assert!(data.contains("2021-05-24T09:30:00Z"));

        let read = read_triplegs_csv(reader(&data), &CsvLayout::triplegs())?;
        assert_eq!(&frame, read.frame());

        Ok(())
    }

    #[test]
    fn integral_floats_stay_floats() -> Result<()> {
        let frame = Frame::new(vec![
            ("user_id", Column::from(vec![1, 2])),
            ("distance", Column::from(vec![2.0, 3.0])),
        ])?;

        let mut wtr = WriterBuilder::new().from_writer(vec![]);
        write_csv(&frame, &mut wtr)?;
        let data = String::from_utf8(wtr.into_inner().map_err(|e| Error::Config(e.to_string()))?)
            .map_err(|e| Error::Config(e.to_string()))?;
        assert_eq!("id,user_id,distance\n0,1,2.0\n1,2,3.0\n", data);

        let layout = CsvLayout {
            timestamps: vec![],
            geometry: GeometryEncoding::None,
            geometry_name: "geom".to_string(),
            index: Some("id".to_string()),
        };
        let read = read_csv(reader(&data), &layout)?;
        assert_eq!(Some(DType::Float), read.column("distance").map(|c| c.dtype()));
        assert_eq!(Some(DType::Int), read.column("user_id").map(|c| c.dtype()));
        assert_eq!(frame, read);

        Ok(())
    }
}
