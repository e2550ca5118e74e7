//! Reading and writing trajectory tables

#[cfg(feature = "csv")]
mod csv_file;
mod gpx;

#[cfg(feature = "csv")]
pub use csv_file::{
    read_csv, read_positionfixes_csv, read_staypoints_csv, read_triplegs_csv, write_csv,
    CsvLayout, GeometryEncoding,
};
pub use self::gpx::{positionfixes_to_gpx, triplegs_to_gpx};
