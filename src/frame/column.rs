//! Column storage, cell values and join keys
//!
//! Attribute columns are arrow arrays; geometry columns are kept beside
//! them as plain `geo` values. Timezone aware timestamps are arrow
//! `Timestamp(Microsecond, Some(tz))` arrays whose `tz` is a fixed offset
//! such as `+01:00`.

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray, UInt64Array,
};
use arrow::compute::{self, TakeOptions};
use arrow::datatypes::{DataType, TimeUnit};
use geo::Geometry;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::{Error, Result};

const OFFSET: &[FormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// Data type of a column
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Int,
    Float,
    Bool,
    Str,
    /// Timestamp without offset
    Timestamp,
    /// Timezone aware timestamp
    TimestampTz,
    Geometry,
}

impl DType {
    /// Dtype of an arrow array type, `None` for types a frame can't hold
    pub fn of(data_type: &DataType) -> Option<DType> {
        match data_type {
            DataType::Int64 => Some(DType::Int),
            DataType::Float64 => Some(DType::Float),
            DataType::Boolean => Some(DType::Bool),
            DataType::Utf8 => Some(DType::Str),
            DataType::Timestamp(TimeUnit::Microsecond, None) => Some(DType::Timestamp),
            DataType::Timestamp(TimeUnit::Microsecond, Some(_)) => Some(DType::TimestampTz),
            _ => None,
        }
    }

    /// Arrow type of the dtype, geometries have none
    pub fn arrow(&self) -> Option<DataType> {
        match self {
            DType::Int => Some(DataType::Int64),
            DType::Float => Some(DataType::Float64),
            DType::Bool => Some(DataType::Boolean),
            DType::Str => Some(DataType::Utf8),
            DType::Timestamp => Some(DataType::Timestamp(TimeUnit::Microsecond, None)),
            DType::TimestampTz => Some(DataType::Timestamp(
                TimeUnit::Microsecond,
                Some(tz_name(UtcOffset::UTC).into()),
            )),
            DType::Geometry => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int => "int64",
            DType::Float => "float64",
            DType::Bool => "bool",
            DType::Str => "str",
            DType::Timestamp => "datetime64",
            DType::TimestampTz => "datetime64[tz]",
            DType::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
    Geometry(Geometry<f64>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Hashable version of the value, when there is one
    pub fn key(&self) -> Option<Key> {
        match self {
            Value::Int(v) => Some(Key::Int(*v)),
            Value::Bool(v) => Some(Key::Bool(*v)),
            Value::Str(v) => Some(Key::Str(v.clone())),
            Value::Timestamp(v) => Some(Key::Timestamp(*v)),
            Value::TimestampTz(v) => Some(Key::TimestampTz(*v)),
            Value::Null | Value::Float(_) | Value::Geometry(_) => None,
        }
    }
}

/// Grouping and join key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Bool(bool),
    Str(String),
    Timestamp(PrimitiveDateTime),
    TimestampTz(OffsetDateTime),
}

impl Key {
    /// Dtypes whose cells can be turned into keys
    pub fn supports(dtype: DType) -> bool {
        !matches!(dtype, DType::Float | DType::Geometry)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Int(v) => Value::Int(v),
            Key::Bool(v) => Value::Bool(v),
            Key::Str(v) => Value::Str(v),
            Key::Timestamp(v) => Value::Timestamp(v),
            Key::TimestampTz(v) => Value::TimestampTz(v),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{}", v),
            Key::Bool(v) => write!(f, "{}", v),
            Key::Str(v) => f.write_str(v),
            Key::Timestamp(v) => write!(f, "{}", v),
            Key::TimestampTz(v) => write!(f, "{}", v),
        }
    }
}

pub(crate) type GeometryCells = Arc<Vec<Option<Geometry<f64>>>>;

/// Nullable, homogeneously typed column
#[derive(Clone, Debug, PartialEq)]
pub struct Column(Data);

#[derive(Clone, Debug, PartialEq)]
enum Data {
    Array(ArrayRef),
    Geometry(GeometryCells),
}

impl Column {
    /// Wrap an arrow array
    ///
    /// Timestamps of other units and narrower numeric types are cast to
    /// the frame's types.
    pub fn from_array(array: ArrayRef) -> Result<Self> {
        if DType::of(array.data_type()).is_some() {
            return Ok(Column(Data::Array(array)));
        }

        let target = match array.data_type() {
            DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Microsecond, tz.clone()),
            DataType::Int8 | DataType::Int16 | DataType::Int32 => DataType::Int64,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => DataType::Int64,
            DataType::Float16 | DataType::Float32 => DataType::Float64,
            DataType::LargeUtf8 | DataType::Utf8View => DataType::Utf8,
            other => return Err(Error::UnsupportedType(other.to_string())),
        };

        Ok(Column(Data::Array(compute::cast(&array, &target)?)))
    }

    /// Array read back out of a frame's batch, already of a frame type
    pub(crate) fn from_batch_array(array: ArrayRef) -> Self {
        Column(Data::Array(array))
    }

    pub(crate) fn from_geometries(cells: GeometryCells) -> Self {
        Column(Data::Geometry(cells))
    }

    /// Column of `len` nulls
    pub fn nulls(dtype: DType, len: usize) -> Self {
        match dtype.arrow() {
            Some(data_type) => Column(Data::Array(new_null_array(&data_type, len))),
            None => Column(Data::Geometry(Arc::new(vec![None; len]))),
        }
    }

    pub fn geometries<G, I>(items: I) -> Self
    where
        G: Into<Geometry<f64>>,
        I: IntoIterator<Item = G>,
    {
        let cells: Vec<Option<Geometry<f64>>> = items.into_iter().map(|g| Some(g.into())).collect();
        Column::from(cells)
    }

    pub fn dtype(&self) -> DType {
        match &self.0 {
            Data::Array(array) => DType::of(array.data_type()).unwrap_or(DType::Str),
            Data::Geometry(_) => DType::Geometry,
        }
    }

    /// Arrow type of an attribute column
    pub fn data_type(&self) -> Option<&DataType> {
        self.array().map(|a| a.data_type())
    }

    /// Backing array of an attribute column
    pub fn array(&self) -> Option<&ArrayRef> {
        match &self.0 {
            Data::Array(array) => Some(array),
            Data::Geometry(_) => None,
        }
    }

    pub(crate) fn geometry_cells(&self) -> Option<&GeometryCells> {
        match &self.0 {
            Data::Geometry(cells) => Some(cells),
            Data::Array(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.0 {
            Data::Array(array) => array.len(),
            Data::Geometry(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `pos`, `Value::Null` when missing or out of bounds
    pub fn get(&self, pos: usize) -> Value {
        if pos >= self.len() {
            return Value::Null;
        }

        match &self.0 {
            Data::Geometry(cells) => cells[pos].clone().map_or(Value::Null, Value::Geometry),
            Data::Array(array) if array.is_null(pos) => Value::Null,
            Data::Array(array) => cell(array, pos).unwrap_or(Value::Null),
        }
    }

    pub fn key(&self, pos: usize) -> Option<Key> {
        self.get(pos).key()
    }

    /// New column with the cells at `positions`; `None` positions become nulls
    pub fn gather(&self, positions: &[Option<usize>]) -> Result<Column> {
        let indices = UInt64Array::from_iter(positions.iter().map(|p| p.map(|p| p as u64)));
        self.take_indices(&indices, positions.iter().copied())
    }

    pub fn take(&self, positions: &[usize]) -> Result<Column> {
        let indices = UInt64Array::from_iter_values(positions.iter().map(|p| *p as u64));
        self.take_indices(&indices, positions.iter().map(|p| Some(*p)))
    }

    fn take_indices(
        &self,
        indices: &UInt64Array,
        positions: impl Iterator<Item = Option<usize>>,
    ) -> Result<Column> {
        match &self.0 {
            Data::Array(array) => {
                let options = TakeOptions { check_bounds: true };
                let taken = compute::take(array.as_ref(), indices, Some(options))?;
                Ok(Column(Data::Array(taken)))
            }
            Data::Geometry(cells) => {
                let mut out = Vec::with_capacity(indices.len());
                for position in positions {
                    match position {
                        Some(p) if p >= cells.len() => {
                            return Err(Error::OutOfBounds {
                                position: p,
                                len: cells.len(),
                            })
                        }
                        Some(p) => out.push(cells[p].clone()),
                        None => out.push(None),
                    }
                }
                Ok(Column(Data::Geometry(Arc::new(out))))
            }
        }
    }

    /// Stack columns of the same dtype
    ///
    /// Timezone aware parts take the offset of the first part.
    pub fn concat(name: &str, parts: &[Column]) -> Result<Column> {
        let Some(first) = parts.first() else {
            return Err(Error::Empty { entity: "columns" });
        };

        if let Some(other) = parts.iter().find(|p| p.dtype() != first.dtype()) {
            return Err(Error::DTypeMismatch {
                column: name.to_string(),
                expected: first.dtype().to_string(),
                found: other.dtype().to_string(),
            });
        }

        match &first.0 {
            Data::Array(head) => {
                let target = head.data_type();
                let arrays = parts
                    .iter()
                    .filter_map(|p| p.array())
                    .map(|a| {
                        if a.data_type() == target {
                            Ok(a.clone())
                        } else {
                            compute::cast(a, target)
                        }
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let refs: Vec<&dyn Array> = arrays.iter().map(|a| a.as_ref()).collect();

                Ok(Column(Data::Array(compute::concat(&refs)?)))
            }
            Data::Geometry(_) => {
                let cells = parts
                    .iter()
                    .filter_map(|p| p.geometry_cells())
                    .flat_map(|c| c.iter().cloned())
                    .collect();

                Ok(Column(Data::Geometry(Arc::new(cells))))
            }
        }
    }

    pub fn as_int(&self) -> Option<&Int64Array> {
        self.array()?.as_any().downcast_ref()
    }

    pub fn as_float(&self) -> Option<&Float64Array> {
        self.array()?.as_any().downcast_ref()
    }

    pub fn as_bool(&self) -> Option<&BooleanArray> {
        self.array()?.as_any().downcast_ref()
    }

    pub fn as_str(&self) -> Option<&StringArray> {
        self.array()?.as_any().downcast_ref()
    }

    /// Timezone aware cells, in the offset of the column
    pub fn as_timestamp_tz(&self) -> Option<Vec<Option<OffsetDateTime>>> {
        let array = self.array()?;
        let DataType::Timestamp(TimeUnit::Microsecond, Some(tz)) = array.data_type() else {
            return None;
        };
        let offset = tz_offset(tz);
        let array: &TimestampMicrosecondArray = array.as_any().downcast_ref()?;

        Some(
            array
                .iter()
                .map(|v| v.and_then(|v| aware(v, offset)))
                .collect(),
        )
    }

    pub fn as_geometry(&self) -> Option<&[Option<Geometry<f64>>]> {
        self.geometry_cells().map(|c| c.as_slice())
    }
}

fn cell(array: &ArrayRef, pos: usize) -> Option<Value> {
    let any = array.as_any();

    let value = match array.data_type() {
        DataType::Int64 => Value::Int(any.downcast_ref::<Int64Array>()?.value(pos)),
        DataType::Float64 => Value::Float(any.downcast_ref::<Float64Array>()?.value(pos)),
        DataType::Boolean => Value::Bool(any.downcast_ref::<BooleanArray>()?.value(pos)),
        DataType::Utf8 => Value::Str(any.downcast_ref::<StringArray>()?.value(pos).to_string()),
        DataType::Timestamp(TimeUnit::Microsecond, tz) => {
            let micros = any.downcast_ref::<TimestampMicrosecondArray>()?.value(pos);
            match tz {
                Some(tz) => Value::TimestampTz(aware(micros, tz_offset(tz))?),
                None => Value::Timestamp(naive(micros)?),
            }
        }
        _ => return None,
    };

    Some(value)
}

fn micros(dt: OffsetDateTime) -> i64 {
    (dt.unix_timestamp_nanos() / 1_000) as i64
}

fn aware(micros: i64, offset: UtcOffset) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(micros as i128 * 1_000)
        .ok()
        .map(|dt| dt.to_offset(offset))
}

fn naive(micros: i64) -> Option<PrimitiveDateTime> {
    aware(micros, UtcOffset::UTC).map(|dt| PrimitiveDateTime::new(dt.date(), dt.time()))
}

/// Arrow timezone name of a fixed offset
fn tz_name(offset: UtcOffset) -> String {
    offset
        .format(OFFSET)
        .unwrap_or_else(|_| "+00:00".to_string())
}

/// Fixed offset of an arrow timezone name, UTC for named zones
fn tz_offset(tz: &str) -> UtcOffset {
    UtcOffset::parse(tz, OFFSET).unwrap_or(UtcOffset::UTC)
}

fn wrap(array: impl Array + 'static) -> Column {
    Column(Data::Array(Arc::new(array)))
}

impl From<Vec<Option<i64>>> for Column {
    fn from(cells: Vec<Option<i64>>) -> Self {
        wrap(Int64Array::from(cells))
    }
}

impl From<Vec<Option<f64>>> for Column {
    fn from(cells: Vec<Option<f64>>) -> Self {
        wrap(Float64Array::from(cells))
    }
}

impl From<Vec<Option<bool>>> for Column {
    fn from(cells: Vec<Option<bool>>) -> Self {
        wrap(BooleanArray::from(cells))
    }
}

impl From<Vec<Option<String>>> for Column {
    fn from(cells: Vec<Option<String>>) -> Self {
        wrap(StringArray::from_iter(cells))
    }
}

impl From<Vec<Option<&str>>> for Column {
    fn from(cells: Vec<Option<&str>>) -> Self {
        wrap(StringArray::from(cells))
    }
}

impl From<Vec<Option<PrimitiveDateTime>>> for Column {
    fn from(cells: Vec<Option<PrimitiveDateTime>>) -> Self {
        wrap(TimestampMicrosecondArray::from_iter(
            cells.into_iter().map(|c| c.map(|c| micros(c.assume_utc()))),
        ))
    }
}

/// The column takes the offset of its first timestamp
impl From<Vec<Option<OffsetDateTime>>> for Column {
    fn from(cells: Vec<Option<OffsetDateTime>>) -> Self {
        let offset = cells
            .iter()
            .flatten()
            .next()
            .map_or(UtcOffset::UTC, |c| c.offset());
        let array = TimestampMicrosecondArray::from_iter(cells.into_iter().map(|c| c.map(micros)));

        wrap(array.with_timezone(tz_name(offset)))
    }
}

impl From<Vec<Option<Geometry<f64>>>> for Column {
    fn from(cells: Vec<Option<Geometry<f64>>>) -> Self {
        Column(Data::Geometry(Arc::new(cells)))
    }
}

macro_rules! from_valid {
    ($($t:ty),*) => {
        $(
            impl From<Vec<$t>> for Column {
                fn from(values: Vec<$t>) -> Self {
                    Column::from(values.into_iter().map(Some).collect::<Vec<_>>())
                }
            }
        )*
    };
}

from_valid!(i64, f64, bool, String, &str, PrimitiveDateTime, OffsetDateTime);
