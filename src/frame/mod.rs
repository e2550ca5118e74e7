//! Generic tabular container
//!
//! A [`Frame`] is an arrow [`RecordBatch`] of attribute columns, the
//! geometry columns kept beside it, a stable row index and, optionally, an
//! active geometry column. Row selection, sorting and stacking run through
//! the arrow compute kernels. Every operation that derives a new table
//! returns a plain `Frame`; typed views re-tag those results themselves
//! (see [`crate::model`]).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, UInt64Array};
use arrow::compute::{self, filter_record_batch, SortColumn, SortOptions};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use geo::Geometry;

mod column;

use column::GeometryCells;
pub use column::{Column, DType, Key, Value};

use crate::{Error, Result};

/// Tabular container with a stable row index
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    index: Vec<i64>,
    batch: RecordBatch,
    geometries: Vec<(String, GeometryCells)>,
    /// Column names in table order, attributes and geometries mixed
    order: Vec<String>,
    geometry: Option<String>,
}

/// A single row, lower-dimensional than a table
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub index: i64,
    pub values: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl Frame {
    /// Table without rows and columns
    pub fn empty() -> Self {
        Self {
            index: vec![],
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
            geometries: vec![],
            order: vec![],
            geometry: None,
        }
    }

    /// Build a table from named columns, with a `0..n` index
    pub fn new<S: Into<String>>(columns: Vec<(S, Column)>) -> Result<Self> {
        let columns: Vec<(String, Column)> =
            columns.into_iter().map(|(n, c)| (n.into(), c)).collect();
        let len = columns.first().map_or(0, |(_, c)| c.len());

        assemble((0..len as i64).collect(), columns, None)
    }

    /// Table over an arrow batch, with a `0..n` index
    pub fn from_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| Ok((field.name().clone(), Column::from_array(array.clone())?)))
            .collect::<Result<Vec<_>>>()?;

        assemble((0..batch.num_rows() as i64).collect(), columns, None)
    }

    /// Replace the row index
    pub fn with_index(mut self, index: Vec<i64>) -> Result<Self> {
        if index.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: index.len(),
            });
        }
        self.index = index;

        Ok(self)
    }

    /// Mark a geometry column as the active geometry
    pub fn with_geometry(mut self, name: &str) -> Result<Self> {
        let dtype = self.column_or_err(name)?.dtype();
        if dtype != DType::Geometry {
            return Err(Error::DTypeMismatch {
                column: name.to_string(),
                expected: DType::Geometry.to_string(),
                found: dtype.to_string(),
            });
        }
        self.geometry = Some(name.to_string());

        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.order.len()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Attribute columns, without the geometries
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.order.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        if let Some((_, cells)) = self.geometries.iter().find(|(n, _)| n == name) {
            return Some(Column::from_geometries(cells.clone()));
        }

        self.batch
            .column_by_name(name)
            .cloned()
            .map(Column::from_batch_array)
    }

    pub fn column_or_err(&self, name: &str) -> Result<Column> {
        self.column(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, Column)> + '_ {
        self.order
            .iter()
            .filter_map(move |n| self.column(n).map(|c| (n.as_str(), c)))
    }

    pub fn geometry_name(&self) -> Option<&str> {
        self.geometry.as_deref()
    }

    /// Cells of the active geometry column
    pub fn geometries(&self) -> Option<&[Option<Geometry<f64>>]> {
        let name = self.geometry.as_deref()?;
        self.geometries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cells)| cells.as_slice())
    }

    /// Row at the position `pos`
    pub fn row(&self, pos: usize) -> Option<Row> {
        let index = *self.index.get(pos)?;
        let values = self
            .columns()
            .map(|(n, c)| (n.to_string(), c.get(pos)))
            .collect();

        Some(Row { index, values })
    }

    /// Insert or replace a column in place
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<()> {
        if self.width() > 0 && column.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: column.len(),
            });
        }
        let index = if self.width() == 0 {
            (0..column.len() as i64).collect()
        } else {
            self.index.clone()
        };

        let mut geometry = self.geometry.clone();
        if geometry.as_deref() == Some(name) && column.dtype() != DType::Geometry {
            geometry = None;
        }

        let mut columns = self.named_columns();
        match columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, c)) => *c = column,
            None => columns.push((name.to_string(), column)),
        }

        *self = assemble(index, columns, geometry)?;

        Ok(())
    }

    pub fn copy(&self) -> Frame {
        self.clone()
    }

    /// New table with `column` added or replaced
    pub fn with_column(&self, name: &str, column: Column) -> Result<Frame> {
        let mut frame = self.clone();
        frame.set_column(name, column)?;

        Ok(frame)
    }

    /// Rows at the given positions, in that order
    pub fn take(&self, positions: &[usize]) -> Result<Frame> {
        if let Some(&position) = positions.iter().find(|p| **p >= self.len()) {
            return Err(Error::OutOfBounds {
                position,
                len: self.len(),
            });
        }

        let indices = UInt64Array::from_iter_values(positions.iter().map(|p| *p as u64));

        Ok(Frame {
            index: positions.iter().map(|p| self.index[*p]).collect(),
            batch: take_batch(&self.batch, &indices)?,
            geometries: self
                .geometries
                .iter()
                .map(|(n, cells)| {
                    let taken = positions.iter().map(|p| cells[*p].clone()).collect();
                    (n.clone(), Arc::new(taken))
                })
                .collect(),
            order: self.order.clone(),
            geometry: self.geometry.clone(),
        })
    }

    /// Rows where `mask` is true
    pub fn filter(&self, mask: &[bool]) -> Result<Frame> {
        if mask.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: mask.len(),
            });
        }

        let predicate = BooleanArray::from(mask.to_vec());
        let keep = |pos: &usize| mask[*pos];

        Ok(Frame {
            index: (0..self.len())
                .filter(keep)
                .map(|p| self.index[p])
                .collect(),
            batch: filter_record_batch(&self.batch, &predicate)?,
            geometries: self
                .geometries
                .iter()
                .map(|(n, cells)| {
                    let kept = (0..cells.len())
                        .filter(keep)
                        .map(|p| cells[p].clone())
                        .collect();
                    (n.clone(), Arc::new(kept))
                })
                .collect(),
            order: self.order.clone(),
            geometry: self.geometry.clone(),
        })
    }

    pub fn head(&self, n: usize) -> Frame {
        let n = n.min(self.len());

        Frame {
            index: self.index[..n].to_vec(),
            batch: self.batch.slice(0, n),
            geometries: self
                .geometries
                .iter()
                .map(|(name, cells)| (name.clone(), Arc::new(cells[..n].to_vec())))
                .collect(),
            order: self.order.clone(),
            geometry: self.geometry.clone(),
        }
    }

    /// Only the named columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Frame> {
        let mut seen = HashSet::new();
        for name in names {
            if !self.contains(name) {
                return Err(Error::ColumnNotFound(name.to_string()));
            }
            if !seen.insert(*name) {
                return Err(Error::DuplicateColumn(name.to_string()));
            }
        }

        let schema = self.batch.schema();
        let projection = names
            .iter()
            .filter_map(|n| schema.index_of(n).ok())
            .collect::<Vec<_>>();

        let geometries = names
            .iter()
            .filter_map(|n| self.geometries.iter().find(|(g, _)| g == n))
            .cloned()
            .collect();

        let geometry = self
            .geometry
            .clone()
            .filter(|g| names.contains(&g.as_str()));

        Ok(Frame {
            index: self.index.clone(),
            batch: self.batch.project(&projection)?,
            geometries,
            order: names.iter().map(|n| n.to_string()).collect(),
            geometry,
        })
    }

    /// Everything but the named columns
    ///
    /// Dropping the active geometry column leaves a table without geometry.
    pub fn drop(&self, names: &[&str]) -> Result<Frame> {
        if let Some(missing) = names.iter().find(|n| !self.contains(n)) {
            return Err(Error::ColumnNotFound(missing.to_string()));
        }

        let kept: Vec<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|n| !names.contains(n))
            .collect();

        self.select(&kept)
    }

    /// Stable sort by one column, nulls last
    ///
    /// Geometry columns have no order, sorting by one keeps the rows as
    /// they are.
    pub fn sort_by(&self, name: &str) -> Result<Frame> {
        let column = self.column_or_err(name)?;
        let Some(values) = column.array() else {
            return Ok(self.clone());
        };

        // row positions break ties
        let positions = UInt64Array::from_iter_values(0..self.len() as u64);
        let sorted = compute::lexsort_to_indices(
            &[
                SortColumn {
                    values: values.clone(),
                    options: Some(SortOptions {
                        descending: false,
                        nulls_first: false,
                    }),
                },
                SortColumn {
                    values: Arc::new(positions),
                    options: None,
                },
            ],
            None,
        )?;

        let positions: Vec<usize> = sorted.values().iter().map(|p| *p as usize).collect();

        self.take(&positions)
    }

    /// Positions of the rows grouped by the keys of `names`, groups in key order
    pub fn group_positions(&self, names: &[&str]) -> Result<Vec<(Vec<Key>, Vec<usize>)>> {
        let columns = self.key_columns(names)?;

        let mut groups: BTreeMap<Vec<Key>, Vec<usize>> = BTreeMap::new();
        for pos in 0..self.len() {
            if let Some(key) = row_key(&columns, pos) {
                groups.entry(key).or_default().push(pos);
            }
        }

        Ok(groups.into_iter().collect())
    }

    /// Inner join on the `on` columns
    ///
    /// Overlapping non-key columns get the suffixes; the result has a fresh
    /// `0..n` index and keeps the left active geometry.
    pub fn merge(&self, other: &Frame, on: &[&str], suffixes: (&str, &str)) -> Result<Frame> {
        let left_keys = self.key_columns(on)?;
        let right_keys = other.key_columns(on)?;

        let mut lookup: HashMap<Vec<Key>, Vec<usize>> = HashMap::new();
        for pos in 0..other.len() {
            if let Some(key) = row_key(&right_keys, pos) {
                lookup.entry(key).or_default().push(pos);
            }
        }

        let mut left_pos = vec![];
        let mut right_pos = vec![];
        for pos in 0..self.len() {
            let matches = row_key(&left_keys, pos).and_then(|k| lookup.get(&k));
            for r in matches.into_iter().flatten() {
                left_pos.push(Some(pos));
                right_pos.push(Some(*r));
            }
        }

        let left_names: HashSet<&str> = self.column_names().into_iter().collect();
        let right_names: HashSet<&str> = other.column_names().into_iter().collect();

        let mut columns: Vec<(String, Column)> = vec![];
        let mut geometry = None;
        for (name, column) in self.columns() {
            let out = if !on.contains(&name) && right_names.contains(name) {
                format!("{}{}", name, suffixes.0)
            } else {
                name.to_string()
            };
            if self.geometry.as_deref() == Some(name) {
                geometry = Some(out.clone());
            }
            columns.push((out, column.gather(&left_pos)?));
        }
        for (name, column) in other.columns() {
            if on.contains(&name) {
                continue;
            }
            let out = if left_names.contains(name) {
                format!("{}{}", name, suffixes.1)
            } else {
                name.to_string()
            };
            if columns.iter().any(|(n, _)| *n == out) {
                return Err(Error::DuplicateColumn(out));
            }
            columns.push((out, column.gather(&right_pos)?));
        }

        assemble((0..left_pos.len() as i64).collect(), columns, geometry)
    }

    /// Stack tables vertically
    ///
    /// Columns missing from a table are filled with nulls; the first table's
    /// active geometry stays active.
    pub fn concat(frames: &[&Frame]) -> Result<Frame> {
        let Some(first) = frames.first() else {
            return Ok(Frame::empty());
        };

        let mut dtypes: Vec<(&str, DType)> = vec![];
        for frame in frames {
            for (name, column) in frame.columns() {
                if !dtypes.iter().any(|(n, _)| *n == name) {
                    dtypes.push((name, column.dtype()));
                }
            }
        }

        let mut columns = Vec::with_capacity(dtypes.len());
        for (name, dtype) in dtypes {
            let parts: Vec<Column> = frames
                .iter()
                .map(|f| f.column(name).unwrap_or_else(|| Column::nulls(dtype, f.len())))
                .collect();
            columns.push((name.to_string(), Column::concat(name, &parts)?));
        }

        let index = frames.iter().flat_map(|f| f.index.iter().copied()).collect();

        assemble(index, columns, first.geometry.clone())
    }

    fn named_columns(&self) -> Vec<(String, Column)> {
        self.columns().map(|(n, c)| (n.to_string(), c)).collect()
    }

    fn key_columns(&self, names: &[&str]) -> Result<Vec<Column>> {
        names
            .iter()
            .map(|name| {
                let column = self.column_or_err(name)?;
                if !Key::supports(column.dtype()) {
                    return Err(Error::InvalidKey(name.to_string()));
                }
                Ok(column)
            })
            .collect()
    }
}

/// Split named columns into the attribute batch and the geometry sidecar
fn assemble(
    index: Vec<i64>,
    columns: Vec<(String, Column)>,
    geometry: Option<String>,
) -> Result<Frame> {
    let len = index.len();

    let mut fields = vec![];
    let mut arrays = vec![];
    let mut geometries = vec![];
    let mut order: Vec<String> = Vec::with_capacity(columns.len());

    for (name, column) in columns {
        if column.len() != len {
            return Err(Error::LengthMismatch {
                expected: len,
                found: column.len(),
            });
        }
        if order.contains(&name) {
            return Err(Error::DuplicateColumn(name));
        }

        if let Some(array) = column.array() {
            fields.push(Field::new(name.as_str(), array.data_type().clone(), true));
            arrays.push(array.clone());
        } else if let Some(cells) = column.geometry_cells() {
            geometries.push((name.clone(), cells.clone()));
        }
        order.push(name);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(len));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;

    Ok(Frame {
        index,
        batch,
        geometries,
        order,
        geometry,
    })
}

/// Gather every column of the batch, keeping the row count of column-less batches
fn take_batch(batch: &RecordBatch, indices: &UInt64Array) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(|c| compute::take(c.as_ref(), indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(indices.len()));

    Ok(RecordBatch::try_new_with_options(
        batch.schema(),
        columns,
        &options,
    )?)
}

fn row_key(columns: &[Column], pos: usize) -> Option<Vec<Key>> {
    columns.iter().map(|c| c.key(pos)).collect()
}
