//! The in-memory block type and its local transformations.

use std::fmt;
use std::sync::Arc;

use arrow_array::{make_array, Array, ArrayRef, RecordBatch, RecordBatchOptions, UInt32Array};
use arrow_data::transform::MutableArrayData;
use arrow_schema::{Schema, SchemaRef};
use arrow_select::concat::{concat, concat_batches};
use arrow_select::take::take;
use serde::{Deserialize, Serialize};

use common_error::{TesseraError, TesseraResult};

use crate::dense::DenseMatrix;
use crate::params::{BlockFn, Params};
use crate::selector::Selector;

// ============================================================================
// Axis
// ============================================================================

/// Axis of a table or of a partition grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Axis 0: rows.
    Rows,
    /// Axis 1: columns.
    Columns,
}

impl Axis {
    /// Convert a numeric axis (0 or 1).
    pub fn from_index(index: usize) -> TesseraResult<Self> {
        match index {
            0 => Ok(Self::Rows),
            1 => Ok(Self::Columns),
            other => Err(TesseraError::invalid_parameter(format!(
                "axis must be 0 or 1, got {other}"
            ))),
        }
    }

    /// Numeric form of the axis.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Rows => 0,
            Self::Columns => 1,
        }
    }

    /// The other axis.
    #[must_use]
    pub const fn orthogonal(self) -> Self {
        match self {
            Self::Rows => Self::Columns,
            Self::Columns => Self::Rows,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows => write!(f, "rows"),
            Self::Columns => write!(f, "columns"),
        }
    }
}

// ============================================================================
// Block
// ============================================================================

/// Payload of a block.
#[derive(Debug, Clone)]
pub enum BlockData {
    /// A rectangular frame of named columns.
    Frame(RecordBatch),
    /// A sequence of labels. Has a length but no column concept.
    Labels(ArrayRef),
}

/// One concrete piece of tabular data.
///
/// Blocks placed in the object store are sealed read-only, mirroring an
/// immutable shared-memory store: operations that want to write in place call
/// [`Block::ensure_writable`] and get a [`TesseraError::ReadOnly`] back on a
/// sealed block. [`Block::copy`] produces a private, writable copy.
#[derive(Debug, Clone)]
pub struct Block {
    data: BlockData,
    read_only: bool,
}

impl Block {
    /// Wrap a record batch.
    #[must_use]
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            data: BlockData::Frame(batch),
            read_only: false,
        }
    }

    /// Wrap a label array.
    #[must_use]
    pub fn from_labels(labels: ArrayRef) -> Self {
        Self {
            data: BlockData::Labels(labels),
            read_only: false,
        }
    }

    /// The canonical zero-row, zero-column frame.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_batch(RecordBatch::new_empty(Arc::new(Schema::empty())))
    }

    /// Borrow the payload.
    #[must_use]
    pub fn data(&self) -> &BlockData {
        &self.data
    }

    /// Whether this block is a frame.
    #[must_use]
    pub fn is_frame(&self) -> bool {
        matches!(self.data, BlockData::Frame(_))
    }

    /// Whether this block is a label sequence.
    #[must_use]
    pub fn is_labels(&self) -> bool {
        matches!(self.data, BlockData::Labels(_))
    }

    /// Borrow the record batch of a frame block.
    pub fn as_batch(&self) -> TesseraResult<&RecordBatch> {
        match &self.data {
            BlockData::Frame(batch) => Ok(batch),
            BlockData::Labels(_) => Err(TesseraError::type_error(
                "expected a frame block, got labels",
            )),
        }
    }

    /// Borrow the array of a label block.
    pub fn as_labels(&self) -> TesseraResult<&ArrayRef> {
        match &self.data {
            BlockData::Labels(labels) => Ok(labels),
            BlockData::Frame(_) => Err(TesseraError::type_error(
                "expected a label block, got a frame",
            )),
        }
    }

    /// Unwrap into the record batch of a frame block.
    pub fn into_batch(self) -> TesseraResult<RecordBatch> {
        match self.data {
            BlockData::Frame(batch) => Ok(batch),
            BlockData::Labels(_) => Err(TesseraError::type_error(
                "expected a frame block, got labels",
            )),
        }
    }

    /// Number of rows (labels count as rows).
    #[must_use]
    pub fn num_rows(&self) -> usize {
        match &self.data {
            BlockData::Frame(batch) => batch.num_rows(),
            BlockData::Labels(labels) => labels.len(),
        }
    }

    /// Number of columns; 0 for labels.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        match &self.data {
            BlockData::Frame(batch) => batch.num_columns(),
            BlockData::Labels(_) => 0,
        }
    }

    /// `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    /// Whether the block is sealed.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Seal the block so in-place writers must copy first.
    #[must_use]
    pub fn seal(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Fail with [`TesseraError::ReadOnly`] if the block is sealed.
    pub fn ensure_writable(&self) -> TesseraResult<()> {
        if self.read_only {
            return Err(TesseraError::read_only(
                "block is backed by read-only shared storage",
            ));
        }
        Ok(())
    }

    /// Deep-copy every buffer into a private, writable block.
    pub fn copy(&self) -> TesseraResult<Self> {
        let data = match &self.data {
            BlockData::Frame(batch) => {
                let columns = batch.columns().iter().map(deep_copy_array).collect();
                BlockData::Frame(with_row_count(batch.schema(), columns, batch.num_rows())?)
            }
            BlockData::Labels(labels) => BlockData::Labels(deep_copy_array(labels)),
        };
        Ok(Self {
            data,
            read_only: false,
        })
    }

    /// Apply a block function.
    pub fn apply(&self, func: &BlockFn, params: &Params) -> TesseraResult<Self> {
        func(self, params)
    }

    /// Select rows and columns by position.
    ///
    /// Contiguous row slices are zero-copy; other row selections gather.
    /// Label blocks accept only [`Selector::All`] for columns.
    pub fn slice(&self, rows: &Selector, cols: &Selector) -> TesseraResult<Self> {
        let data = match &self.data {
            BlockData::Frame(batch) => {
                let projected = if cols.is_all() {
                    batch.clone()
                } else {
                    batch.project(&cols.positions(batch.num_columns())?)?
                };
                BlockData::Frame(select_rows_batch(&projected, rows)?)
            }
            BlockData::Labels(labels) => {
                if !cols.is_all() {
                    return Err(TesseraError::type_error(
                        "label blocks have no columns to select",
                    ));
                }
                BlockData::Labels(select_rows_array(labels, rows)?)
            }
        };
        Ok(Self {
            data,
            read_only: false,
        })
    }

    /// Concatenate blocks along `axis`.
    ///
    /// Rows: frames must share a schema (0×0 frames are skipped); labels must
    /// share a type. Columns: frames must share a row count; labels cannot be
    /// concatenated column-wise. An empty input yields [`Block::empty`].
    pub fn concat(blocks: &[Self], axis: Axis) -> TesseraResult<Self> {
        let Some(first) = blocks.first() else {
            return Ok(Self::empty());
        };
        if blocks.len() == 1 {
            return Ok(Self {
                data: first.data.clone(),
                read_only: false,
            });
        }

        if first.is_labels() {
            if axis == Axis::Columns {
                return Err(TesseraError::type_error(
                    "label blocks cannot be concatenated along columns",
                ));
            }
            let arrays = blocks
                .iter()
                .map(|b| b.as_labels().map(|labels| &**labels))
                .collect::<TesseraResult<Vec<&dyn Array>>>()?;
            return Ok(Self::from_labels(concat(&arrays)?));
        }

        let batches = blocks
            .iter()
            .map(Self::as_batch)
            .collect::<TesseraResult<Vec<_>>>()?;
        match axis {
            Axis::Rows => concat_rows(&batches).map(Self::from_batch),
            Axis::Columns => concat_columns(&batches).map(Self::from_batch),
        }
    }

    /// Convert to a row-major dense `f64` matrix.
    pub fn to_dense(&self) -> TesseraResult<DenseMatrix> {
        match &self.data {
            BlockData::Frame(batch) => DenseMatrix::from_columns(batch.num_rows(), batch.columns()),
            BlockData::Labels(labels) => {
                DenseMatrix::from_columns(labels.len(), std::slice::from_ref(labels))
            }
        }
    }
}

impl PartialEq for Block {
    /// Equality of contents; the read-only flag is ignored.
    fn eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (BlockData::Frame(a), BlockData::Frame(b)) => a == b,
            (BlockData::Labels(a), BlockData::Labels(b)) => a.to_data() == b.to_data(),
            _ => false,
        }
    }
}

impl From<RecordBatch> for Block {
    fn from(batch: RecordBatch) -> Self {
        Self::from_batch(batch)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_frame() { "Frame" } else { "Labels" };
        write!(f, "{kind}[{}x{}]", self.num_rows(), self.num_columns())?;
        if self.read_only {
            write!(f, " (read-only)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn deep_copy_array(array: &ArrayRef) -> ArrayRef {
    let data = array.to_data();
    let mut mutable = MutableArrayData::new(vec![&data], false, data.len());
    mutable.extend(0, 0, data.len());
    make_array(mutable.freeze())
}

fn with_row_count(
    schema: SchemaRef,
    columns: Vec<ArrayRef>,
    num_rows: usize,
) -> TesseraResult<RecordBatch> {
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

fn take_indices(rows: &Selector, len: usize) -> TesseraResult<UInt32Array> {
    let positions = rows.positions(len)?;
    Ok(UInt32Array::from_iter_values(
        positions.into_iter().map(|p| p as u32),
    ))
}

fn select_rows_batch(batch: &RecordBatch, rows: &Selector) -> TesseraResult<RecordBatch> {
    match rows {
        Selector::All => Ok(batch.clone()),
        Selector::Slice(slice) if slice.is_contiguous() => {
            let (start, _, _) = slice.indices(batch.num_rows());
            Ok(batch.slice(start as usize, slice.len_for(batch.num_rows())))
        }
        _ => {
            let indices = take_indices(rows, batch.num_rows())?;
            let columns = batch
                .columns()
                .iter()
                .map(|col| take(col.as_ref(), &indices, None))
                .collect::<Result<Vec<_>, _>>()?;
            with_row_count(batch.schema(), columns, indices.len())
        }
    }
}

fn select_rows_array(array: &ArrayRef, rows: &Selector) -> TesseraResult<ArrayRef> {
    match rows {
        Selector::All => Ok(Arc::clone(array)),
        Selector::Slice(slice) if slice.is_contiguous() => {
            let (start, _, _) = slice.indices(array.len());
            Ok(array.slice(start as usize, slice.len_for(array.len())))
        }
        _ => {
            let indices = take_indices(rows, array.len())?;
            Ok(take(array.as_ref(), &indices, None)?)
        }
    }
}

fn concat_rows(batches: &[&RecordBatch]) -> TesseraResult<RecordBatch> {
    let non_empty: Vec<&RecordBatch> = batches
        .iter()
        .copied()
        .filter(|b| b.num_columns() > 0 || b.num_rows() > 0)
        .collect();
    let Some(first) = non_empty.first() else {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    };
    let schema = first.schema();
    if let Some(other) = non_empty.iter().find(|b| b.schema().fields() != schema.fields()) {
        return Err(TesseraError::schema_error(format!(
            "cannot stack blocks with different schemas: {:?} vs {:?}",
            schema.fields(),
            other.schema().fields()
        )));
    }
    if schema.fields().is_empty() {
        let rows = non_empty.iter().map(|b| b.num_rows()).sum();
        return with_row_count(schema, vec![], rows);
    }
    Ok(concat_batches(&schema, non_empty.iter().copied())?)
}

fn concat_columns(batches: &[&RecordBatch]) -> TesseraResult<RecordBatch> {
    let num_rows = batches[0].num_rows();
    if let Some(other) = batches.iter().find(|b| b.num_rows() != num_rows) {
        return Err(TesseraError::value_error(format!(
            "cannot append columns of blocks with {} and {} rows",
            num_rows,
            other.num_rows()
        )));
    }
    let mut fields = Vec::new();
    let mut columns = Vec::new();
    for batch in batches {
        fields.extend(batch.schema().fields().iter().cloned());
        columns.extend(batch.columns().iter().cloned());
    }
    with_row_count(Arc::new(Schema::new(fields)), columns, num_rows)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field};

    use crate::selector::Slice;

    fn create_test_block() -> Block {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let id_array = Int64Array::from(vec![1, 2, 3, 4, 5]);
        let name_array = StringArray::from(vec![
            Some("Alice"),
            Some("Bob"),
            None,
            Some("Diana"),
            Some("Eve"),
        ]);
        Block::from_batch(
            RecordBatch::try_new(schema, vec![Arc::new(id_array), Arc::new(name_array)]).unwrap(),
        )
    }

    fn ids(block: &Block) -> Vec<i64> {
        block
            .as_batch()
            .unwrap()
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    #[test]
    fn test_axis() {
        assert_eq!(Axis::from_index(0).unwrap(), Axis::Rows);
        assert_eq!(Axis::from_index(1).unwrap(), Axis::Columns);
        assert!(Axis::from_index(2).is_err());
        assert_eq!(Axis::Rows.orthogonal(), Axis::Columns);
        assert_eq!(Axis::Columns.index(), 1);
    }

    #[test]
    fn test_shape() {
        let block = create_test_block();
        assert_eq!(block.shape(), (5, 2));
        assert_eq!(Block::empty().shape(), (0, 0));

        let labels = Block::from_labels(Arc::new(Int64Array::from(vec![7, 8])));
        assert_eq!(labels.shape(), (2, 0));
    }

    #[test]
    fn test_seal_and_copy() {
        let sealed = create_test_block().seal();
        assert!(sealed.is_read_only());
        assert!(sealed.ensure_writable().unwrap_err().is_read_only());

        let copy = sealed.copy().unwrap();
        assert!(!copy.is_read_only());
        assert!(copy.ensure_writable().is_ok());
        assert_eq!(copy, sealed);
    }

    #[test]
    fn test_copy_owns_its_buffers() {
        let block = create_test_block();
        let copy = block.copy().unwrap();
        let original = block.as_batch().unwrap().column(0).to_data();
        let copied = copy.as_batch().unwrap().column(0).to_data();
        assert_ne!(
            original.buffers()[0].as_ptr(),
            copied.buffers()[0].as_ptr()
        );
    }

    #[test]
    fn test_slice_contiguous_rows() {
        let block = create_test_block();
        let sliced = block
            .slice(&Selector::from(1..4), &Selector::All)
            .unwrap();
        assert_eq!(ids(&sliced), vec![2, 3, 4]);
    }

    #[test]
    fn test_slice_positions_and_columns() {
        let block = create_test_block();
        let sliced = block
            .slice(&Selector::from(vec![4, 0]), &Selector::from(vec![0]))
            .unwrap();
        assert_eq!(sliced.shape(), (2, 1));
        assert_eq!(ids(&sliced), vec![5, 1]);
    }

    #[test]
    fn test_slice_reversed_rows() {
        let block = create_test_block();
        let reversed = Slice::new(None, None, -2).unwrap();
        let sliced = block.slice(&reversed.into(), &Selector::All).unwrap();
        assert_eq!(ids(&sliced), vec![5, 3, 1]);
    }

    #[test]
    fn test_concat_rows_and_columns() {
        let block = create_test_block();
        let stacked = Block::concat(&[block.clone(), block.clone()], Axis::Rows).unwrap();
        assert_eq!(stacked.shape(), (10, 2));

        let wide = Block::concat(&[block.clone(), block], Axis::Columns).unwrap();
        assert_eq!(wide.shape(), (5, 4));
    }

    #[test]
    fn test_concat_skips_empty_frames() {
        let block = create_test_block();
        let stacked = Block::concat(&[Block::empty(), block.clone()], Axis::Rows).unwrap();
        assert_eq!(stacked, block);
        assert_eq!(Block::concat(&[], Axis::Rows).unwrap(), Block::empty());
    }

    #[test]
    fn test_concat_columns_row_mismatch() {
        let block = create_test_block();
        let short = block.slice(&Selector::from(0..2), &Selector::All).unwrap();
        let err = Block::concat(&[block, short], Axis::Columns).unwrap_err();
        assert!(matches!(err, TesseraError::ValueError(_)));
    }

    #[test]
    fn test_concat_labels() {
        let a = Block::from_labels(Arc::new(Int64Array::from(vec![0, 1, 2])));
        let b = Block::from_labels(Arc::new(Int64Array::from(vec![3, 4, 5])));
        let joined = Block::concat(&[a.clone(), b], Axis::Rows).unwrap();
        let expected = Block::from_labels(Arc::new(Int64Array::from(vec![0, 1, 2, 3, 4, 5])));
        assert_eq!(joined, expected);
        assert!(Block::concat(&[a.clone(), a], Axis::Columns).is_err());
    }

    #[test]
    fn test_apply() {
        let block = create_test_block();
        let head: BlockFn = Arc::new(|b: &Block, p: &Params| {
            let n = p.get_i64("n").unwrap_or(1) as usize;
            b.slice(&Selector::from(0..n), &Selector::All)
        });
        let result = block.apply(&head, &Params::new().with_value("n", 2)).unwrap();
        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_display() {
        assert_eq!(create_test_block().to_string(), "Frame[5x2]");
        assert_eq!(Block::empty().seal().to_string(), "Frame[0x0] (read-only)");
    }
}
