//! Dense numeric form of a block.

use arrow::compute::cast;
use arrow_array::{Array, ArrayRef, Float64Array};
use arrow_schema::DataType;

use common_error::{type_err, TesseraError, TesseraResult};

/// Row-major matrix of `f64`. Nulls become `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl DenseMatrix {
    /// Build from equally long columns, casting each to `Float64`.
    pub fn from_columns(rows: usize, columns: &[ArrayRef]) -> TesseraResult<Self> {
        let cols = columns.len();
        let mut values = vec![0.0; rows * cols];
        for (c, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(TesseraError::internal(format!(
                    "column {c} has {} values, expected {rows}",
                    column.len()
                )));
            }
            let data_type = column.data_type();
            let numeric =
                data_type.is_numeric() || matches!(data_type, DataType::Boolean | DataType::Null);
            if !numeric {
                type_err!("column {c} of type {data_type} is not numeric");
            }
            let cast_column = cast(column.as_ref(), &DataType::Float64)?;
            let floats = cast_column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| TesseraError::internal("cast to Float64 returned another type"))?;
            for r in 0..rows {
                values[r * cols + c] = if floats.is_null(r) {
                    f64::NAN
                } else {
                    floats.value(r)
                };
            }
        }
        Ok(Self { rows, cols, values })
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Element at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    /// One row as a slice.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.rows).then(|| &self.values[row * self.cols..(row + 1) * self.cols])
    }

    /// All values in row-major order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
