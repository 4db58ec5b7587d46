//! Two-dimensional grids of partitions.

use arrow_array::{new_empty_array, Array, ArrayRef};
use arrow_schema::DataType;
use arrow_select::concat::concat;

use common_error::{ensure, TesseraResult};
use tessera_block::{Axis, Block, Params};
use tessera_cluster::{Cluster, ObjectRef};

use crate::call_queue::{DeferredFn, DeferredParams};
use crate::partition::Partition;

/// A rectangular matrix of partitions.
///
/// Row and column order is the table's logical order. Nothing ties the
/// shapes of the blocks to each other.
#[derive(Debug, Clone)]
pub struct PartitionGrid {
    cluster: Cluster,
    blocks: Vec<Vec<Partition>>,
    num_cols: usize,
}

impl PartitionGrid {
    /// Assemble a grid. Every row must have the same number of partitions.
    pub fn try_new(cluster: &Cluster, blocks: Vec<Vec<Partition>>) -> TesseraResult<Self> {
        let num_cols = blocks.first().map_or(0, Vec::len);
        for (r, row) in blocks.iter().enumerate() {
            ensure!(
                row.len() == num_cols,
                InvalidParameter: "grid row {r} has {} partitions, expected {num_cols}",
                row.len()
            );
        }
        Ok(Self {
            cluster: cluster.clone(),
            blocks,
            num_cols,
        })
    }

    /// Put a matrix of local blocks.
    pub fn from_blocks(cluster: &Cluster, blocks: Vec<Vec<Block>>) -> TesseraResult<Self> {
        let partitions = blocks
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|block| Partition::put(cluster, block))
                    .collect()
            })
            .collect();
        Self::try_new(cluster, partitions)
    }

    #[must_use]
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// `(row blocks, column blocks)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.blocks.len(), self.num_cols)
    }

    #[must_use]
    pub fn num_row_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn num_col_blocks(&self) -> usize {
        self.num_cols
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&Partition> {
        self.blocks.get(row)?.get(col)
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Partition>] {
        &self.blocks
    }

    #[must_use]
    pub fn into_blocks(self) -> Vec<Vec<Partition>> {
        self.blocks
    }

    /// One partition per row block (axis 0, from the first column) or per
    /// column block (axis 1, from the first row).
    fn representatives(&self, axis: Axis) -> Vec<&Partition> {
        match axis {
            Axis::Rows => self.blocks.iter().filter_map(|row| row.first()).collect(),
            Axis::Columns => self
                .blocks
                .first()
                .map(|row| row.iter().collect())
                .unwrap_or_default(),
        }
    }

    /// Global labels along `axis`.
    ///
    /// `index_fn` runs on one representative partition per row block (axis
    /// 0) or column block (axis 1) and must return a label block; the
    /// results are gathered and concatenated in grid order. An empty axis
    /// gives an empty array without any remote work.
    pub fn get_indices(&self, axis: Axis, index_fn: &DeferredFn) -> TesseraResult<ArrayRef> {
        index_fn.validate(self.cluster.registry())?;
        let representatives = self.representatives(axis);
        if representatives.is_empty() {
            return Ok(new_empty_array(&DataType::Null));
        }
        log::debug!(
            "extracting indices along {axis} from {} partitions",
            representatives.len()
        );

        let handles: Vec<ObjectRef<Block>> = representatives
            .iter()
            .map(|part| part.apply(index_fn.clone(), Params::new()).handle())
            .collect();
        let blocks = self.cluster.gather(&handles)?;
        let labels = blocks
            .iter()
            .map(|block| block.as_labels().map(|labels| &**labels))
            .collect::<TesseraResult<Vec<&dyn Array>>>()?;
        Ok(concat(&labels)?)
    }

    /// Call `func` on every partition with an aligned slice of `right` bound
    /// to `other_name`.
    ///
    /// With `axis` = 1 the companion of `self[r][c]` is row `r` of `right`;
    /// with `axis` = 0 it is column `c`. Companion blocks are concatenated
    /// along the other axis. Each cell becomes one remote task that also
    /// drains the queues it reads. The result has this grid's shape.
    pub fn broadcast_apply(
        &self,
        axis: Axis,
        func: &DeferredFn,
        right: &PartitionGrid,
        other_name: &str,
    ) -> TesseraResult<Self> {
        func.validate(self.cluster.registry())?;
        let (left_dim, right_dim) = match axis {
            Axis::Columns => (self.num_row_blocks(), right.num_row_blocks()),
            Axis::Rows => (self.num_col_blocks(), right.num_col_blocks()),
        };
        ensure!(
            left_dim == right_dim,
            InvalidParameter: "cannot broadcast along axis {}: left has {left_dim} blocks, \
                right has {right_dim}",
            axis.index()
        );
        log::debug!(
            "broadcasting over {:?} grid along axis {}",
            self.shape(),
            axis.index()
        );

        let blocks = self
            .blocks
            .iter()
            .enumerate()
            .map(|(r, row)| {
                row.iter()
                    .enumerate()
                    .map(|(c, part)| {
                        let companions = match axis {
                            Axis::Columns => {
                                right.blocks[r].iter().map(Partition::pending).collect()
                            }
                            Axis::Rows => right.blocks.iter().map(|row| row[c].pending()).collect(),
                        };
                        part.broadcast_with(companions, axis.orthogonal(), func.clone(), other_name)
                    })
                    .collect()
            })
            .collect();
        Ok(self.with_blocks(blocks))
    }

    /// Apply `func` to every partition now.
    #[must_use]
    pub fn map_partitions(&self, func: &DeferredFn, params: &DeferredParams) -> Self {
        self.with_blocks(self.map_cells(|part| part.apply(func.clone(), params.clone())))
    }

    /// Queue `func` on every partition.
    #[must_use]
    pub fn lazy_map_partitions(&self, func: &DeferredFn, params: &DeferredParams) -> Self {
        self.with_blocks(self.map_cells(|part| part.queue(func.clone(), params.clone())))
    }

    /// Row counts of the row blocks, read from the first column.
    pub fn row_lengths(&self) -> TesseraResult<Vec<usize>> {
        self.representatives(Axis::Rows)
            .into_iter()
            .map(Partition::length)
            .collect()
    }

    /// Column counts of the column blocks, read from the first row.
    pub fn column_widths(&self) -> TesseraResult<Vec<usize>> {
        self.representatives(Axis::Columns)
            .into_iter()
            .map(Partition::width)
            .collect()
    }

    /// Drain every partition and block until all blocks exist.
    pub fn wait_partitions(&self) {
        let handles: Vec<ObjectRef<Block>> = self
            .blocks
            .iter()
            .flatten()
            .map(|part| {
                part.drain_call_queue();
                part.handle()
            })
            .collect();
        self.cluster.wait(&handles);
    }

    /// Materialize the whole grid into one block.
    pub fn to_block(&self) -> TesseraResult<Block> {
        let rows = self
            .blocks
            .iter()
            .map(|row| {
                let blocks = row
                    .iter()
                    .map(Partition::materialize)
                    .collect::<TesseraResult<Vec<_>>>()?;
                Block::concat(&blocks, Axis::Columns)
            })
            .collect::<TesseraResult<Vec<_>>>()?;
        Block::concat(&rows, Axis::Rows)
    }

    fn map_cells<F>(&self, f: F) -> Vec<Vec<Partition>>
    where
        F: Fn(&Partition) -> Partition,
    {
        self.blocks
            .iter()
            .map(|row| row.iter().map(&f).collect())
            .collect()
    }

    fn with_blocks(&self, blocks: Vec<Vec<Partition>>) -> Self {
        Self {
            cluster: self.cluster.clone(),
            blocks,
            num_cols: self.num_cols,
        }
    }
}
