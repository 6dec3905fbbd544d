//! Matrices partitioned into a grid of independently typed tiles.
//!
//! A [`TiledMatrix`] of `rows x cols` elements is cut into `tile_rows x
//! tile_cols` tiles. Each tile is a [`NumericArray`] matrix with its own
//! precision, so a single matrix can keep its diagonal in double precision
//! while the off-diagonal blocks stay in half.
//!
//! ```text
//! grid (column-major slots)      element (r, c)
//! ┌────┬────┐                     tile  = (r / tile_rows, c / tile_cols)
//! │ 0  │ 2  │                     local = (r % tile_rows, c % tile_cols)
//! ├────┼────┤                     slot  = tc * grid_rows + tr
//! │ 1  │ 3  │
//! └────┴────┘
//! ```

use core::sync::atomic::{AtomicU64, Ordering};

use mixtile_core::{
    dispatch_precision, Dimensions, Element, Error, NumericArray, Precision, Result, TileKey,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

fn shape_error(reason: impl Into<String>) -> Error {
    Error::Shape {
        reason: reason.into(),
    }
}

/// Copy the `tile` block whose top-left element is `(row, col)` out of a
/// column-major source with `ld` rows.
fn extract<T: Copy>(source: &[T], ld: usize, row: usize, col: usize, tile: Dimensions) -> Vec<T> {
    let mut block = Vec::with_capacity(tile.len());
    for c in col..col + tile.cols {
        let start = c * ld + row;
        block.extend_from_slice(&source[start..start + tile.rows]);
    }
    block
}

fn check_grid(rows: usize, cols: usize, tile_rows: usize, tile_cols: usize) -> Result<Dimensions> {
    if rows == 0 || cols == 0 {
        return Err(shape_error(format!(
            "Tiled matrix must be non-empty, got {rows}x{cols}"
        )));
    }
    if tile_rows == 0 || tile_cols == 0 {
        return Err(shape_error(format!(
            "Tile extents must be non-zero, got {tile_rows}x{tile_cols}"
        )));
    }
    if rows % tile_rows != 0 || cols % tile_cols != 0 {
        return Err(shape_error(format!(
            "Tile size {tile_rows}x{tile_cols} does not divide matrix size {rows}x{cols}"
        )));
    }
    Ok(Dimensions::new(rows / tile_rows, cols / tile_cols))
}

/// Column-major grid of precision-tagged tiles.
#[derive(Debug)]
pub struct TiledMatrix {
    id: u64,
    dims: Dimensions,
    tile: Dimensions,
    grid: Dimensions,
    tiles: Vec<Option<NumericArray>>,
}

impl TiledMatrix {
    /// Tile column-major `values` with one precision per tile.
    ///
    /// `precisions` is in slot order (column-major over the grid).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if the matrix or tile extents are zero, the
    /// tiles do not divide the matrix, `values` does not hold `rows * cols`
    /// elements, or `precisions` does not hold one entry per tile.
    ///
    /// # Example
    ///
    /// ```
    /// use mixtile_core::Precision;
    /// use mixtile_linalg::TiledMatrix;
    ///
    /// let values: Vec<f64> = (0..16).map(f64::from).collect();
    /// let tiled = TiledMatrix::new(
    ///     4, 4, 2, 2,
    ///     &values,
    ///     &[Precision::Half, Precision::Float, Precision::Float, Precision::Double],
    /// )?;
    /// assert_eq!(tiled.get_value(3, 3)?, 15.0);
    /// # Ok::<(), mixtile_core::Error>(())
    /// ```
    pub fn new(
        rows: usize,
        cols: usize,
        tile_rows: usize,
        tile_cols: usize,
        values: &[f64],
        precisions: &[Precision],
    ) -> Result<Self> {
        let grid = check_grid(rows, cols, tile_rows, tile_cols)?;
        if values.len() != rows * cols {
            return Err(shape_error(format!(
                "{} values cannot fill a {rows}x{cols} matrix",
                values.len()
            )));
        }
        if precisions.len() != grid.len() {
            return Err(shape_error(format!(
                "Expected {} tile precisions for a {grid} grid, got {}",
                grid.len(),
                precisions.len()
            )));
        }

        let tile = Dimensions::new(tile_rows, tile_cols);
        let mut tiles = Vec::with_capacity(grid.len());
        for tc in 0..grid.cols {
            for tr in 0..grid.rows {
                let block = extract(values, rows, tr * tile_rows, tc * tile_cols, tile);
                let precision = precisions[grid.index(tr, tc)];
                tiles.push(Some(NumericArray::from_matrix_values(
                    tile_rows, tile_cols, &block, precision,
                )?));
            }
        }

        Ok(Self {
            id: next_id(),
            dims: Dimensions::new(rows, cols),
            tile,
            grid,
            tiles,
        })
    }

    /// Grid with every slot empty, to be filled with [`insert_tile`](Self::insert_tile).
    pub fn empty(rows: usize, cols: usize, tile_rows: usize, tile_cols: usize) -> Result<Self> {
        let grid = check_grid(rows, cols, tile_rows, tile_cols)?;
        Ok(Self {
            id: next_id(),
            dims: Dimensions::new(rows, cols),
            tile: Dimensions::new(tile_rows, tile_cols),
            grid,
            tiles: (0..grid.len()).map(|_| None).collect(),
        })
    }

    /// Tile a matrix array, keeping its precision in every tile.
    pub fn from_array(array: &NumericArray, tile_rows: usize, tile_cols: usize) -> Result<Self> {
        let dims = array
            .dims()
            .ok_or_else(|| shape_error("Tiling requires a matrix, got a vector"))?;
        let mut tiled = Self::empty(dims.rows, dims.cols, tile_rows, tile_cols)?;

        dispatch_precision!(array.precision(), T => {
            let source = array.values::<T>()?;
            for tc in 0..tiled.grid.cols {
                for tr in 0..tiled.grid.rows {
                    let block = extract(&*source, dims.rows, tr * tile_rows, tc * tile_cols, tiled.tile);
                    let mut tile = NumericArray::from_elements::<T>(&block);
                    tile.to_matrix(tile_rows, tile_cols)?;
                    let slot = tiled.grid.index(tr, tc);
                    tiled.tiles[slot] = Some(tile);
                }
            }
        });
        Ok(tiled)
    }

    /// Reassemble into one matrix array at `precision`.
    pub fn to_array(&self, precision: Precision) -> Result<NumericArray> {
        self.validate()?;
        let mut data = NumericArray::matrix(self.dims.rows, self.dims.cols, precision);
        dispatch_precision!(precision, T => {
            let out = data.values_mut::<T>()?;
            for tc in 0..self.grid.cols {
                for tr in 0..self.grid.rows {
                    let tile = self.tile(tr, tc)?;
                    let converted;
                    let tile = if tile.precision() == precision {
                        tile
                    } else {
                        converted = tile.converted(precision)?;
                        &converted
                    };
                    let block = tile.values::<T>()?;
                    for c in 0..self.tile.cols {
                        let dst = (tc * self.tile.cols + c) * self.dims.rows + tr * self.tile.rows;
                        let src = c * self.tile.rows;
                        out[dst..dst + self.tile.rows]
                            .copy_from_slice(&block[src..src + self.tile.rows]);
                    }
                }
            }
        });
        Ok(data)
    }

    /// Identity used to key promoted copies of this matrix's tiles.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn rows(&self) -> usize {
        self.dims.rows
    }

    pub fn cols(&self) -> usize {
        self.dims.cols
    }

    /// Extents of every tile.
    pub fn tile_dims(&self) -> Dimensions {
        self.tile
    }

    /// Number of tile rows and tile columns.
    pub fn grid(&self) -> Dimensions {
        self.grid
    }

    fn slot(&self, tr: usize, tc: usize) -> Result<usize> {
        if tr >= self.grid.rows {
            return Err(Error::Bounds {
                index: tr,
                len: self.grid.rows,
            });
        }
        if tc >= self.grid.cols {
            return Err(Error::Bounds {
                index: tc,
                len: self.grid.cols,
            });
        }
        Ok(self.grid.index(tr, tc))
    }

    fn empty_slot(tr: usize, tc: usize) -> Error {
        shape_error(format!("Tile ({tr}, {tc}) is empty"))
    }

    /// Cache key of tile `(tr, tc)`.
    pub fn key(&self, tr: usize, tc: usize) -> Result<TileKey> {
        Ok(TileKey {
            owner: self.id,
            index: self.slot(tr, tc)?,
        })
    }

    pub fn tile(&self, tr: usize, tc: usize) -> Result<&NumericArray> {
        let slot = self.slot(tr, tc)?;
        self.tiles[slot]
            .as_ref()
            .ok_or_else(|| Self::empty_slot(tr, tc))
    }

    pub fn tile_mut(&mut self, tr: usize, tc: usize) -> Result<&mut NumericArray> {
        let slot = self.slot(tr, tc)?;
        self.tiles[slot]
            .as_mut()
            .ok_or_else(|| Self::empty_slot(tr, tc))
    }

    /// Precision of each tile in slot order; `None` for empty slots.
    pub fn precisions(&self) -> Vec<Option<Precision>> {
        self.tiles
            .iter()
            .map(|tile| tile.as_ref().map(NumericArray::precision))
            .collect()
    }

    /// Widest precision among the filled tiles.
    pub fn widest_precision(&self) -> Option<Precision> {
        self.precisions().into_iter().flatten().max()
    }

    fn locate(&self, row: usize, col: usize) -> Result<(usize, usize, usize, usize)> {
        if row >= self.dims.rows {
            return Err(Error::Bounds {
                index: row,
                len: self.dims.rows,
            });
        }
        if col >= self.dims.cols {
            return Err(Error::Bounds {
                index: col,
                len: self.dims.cols,
            });
        }
        Ok((
            row / self.tile.rows,
            col / self.tile.cols,
            row % self.tile.rows,
            col % self.tile.cols,
        ))
    }

    /// Element `(row, col)` of the whole matrix, widened to `f64`.
    pub fn get_value(&self, row: usize, col: usize) -> Result<f64> {
        let (tr, tc, r, c) = self.locate(row, col)?;
        self.tile(tr, tc)?.get_matrix(r, c)
    }

    /// Set element `(row, col)`, cast to the precision of its tile.
    pub fn set_value(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let (tr, tc, r, c) = self.locate(row, col)?;
        self.tile_mut(tr, tc)?.set_matrix(r, c, value)
    }

    /// Re-encode tile `(tr, tc)` in `precision`. Other tiles are untouched.
    pub fn change_precision(&mut self, tr: usize, tc: usize, precision: Precision) -> Result<()> {
        self.tile_mut(tr, tc)?.convert_precision(precision)
    }

    /// Place `tile` at `(tr, tc)`, returning the previous occupant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if `tile` is not a matrix of the per-tile
    /// extents, and [`Error::Bounds`] for a position outside the grid.
    pub fn insert_tile(
        &mut self,
        tile: NumericArray,
        tr: usize,
        tc: usize,
    ) -> Result<Option<NumericArray>> {
        let slot = self.slot(tr, tc)?;
        if tile.dims() != Some(self.tile) {
            let found = tile
                .dims()
                .map_or_else(|| format!("a vector of {}", tile.len()), |d| d.to_string());
            return Err(shape_error(format!(
                "Tile at ({tr}, {tc}) must be {}, got {found}",
                self.tile
            )));
        }
        Ok(self.tiles[slot].replace(tile))
    }

    /// Check that every slot holds a tile of the per-tile extents.
    pub fn validate(&self) -> Result<()> {
        for tc in 0..self.grid.cols {
            for tr in 0..self.grid.rows {
                let tile = self.tile(tr, tc)?;
                if tile.dims() != Some(self.tile) {
                    return Err(shape_error(format!(
                        "Tile ({tr}, {tc}) does not have extents {}",
                        self.tile
                    )));
                }
            }
        }
        Ok(())
    }

    /// Deep copy with a fresh identity.
    pub fn try_clone(&self) -> Result<Self> {
        let tiles = self
            .tiles
            .iter()
            .map(|tile| tile.as_ref().map(NumericArray::try_clone).transpose())
            .collect::<Result<_>>()?;
        Ok(Self {
            id: next_id(),
            dims: self.dims,
            tile: self.tile,
            grid: self.grid,
            tiles,
        })
    }

    /// Run `f` on tile `(tr, tc)` with read access to the other tiles.
    ///
    /// The tile is taken out of its slot for the duration of the call and
    /// put back afterwards, whether `f` succeeds or not. Reading tile
    /// `(tr, tc)` itself from inside `f` fails with [`Error::Shape`].
    pub fn update_tile<R, E, F>(&mut self, tr: usize, tc: usize, f: F) -> core::result::Result<R, E>
    where
        E: From<Error>,
        F: FnOnce(&mut NumericArray, &TiledMatrix) -> core::result::Result<R, E>,
    {
        let slot = self.slot(tr, tc)?;
        let mut tile = self.tiles[slot]
            .take()
            .ok_or_else(|| Self::empty_slot(tr, tc))?;
        let result = f(&mut tile, self);
        self.tiles[slot] = Some(tile);
        result
    }

    /// Apply `f` to every element of tile `(tr, tc)` in its own precision.
    pub(crate) fn map_tile<F>(&mut self, tr: usize, tc: usize, f: F) -> Result<()>
    where
        F: Fn(usize, usize, f64) -> f64,
    {
        let rows = self.tile.rows;
        let tile = self.tile_mut(tr, tc)?;
        dispatch_precision!(tile.precision(), T => {
            for (i, slot) in tile.values_mut::<T>()?.iter_mut().enumerate() {
                *slot = <T as Element>::from_f64(f(i % rows, i / rows, Element::to_f64(*slot)));
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TiledMatrix {
        let values: Vec<f64> = (0..16).map(f64::from).collect();
        TiledMatrix::new(
            4,
            4,
            2,
            2,
            &values,
            &[
                Precision::Half,
                Precision::Float,
                Precision::Float,
                Precision::Double,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_values_match_flat_source() {
        let tiled = sample();
        for col in 0..4 {
            for row in 0..4 {
                assert_eq!(tiled.get_value(row, col).unwrap(), (col * 4 + row) as f64);
            }
        }
        assert_eq!(tiled.tile(0, 1).unwrap().to_f64_vec().unwrap(), vec![8.0, 9.0, 12.0, 13.0]);
    }

    #[test]
    fn test_precisions_in_slot_order() {
        let tiled = sample();
        assert_eq!(tiled.tile(1, 0).unwrap().precision(), Precision::Float);
        assert_eq!(tiled.tile(1, 1).unwrap().precision(), Precision::Double);
        assert_eq!(tiled.widest_precision(), Some(Precision::Double));
    }

    #[test]
    fn test_change_precision_touches_one_tile() {
        let mut tiled = sample();
        tiled.change_precision(0, 0, Precision::Double).unwrap();
        assert_eq!(
            tiled.precisions(),
            vec![
                Some(Precision::Double),
                Some(Precision::Float),
                Some(Precision::Float),
                Some(Precision::Double),
            ]
        );
        assert_eq!(tiled.get_value(1, 1).unwrap(), 5.0);
    }

    #[test]
    fn test_change_precision_off_origin() {
        // 4x6 matrix in a 2x3 grid of 2x2 tiles
        let values: Vec<f64> = (0..24).map(|i| f64::from(i) * 0.1).collect();
        let precisions = [
            Precision::Half,
            Precision::Float,
            Precision::Double,
            Precision::Half,
            Precision::Float,
            Precision::Half,
        ];
        let mut tiled = TiledMatrix::new(4, 6, 2, 2, &values, &precisions).unwrap();
        let before: Vec<Vec<f64>> = (0..3)
            .flat_map(|tc| (0..2).map(move |tr| (tr, tc)))
            .map(|(tr, tc)| tiled.tile(tr, tc).unwrap().to_f64_vec().unwrap())
            .collect();

        tiled.change_precision(1, 1, Precision::Double).unwrap();

        let mut expected: Vec<_> = precisions.iter().copied().map(Some).collect();
        expected[3] = Some(Precision::Double);
        assert_eq!(tiled.precisions(), expected);
        assert_eq!(tiled.tile(1, 1).unwrap().precision(), Precision::Double);
        assert_eq!(tiled.tile(0, 1).unwrap().precision(), Precision::Double);
        assert_eq!(tiled.tile(1, 2).unwrap().precision(), Precision::Half);

        let after: Vec<Vec<f64>> = (0..3)
            .flat_map(|tc| (0..2).map(move |tr| (tr, tc)))
            .map(|(tr, tc)| tiled.tile(tr, tc).unwrap().to_f64_vec().unwrap())
            .collect();
        // Widening keeps the half-rounded values of the changed tile too
        assert_eq!(before, after);
        assert_eq!(
            tiled.get_value(3, 3).unwrap(),
            f64::from(mixtile_core::half::f16::from_f64(1.5))
        );
    }

    #[test]
    fn test_set_value_casts_to_tile_precision() {
        let mut tiled = sample();
        tiled.set_value(0, 0, 0.1).unwrap();
        let stored = tiled.get_value(0, 0).unwrap();
        assert_eq!(stored, f64::from(mixtile_core::half::f16::from_f64(0.1)));
        tiled.set_value(3, 3, 0.1).unwrap();
        assert_eq!(tiled.get_value(3, 3).unwrap(), 0.1);
    }

    #[test]
    fn test_out_of_range() {
        let tiled = sample();
        assert_eq!(
            tiled.get_value(4, 0).unwrap_err(),
            Error::Bounds { index: 4, len: 4 }
        );
        assert!(matches!(tiled.tile(0, 2), Err(Error::Bounds { index: 2, len: 2 })));
    }

    #[test]
    fn test_construction_errors() {
        let values = vec![0.0; 12];
        let p = [Precision::Float; 4];
        assert!(matches!(
            TiledMatrix::new(4, 3, 2, 2, &values, &p),
            Err(Error::Shape { .. })
        ));
        assert!(matches!(
            TiledMatrix::new(4, 4, 2, 2, &values, &p),
            Err(Error::Shape { .. })
        ));
        assert!(matches!(
            TiledMatrix::new(4, 3, 2, 3, &values, &p),
            Err(Error::Shape { .. })
        ));
        assert!(matches!(
            TiledMatrix::empty(0, 4, 2, 2),
            Err(Error::Shape { .. })
        ));
        assert!(matches!(
            TiledMatrix::empty(4, 4, 0, 2),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn test_insert_tile_returns_previous() {
        let mut tiled = TiledMatrix::empty(2, 4, 2, 2).unwrap();
        assert!(tiled.validate().is_err());
        assert!(matches!(tiled.get_value(0, 0), Err(Error::Shape { .. })));

        let tile = NumericArray::from_matrix_values(2, 2, &[1.0; 4], Precision::Float).unwrap();
        assert!(tiled.insert_tile(tile, 0, 1).unwrap().is_none());
        let replacement = NumericArray::matrix(2, 2, Precision::Double);
        let previous = tiled.insert_tile(replacement, 0, 1).unwrap().unwrap();
        assert_eq!(previous.precision(), Precision::Float);

        let wrong = NumericArray::matrix(1, 4, Precision::Double);
        assert!(matches!(tiled.insert_tile(wrong, 0, 0), Err(Error::Shape { .. })));
    }

    #[test]
    fn test_array_roundtrip() {
        let values: Vec<f64> = (0..24).map(f64::from).collect();
        let array = NumericArray::from_matrix_values(4, 6, &values, Precision::Double).unwrap();
        let tiled = TiledMatrix::from_array(&array, 2, 3).unwrap();
        assert_eq!(tiled.grid(), Dimensions::new(2, 2));
        assert_eq!(tiled.get_value(3, 5).unwrap(), 23.0);

        let back = tiled.to_array(Precision::Float).unwrap();
        assert_eq!(back.dims(), Some(Dimensions::new(4, 6)));
        assert_eq!(back.precision(), Precision::Float);
        assert_eq!(back.to_f64_vec().unwrap(), values);
    }

    #[test]
    fn test_try_clone_has_fresh_identity() {
        let tiled = sample();
        let copy = tiled.try_clone().unwrap();
        assert_ne!(tiled.id(), copy.id());
        assert_ne!(tiled.key(0, 0).unwrap(), copy.key(0, 0).unwrap());
        assert_eq!(copy.get_value(2, 1).unwrap(), 6.0);
    }

    #[test]
    fn test_update_tile_restores_slot() {
        let mut tiled = sample();
        let result: Result<()> = tiled.update_tile(1, 1, |tile, rest| {
            assert!(rest.tile(1, 1).is_err());
            let left = rest.get_value(2, 0)?;
            tile.set_matrix(0, 0, left)?;
            Err(Error::Capacity { capacity: 0 })
        });
        assert!(result.is_err());
        assert_eq!(tiled.get_value(2, 2).unwrap(), 2.0);
    }
}
