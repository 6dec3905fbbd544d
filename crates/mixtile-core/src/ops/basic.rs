//! Structural operations: extrema, diagonal, binding, concatenation,
//! replication, sweeping statistics over a margin, and NaN handling.

use crate::ops::ArithmeticOp;
use crate::{
    dispatch_precision, Checked, Element, Error, NumericArray, Precision, Promoter, Result,
    SizeMismatchWarning,
};

/// Smallest or largest element and its flat index.
///
/// NaN elements are skipped; an all-NaN array yields its first element.
pub fn min_max(array: &NumericArray, max: bool) -> Result<(NumericArray, usize)> {
    if array.is_empty() {
        return Err(Error::shape("Cannot take the extremum of an empty array"));
    }
    let values = array.to_f64_vec()?;
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, current)) if max => v > current,
            Some((_, current)) => v < current,
        };
        if better {
            best = Some((i, v));
        }
    }
    let index = best.map_or(0, |(i, _)| i);
    Ok((array.element(index)?, index))
}

/// Main diagonal of a matrix as a vector.
pub fn diagonal(array: &NumericArray) -> Result<NumericArray> {
    let dims = array.require_dims()?;
    let n = dims.rows.min(dims.cols);
    let mut out = NumericArray::with_context(n, array.precision(), array.context().clone());
    dispatch_precision!(array.precision(), T => {
        let source = array.values::<T>()?;
        for (i, slot) in out.values_mut::<T>()?.iter_mut().enumerate() {
            *slot = source[dims.index(i, i)];
        }
    });
    Ok(out)
}

fn as_matrix_dims(array: &NumericArray, as_row: bool) -> (usize, usize) {
    match array.dims() {
        Some(dims) => (dims.rows, dims.cols),
        None if as_row => (1, array.len()),
        None => (array.len(), 1),
    }
}

fn bind(lhs: &NumericArray, rhs: &NumericArray, by_rows: bool) -> Result<NumericArray> {
    let (lr, lc) = as_matrix_dims(lhs, by_rows);
    let (rr, rc) = as_matrix_dims(rhs, by_rows);
    let (rows, cols) = if by_rows {
        if lc != rc {
            return Err(Error::shape(format!(
                "Row bind needs equal column counts, got {lc} and {rc}"
            )));
        }
        (lr + rr, lc)
    } else {
        if lr != rr {
            return Err(Error::shape(format!(
                "Column bind needs equal row counts, got {lr} and {rr}"
            )));
        }
        (lr, lc + rc)
    };

    let mut promoter = Promoter::new(2);
    promoter.insert(lhs)?;
    promoter.insert(rhs)?;
    let target = promoter.promote()?;
    let (a, b) = (promoter.operand(0)?, promoter.operand(1)?);

    let mut out = NumericArray::with_context(rows * cols, target, lhs.context().clone());
    dispatch_precision!(target, T => {
        let x = a.values::<T>()?;
        let y = b.values::<T>()?;
        let data = out.values_mut::<T>()?;
        if by_rows {
            for col in 0..cols {
                for row in 0..rows {
                    data[col * rows + row] = if row < lr {
                        x[col * lr + row]
                    } else {
                        y[col * rr + row - lr]
                    };
                }
            }
        } else {
            data[..x.len()].copy_from_slice(&x);
            data[x.len()..].copy_from_slice(&y);
        }
    });
    out.to_matrix(rows, cols)?;
    Ok(out)
}

/// Concatenate column-wise. Vectors count as single columns.
pub fn column_bind(lhs: &NumericArray, rhs: &NumericArray) -> Result<NumericArray> {
    bind(lhs, rhs, false)
}

/// Concatenate row-wise. Vectors count as single rows.
pub fn row_bind(lhs: &NumericArray, rhs: &NumericArray) -> Result<NumericArray> {
    bind(lhs, rhs, true)
}

/// Copy `input` into the flat storage of `output` starting at `*index`,
/// then advance `*index` past it.
///
/// `output` keeps its precision. When `input` is wider, the copy is made at
/// the wider precision and `output` is narrowed back afterwards.
pub fn concatenate_at(input: &NumericArray, output: &mut NumericArray, index: &mut usize) -> Result<()> {
    let end = *index + input.len();
    if end > output.len() {
        return Err(Error::Bounds {
            index: end - 1,
            len: output.len(),
        });
    }

    let mut promoter = Promoter::new(2);
    promoter.insert(input)?;
    promoter.insert_output(output)?;
    let target = promoter.promote()?;
    {
        let (inputs, out) = promoter.split_output(1)?;
        dispatch_precision!(target, T => {
            let source = inputs[0].values::<T>()?;
            out.values_mut::<T>()?[*index..end].copy_from_slice(&source);
        });
    }
    promoter.depromote()?;

    *index = end;
    Ok(())
}

/// Flat vector holding every element of `inputs` in order, at the widest
/// of their precisions.
pub fn concatenate(inputs: &[&NumericArray]) -> Result<NumericArray> {
    let (first, target) = match (
        inputs.first(),
        Precision::widest(inputs.iter().map(|array| array.precision())),
    ) {
        (Some(first), Some(target)) => (first, target),
        _ => return Err(Error::shape("Nothing to concatenate")),
    };
    let len = inputs.iter().map(|array| array.len()).sum();
    let mut out = NumericArray::with_context(len, target, first.context().clone());
    let mut index = 0;
    for input in inputs {
        concatenate_at(input, &mut out, &mut index)?;
    }
    Ok(out)
}

/// Matrix extent a statistic is indexed by in [`sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    /// `stats[r]` applies to row `r`
    Row,
    /// `stats[c]` applies to column `c`
    Column,
}

/// `array[r, c] op stats[r]` for [`Margin::Row`], `array[r, c] op stats[c]`
/// for [`Margin::Column`].
///
/// The result is at the wider of the two precisions. `stats` is reused
/// cyclically; a warning is attached when the margin's extent is not a
/// multiple of its length.
pub fn sweep(
    array: &NumericArray,
    stats: &NumericArray,
    margin: Margin,
    op: ArithmeticOp,
) -> Result<Checked<NumericArray>> {
    let dims = array.require_dims()?;
    if stats.is_empty() {
        return Err(Error::shape("Sweep needs at least one statistic"));
    }
    let extent = match margin {
        Margin::Row => dims.rows,
        Margin::Column => dims.cols,
    };
    let warning = (extent % stats.len() != 0).then_some(SizeMismatchWarning {
        longer: extent.max(stats.len()),
        shorter: extent.min(stats.len()),
    });
    if let Some(warning) = warning {
        tracing::warn!(%warning, "recycling sweep statistics");
    }

    let mut promoter = Promoter::new(2);
    promoter.insert(array)?;
    promoter.insert(stats)?;
    let target = promoter.promote()?;
    let (a, s) = (promoter.operand(0)?, promoter.operand(1)?);

    let mut out = NumericArray::with_context(array.len(), target, array.context().clone());
    dispatch_precision!(target, T => {
        let x = a.values::<T>()?;
        let stats = s.values::<T>()?;
        let data = out.values_mut::<T>()?;
        for col in 0..dims.cols {
            for row in 0..dims.rows {
                let stat = match margin {
                    Margin::Row => stats[row % stats.len()],
                    Margin::Column => stats[col % stats.len()],
                };
                let i = dims.index(row, col);
                data[i] = op.apply(x[i], stat);
            }
        }
    });
    out.to_matrix(dims.rows, dims.cols)?;

    Ok(Checked {
        value: out,
        warning,
    })
}

/// Per-column statistic of a matrix, at the matrix's precision.
fn column_stats(array: &NumericArray, stat: impl Fn(&[f64]) -> f64) -> Result<NumericArray> {
    let dims = array.require_dims()?;
    let values = array.to_f64_vec()?;
    let stats: Vec<f64> = values
        .chunks(dims.rows.max(1))
        .take(dims.cols)
        .map(stat)
        .collect();
    let mut out = NumericArray::with_context(stats.len(), array.precision(), array.context().clone());
    out.set_values(&stats)?;
    Ok(out)
}

fn mean(column: &[f64]) -> f64 {
    column.iter().sum::<f64>() / column.len() as f64
}

/// Sample standard deviation (`n - 1` denominator).
fn std_dev(column: &[f64]) -> f64 {
    let mean = mean(column);
    let square_sum: f64 = column.iter().map(|v| (v - mean) * (v - mean)).sum();
    (square_sum / (column.len() as f64 - 1.0)).sqrt()
}

/// Subtract a per-column center from a matrix.
///
/// With `center` given, column `c` is shifted by `center[c]`, reused
/// cyclically. Without it, each column is shifted by its own mean.
pub fn apply_center(array: &NumericArray, center: Option<&NumericArray>) -> Result<Checked<NumericArray>> {
    match center {
        Some(center) => sweep(array, center, Margin::Column, ArithmeticOp::Sub),
        None => sweep(array, &column_stats(array, mean)?, Margin::Column, ArithmeticOp::Sub),
    }
}

/// Divide each column of a matrix by a per-column scale.
///
/// With `scale` given, column `c` is divided by `scale[c]`, reused
/// cyclically. Without it, each column is divided by its sample standard
/// deviation; a single-row matrix has none and comes out NaN.
pub fn apply_scale(array: &NumericArray, scale: Option<&NumericArray>) -> Result<Checked<NumericArray>> {
    match scale {
        Some(scale) => sweep(array, scale, Margin::Column, ArithmeticOp::Div),
        None => sweep(array, &column_stats(array, std_dev)?, Margin::Column, ArithmeticOp::Div),
    }
}

/// Vector of `len` elements cycling through `array`.
pub fn replicate(array: &NumericArray, len: usize) -> Result<NumericArray> {
    if array.is_empty() && len > 0 {
        return Err(Error::shape("Cannot replicate an empty array"));
    }
    let mut out = NumericArray::with_context(len, array.precision(), array.context().clone());
    dispatch_precision!(array.precision(), T => {
        let source = array.values::<T>()?;
        for (i, slot) in out.values_mut::<T>()?.iter_mut().enumerate() {
            *slot = source[i % source.len()];
        }
    });
    Ok(out)
}

/// Vector of the non-NaN elements, in order.
pub fn na_exclude(array: &NumericArray) -> Result<NumericArray> {
    dispatch_precision!(array.precision(), T => {
        let kept: Vec<T> = array
            .values::<T>()?
            .iter()
            .copied()
            .filter(|&v| !Element::is_nan(v))
            .collect();
        let mut out = NumericArray::with_context(kept.len(), array.precision(), array.context().clone());
        out.values_mut::<T>()?.copy_from_slice(&kept);
        Ok(out)
    })
}

/// Replace every NaN element with `value`.
pub fn na_replace(array: &mut NumericArray, value: f64) -> Result<()> {
    dispatch_precision!(array.precision(), T => {
        let value = <T as Element>::from_f64(value);
        for slot in array.values_mut::<T>()? {
            if Element::is_nan(*slot) {
                *slot = value;
            }
        }
    });
    Ok(())
}
