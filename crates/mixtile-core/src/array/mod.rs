//! Precision-tagged vectors and matrices.
//!
//! A [`NumericArray`] is a flat run of elements of one [`Precision`], stored
//! in a [`BufferHolder`]. With [`Dimensions`] attached it is a column-major
//! matrix: element `(r, c)` lives at flat index `c * rows + r`.

mod layout;
mod reduce;
mod serialize;

use core::fmt;
use std::borrow::Cow;

use crate::buffer::{BufferHolder, BufferState, HostBuffer, Placement};
use crate::config::{get_context, Context};
use crate::error::Conversion;
use crate::{dispatch_precision, Element, Error, Precision, Result};

/// Matrix extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub rows: usize,
    pub cols: usize,
}

impl Dimensions {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of elements.
    pub const fn len(self) -> usize {
        self.rows * self.cols
    }

    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub const fn is_square(self) -> bool {
        self.rows == self.cols
    }

    /// Column-major flat index of `(row, col)`.
    pub const fn index(self, row: usize, col: usize) -> usize {
        col * self.rows + row
    }

    pub const fn transposed(self) -> Self {
        Self::new(self.cols, self.rows)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Vector or column-major matrix of one precision.
#[derive(Debug)]
pub struct NumericArray {
    precision: Precision,
    len: usize,
    dims: Option<Dimensions>,
    holder: BufferHolder,
}

fn convert_host(host: &HostBuffer, from: Precision, to: Precision) -> HostBuffer {
    dispatch_precision!(from, S => {
        let source = host.as_slice::<S>();
        dispatch_precision!(to, D => {
            let converted: Vec<D> = source.iter().map(|&v| D::cast_from(v)).collect();
            HostBuffer::from_slice(&converted)
        })
    })
}

fn encode(values: &[f64], precision: Precision) -> HostBuffer {
    dispatch_precision!(precision, T => {
        let encoded: Vec<T> = values.iter().map(|&v| <T as Element>::from_f64(v)).collect();
        HostBuffer::from_slice(&encoded)
    })
}

impl NumericArray {
    /// Zero-filled vector in the global context.
    pub fn new(len: usize, precision: Precision) -> Self {
        Self::with_context(len, precision, get_context())
    }

    /// Zero-filled vector in an explicit context.
    pub fn with_context(len: usize, precision: Precision, context: Context) -> Self {
        let mut holder = BufferHolder::new(context);
        holder.set_host(HostBuffer::zeroed(len * precision.width()));
        Self {
            precision,
            len,
            dims: None,
            holder,
        }
    }

    /// Zero-filled `rows x cols` matrix.
    pub fn matrix(rows: usize, cols: usize, precision: Precision) -> Self {
        let mut array = Self::new(rows * cols, precision);
        array.dims = Some(Dimensions::new(rows, cols));
        array
    }

    /// Vector holding `values` cast to `precision`.
    pub fn from_values(values: &[f64], precision: Precision) -> Self {
        Self::from_host(encode(values, precision), values.len(), precision, get_context())
    }

    /// Matrix from column-major `values` cast to `precision`.
    pub fn from_matrix_values(
        rows: usize,
        cols: usize,
        values: &[f64],
        precision: Precision,
    ) -> Result<Self> {
        if rows.checked_mul(cols) != Some(values.len()) {
            return Err(Error::shape(format!(
                "{} values cannot fill a {rows}x{cols} matrix",
                values.len()
            )));
        }
        let mut array = Self::from_values(values, precision);
        array.dims = Some(Dimensions::new(rows, cols));
        Ok(array)
    }

    /// Vector holding `values` in their own precision.
    pub fn from_elements<T: Element>(values: &[T]) -> Self {
        Self::from_host(
            HostBuffer::from_slice(values),
            values.len(),
            T::PRECISION,
            get_context(),
        )
    }

    fn from_host(host: HostBuffer, len: usize, precision: Precision, context: Context) -> Self {
        let mut holder = BufferHolder::new(context);
        holder.set_host(host);
        Self {
            precision,
            len,
            dims: None,
            holder,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn is_half(&self) -> bool {
        self.precision == Precision::Half
    }

    pub fn is_float(&self) -> bool {
        self.precision == Precision::Float
    }

    pub fn is_double(&self) -> bool {
        self.precision == Precision::Double
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dims(&self) -> Option<Dimensions> {
        self.dims
    }

    pub fn is_matrix(&self) -> bool {
        self.dims.is_some()
    }

    /// Row count; a vector counts as one column.
    pub fn rows(&self) -> usize {
        self.dims.map_or(self.len, |d| d.rows)
    }

    pub fn cols(&self) -> usize {
        self.dims.map_or(1, |d| d.cols)
    }

    pub fn context(&self) -> &Context {
        self.holder.context()
    }

    pub fn buffer(&self) -> &BufferHolder {
        &self.holder
    }

    pub fn buffer_state(&self) -> BufferState {
        self.holder.state()
    }

    /// Make `placement` hold the current contents.
    pub fn sync(&mut self, placement: Placement) -> Result<()> {
        self.holder.sync(placement)
    }

    /// Release one side of the buffer, keeping the contents on the other.
    ///
    /// Releasing the only copy leaves an empty vector.
    pub fn free_memory(&mut self, placement: Placement) -> Result<()> {
        self.holder.free_memory(placement)?;
        if self.holder.is_empty() {
            self.len = 0;
            self.dims = None;
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len {
            return Err(Error::Bounds {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    pub(crate) fn require_dims(&self) -> Result<Dimensions> {
        self.dims
            .ok_or_else(|| Error::shape("Operation requires a matrix, got a vector"))
    }

    fn matrix_index(&self, row: usize, col: usize) -> Result<usize> {
        let dims = self.require_dims()?;
        if row >= dims.rows {
            return Err(Error::Bounds {
                index: row,
                len: dims.rows,
            });
        }
        if col >= dims.cols {
            return Err(Error::Bounds {
                index: col,
                len: dims.cols,
            });
        }
        Ok(dims.index(row, col))
    }

    fn expect_precision<T: Element>(&self) -> Result<()> {
        if T::PRECISION != self.precision {
            return Err(Error::Type {
                expected: T::PRECISION.name(),
                actual: self.precision.name(),
            });
        }
        Ok(())
    }

    /// Element `index` widened to `f64`.
    pub fn get(&self, index: usize) -> Result<f64> {
        self.check_index(index)?;
        let host = self.holder.read_host()?;
        Ok(dispatch_precision!(self.precision, T => {
            Element::to_f64(host.as_slice::<T>()[index])
        }))
    }

    /// Store `value` cast to this array's precision.
    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_index(index)?;
        let precision = self.precision;
        let host = self.holder.host_mut()?;
        dispatch_precision!(precision, T => {
            host.as_slice_mut::<T>()[index] = <T as Element>::from_f64(value);
        });
        Ok(())
    }

    pub fn get_matrix(&self, row: usize, col: usize) -> Result<f64> {
        let index = self.matrix_index(row, col)?;
        self.get(index)
    }

    pub fn set_matrix(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let index = self.matrix_index(row, col)?;
        self.set(index, value)
    }

    /// One-element array holding element `index`.
    pub fn element(&self, index: usize) -> Result<Self> {
        let value = self.get(index)?;
        Ok(Self::from_host(
            encode(&[value], self.precision),
            1,
            self.precision,
            self.context().clone(),
        ))
    }

    pub fn element_matrix(&self, row: usize, col: usize) -> Result<Self> {
        let index = self.matrix_index(row, col)?;
        self.element(index)
    }

    /// Typed view of the elements.
    ///
    /// Borrows when the host copy is current, copies from the device
    /// otherwise. `T` must match the array's precision.
    pub fn values<T: Element>(&self) -> Result<Cow<'_, [T]>> {
        self.expect_precision::<T>()?;
        Ok(match self.holder.read_host()? {
            Cow::Borrowed(host) => Cow::Borrowed(host.as_slice::<T>()),
            Cow::Owned(host) => Cow::Owned(host.as_slice::<T>().to_vec()),
        })
    }

    /// Typed mutable view. The device copy becomes stale.
    pub fn values_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        self.expect_precision::<T>()?;
        if self.len == 0 {
            return Ok(&mut []);
        }
        Ok(self.holder.host_mut()?.as_slice_mut::<T>())
    }

    /// All elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        dispatch_precision!(self.precision, T => {
            self.values::<T>()
                .map(|values| values.iter().map(|&v| Element::to_f64(v)).collect())
        })
    }

    /// Overwrite every element, casting to this array's precision.
    pub fn set_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.len {
            return Err(Error::shape(format!(
                "Expected {} values, got {}",
                self.len,
                values.len()
            )));
        }
        dispatch_precision!(self.precision, T => {
            for (slot, &value) in self.values_mut::<T>()?.iter_mut().zip(values) {
                *slot = <T as Element>::from_f64(value);
            }
        });
        Ok(())
    }

    /// Re-encode every element in `target` precision.
    ///
    /// Uses the native cast of the element types: values beyond the range of
    /// a narrower type become infinite and NaN stays NaN.
    pub fn convert_precision(&mut self, target: Precision) -> Result<()> {
        if target == self.precision {
            return Ok(());
        }
        let converted = {
            let host = self.holder.read_host()?;
            convert_host(&host, self.precision, target)
        };
        self.holder.set_host(converted);
        tracing::debug!(
            len = self.len,
            conversion = %Conversion { from: self.precision, to: target },
            "converted array precision"
        );
        self.precision = target;
        Ok(())
    }

    /// Independent copy with the same precision and shape.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            precision: self.precision,
            len: self.len,
            dims: self.dims,
            holder: self.holder.try_clone()?,
        })
    }

    /// Independent copy converted to `precision`.
    pub fn converted(&self, precision: Precision) -> Result<Self> {
        if precision == self.precision {
            return self.try_clone();
        }
        let host = convert_host(&*self.holder.read_host()?, self.precision, precision);
        tracing::debug!(
            len = self.len,
            conversion = %Conversion { from: self.precision, to: precision },
            "copied array with conversion"
        );
        let mut copy = Self::from_host(host, self.len, precision, self.context().clone());
        copy.dims = self.dims;
        Ok(copy)
    }

    /// Whether element `index` is NaN.
    pub fn is_na(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        dispatch_precision!(self.precision, T => {
            self.values::<T>().map(|values| Element::is_nan(values[index]))
        })
    }

    /// NaN flag per element.
    pub fn na_mask(&self) -> Result<Vec<bool>> {
        dispatch_precision!(self.precision, T => {
            self.values::<T>()
                .map(|values| values.iter().map(|&v| Element::is_nan(v)).collect())
        })
    }

    /// Memory footprint in bytes: element storage plus the fixed overhead.
    pub fn object_size(&self) -> usize {
        core::mem::size_of::<Self>() + self.holder.bytes()
    }
}
