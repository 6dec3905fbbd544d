//! Shape changes: reshape, transpose and triangle fill.

use super::{Dimensions, NumericArray};
use crate::{dispatch_precision, Element, Error, Result};

impl NumericArray {
    /// Whether the elements can be viewed as a `rows x cols` matrix.
    pub fn can_be_matrix(&self, rows: usize, cols: usize) -> bool {
        rows.checked_mul(cols) == Some(self.len)
    }

    /// Attach matrix dimensions. The data is not moved.
    pub fn to_matrix(&mut self, rows: usize, cols: usize) -> Result<()> {
        if !self.can_be_matrix(rows, cols) {
            return Err(Error::shape(format!(
                "Cannot view {} elements as a {rows}x{cols} matrix",
                self.len
            )));
        }
        self.dims = Some(Dimensions::new(rows, cols));
        Ok(())
    }

    /// Drop matrix dimensions, keeping the column-major element order.
    pub fn to_vector(&mut self) {
        self.dims = None;
    }

    /// Transpose in place.
    pub fn transpose(&mut self) -> Result<()> {
        let dims = self.require_dims()?;
        if dims.rows > 1 && dims.cols > 1 {
            dispatch_precision!(self.precision, T => {
                let source = self.values::<T>()?.into_owned();
                let target = self.values_mut::<T>()?;
                for col in 0..dims.cols {
                    for row in 0..dims.rows {
                        target[row * dims.cols + col] = source[dims.index(row, col)];
                    }
                }
            });
        }
        self.dims = Some(dims.transposed());
        Ok(())
    }

    /// Fill the strict upper (or lower) triangle of a square matrix.
    ///
    /// The diagonal is left untouched.
    pub fn fill_triangle(&mut self, value: f64, upper: bool) -> Result<()> {
        let dims = self.require_dims()?;
        if !dims.is_square() {
            return Err(Error::shape(format!(
                "Triangle fill requires a square matrix, got {dims}"
            )));
        }
        dispatch_precision!(self.precision, T => {
            let value = <T as Element>::from_f64(value);
            let data = self.values_mut::<T>()?;
            for col in 0..dims.cols {
                for row in 0..dims.rows {
                    if (upper && row < col) || (!upper && row > col) {
                        data[dims.index(row, col)] = value;
                    }
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, NumericArray, Precision};

    #[test]
    fn test_reshape_roundtrip() {
        let values: Vec<f64> = (0..6).map(f64::from).collect();
        let mut array = NumericArray::from_values(&values, Precision::Float);
        assert!(array.can_be_matrix(3, 2));
        assert!(!array.can_be_matrix(4, 2));
        assert!(matches!(array.to_matrix(4, 2), Err(Error::Shape { .. })));

        array.to_matrix(3, 2).unwrap();
        assert_eq!(array.get_matrix(2, 1).unwrap(), 5.0);
        array.to_vector();
        assert!(!array.is_matrix());
        assert_eq!(array.to_f64_vec().unwrap(), values);
    }

    #[test]
    fn test_transpose() {
        let mut array =
            NumericArray::from_matrix_values(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Precision::Double)
                .unwrap();
        array.transpose().unwrap();
        assert_eq!(array.rows(), 3);
        assert_eq!(array.cols(), 2);
        assert_eq!(array.to_f64_vec().unwrap(), vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
        assert_eq!(array.get_matrix(2, 1).unwrap(), 6.0);

        let mut vector = NumericArray::from_values(&[1.0], Precision::Double);
        assert!(vector.transpose().is_err());
    }

    #[test]
    fn test_fill_triangle_keeps_diagonal() {
        let mut array =
            NumericArray::from_matrix_values(2, 2, &[1.0, 2.0, 3.0, 4.0], Precision::Half).unwrap();
        array.fill_triangle(0.0, true).unwrap();
        assert_eq!(array.to_f64_vec().unwrap(), vec![1.0, 2.0, 0.0, 4.0]);
        array.fill_triangle(-1.0, false).unwrap();
        assert_eq!(array.to_f64_vec().unwrap(), vec![1.0, -1.0, 0.0, 4.0]);

        let mut wide = NumericArray::matrix(2, 3, Precision::Half);
        assert!(matches!(
            wide.fill_triangle(0.0, true),
            Err(Error::Shape { .. })
        ));
    }
}
