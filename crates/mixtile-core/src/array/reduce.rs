//! Whole-array reductions.

use super::NumericArray;
use crate::{dispatch_precision, Element, Error, Result};

impl NumericArray {
    fn fold_f64(&self, init: f64, f: impl Fn(f64, f64) -> f64) -> Result<f64> {
        dispatch_precision!(self.precision, T => {
            self.values::<T>().map(|values| {
                values.iter().fold(init, |acc, &v| f(acc, Element::to_f64(v)))
            })
        })
    }

    /// Sum of all elements, accumulated in `f64`.
    pub fn sum(&self) -> Result<f64> {
        self.fold_f64(0.0, |acc, v| acc + v)
    }

    /// Sum of squares, accumulated in `f64`.
    pub fn square_sum(&self) -> Result<f64> {
        self.fold_f64(0.0, |acc, v| acc + v * v)
    }

    /// Product of all elements, accumulated in `f64`.
    pub fn product(&self) -> Result<f64> {
        self.fold_f64(1.0, |acc, v| acc * v)
    }

    /// Determinant of a square matrix.
    ///
    /// Gaussian elimination with partial pivoting, carried out in the
    /// array's own precision.
    pub fn determinant(&self) -> Result<f64> {
        let dims = self.require_dims()?;
        if !dims.is_square() {
            return Err(Error::shape(format!(
                "Determinant requires a square matrix, got {dims}"
            )));
        }
        dispatch_precision!(self.precision, T => {
            let values = self.values::<T>()?.into_owned();
            eliminate(values, dims.rows).map(Element::to_f64)
        })
    }
}

fn eliminate<T: Element>(mut a: Vec<T>, n: usize) -> Result<T> {
    let mut det = T::one();

    for k in 0..n {
        let mut pivot = k;
        for row in k + 1..n {
            if a[k * n + row].abs() > a[k * n + pivot].abs() {
                pivot = row;
            }
        }
        if a[k * n + pivot] == T::zero() {
            return Err(Error::Singularity { index: k });
        }
        if pivot != k {
            for col in 0..n {
                a.swap(col * n + k, col * n + pivot);
            }
            det = -det;
        }

        let diag = a[k * n + k];
        det = det * diag;
        for row in k + 1..n {
            let factor = a[k * n + row] / diag;
            for col in k + 1..n {
                a[col * n + row] = a[col * n + row] - factor * a[col * n + k];
            }
        }
    }

    Ok(det)
}
