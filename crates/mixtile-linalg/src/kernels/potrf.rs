use mixtile_core::Element;

/// Non-positive pivot met during factorization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotFailure {
    /// Column of the failing pivot, local to the factorized block
    pub index: usize,
    /// Pivot value before the square root
    pub value: f64,
}

/// Lower Cholesky factorization of the `n x n` block at the start of `a`.
///
/// On success the lower triangle holds `L` with `A = L * L^T`. The strict
/// upper triangle is not referenced.
pub fn potrf<T: Element>(n: usize, a: &mut [T], lda: usize) -> Result<(), PivotFailure> {
    for j in 0..n {
        let mut ajj = a[j + j * lda];
        for k in 0..j {
            let ljk = a[j + k * lda];
            ajj = ajj - ljk * ljk;
        }

        // NaN fails here as well
        if !(ajj > T::zero()) {
            return Err(PivotFailure {
                index: j,
                value: ajj.to_f64(),
            });
        }

        let ljj = ajj.sqrt();
        a[j + j * lda] = ljj;

        for i in j + 1..n {
            let mut aij = a[i + j * lda];
            for k in 0..j {
                aij = aij - a[i + k * lda] * a[j + k * lda];
            }
            a[i + j * lda] = aij / ljj;
        }
    }
    Ok(())
}
