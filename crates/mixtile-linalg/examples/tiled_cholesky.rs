//! Factorize a mixed-precision tiled matrix and solve a system with it.
//!
//! ```text
//! cargo run -p mixtile-linalg --example tiled_cholesky
//! ```

use mixtile_core::Precision;
use mixtile_linalg::{
    tile_cholesky, tile_trsm, Diagonal, LinalgResult, Side, TiledMatrix, Transpose, Triangle,
};

fn main() -> LinalgResult<()> {
    let n = 8;
    let nb = 4;

    let mut values = vec![0.0; n * n];
    for j in 0..n {
        for i in 0..n {
            values[i + j * n] = if i == j {
                4.0
            } else {
                1.0 / (1.0 + i.abs_diff(j) as f64)
            };
        }
    }

    // Double on the diagonal, half elsewhere
    let precisions = [
        Precision::Double,
        Precision::Half,
        Precision::Half,
        Precision::Double,
    ];
    let mut factor = TiledMatrix::new(n, n, nb, nb, &values, &precisions)?;
    let info = tile_cholesky(&mut factor)?;
    println!("cholesky: {info}");

    // b = A * ones
    let b: Vec<f64> = (0..n)
        .map(|i| (0..n).map(|j| values[i + j * n]).sum())
        .collect();
    let mut x = TiledMatrix::new(n, 1, nb, 1, &b, &[Precision::Double; 2])?;
    for trans in [Transpose::NoTrans, Transpose::Trans] {
        tile_trsm(
            Side::Left,
            Triangle::Lower,
            trans,
            Diagonal::NonUnit,
            1.0,
            &factor,
            &mut x,
        )?;
    }

    println!("solution (expected all ones):");
    for i in 0..n {
        println!("  x[{i}] = {:.6}", x.get_value(i, 0)?);
    }
    Ok(())
}
