//! One promoted kernel application on a set of tiles.

use mixtile_core::{NumericArray, Precision, Promoter, TileCache, TileKey};

use crate::LinalgResult;

/// Promote `inputs` and `output` to a common precision of at least `floor`,
/// run `kernel` on them, and put `output` back to its own precision.
///
/// Promoted input copies stay in `cache` for later steps. The output's
/// cached copies are dropped since its contents changed. Returns the
/// precision the kernel ran at.
pub(crate) fn apply_kernel<K>(
    cache: &mut TileCache,
    inputs: &[(TileKey, &NumericArray)],
    output: (TileKey, &mut NumericArray),
    floor: Precision,
    kernel: K,
) -> LinalgResult<Precision>
where
    K: FnOnce(&[&NumericArray], &mut NumericArray) -> LinalgResult<()>,
{
    let (output_key, output) = output;
    let target = {
        let mut promoter = Promoter::with_cache(inputs.len() + 1, cache);
        for &(key, tile) in inputs {
            promoter.insert_tile(key, tile)?;
        }
        let out_index = promoter.insert_output(output)?;
        let target = promoter.promote_at_least(floor)?;

        let (operands, out) = promoter.split_output(out_index)?;
        kernel(&operands, out)?;
        promoter.depromote()?;
        target
    };
    cache.invalidate(output_key);
    Ok(target)
}
