//! Row-wise reductions over image data
//!
//! Accumulators are integers so the result does not depend on the order
//! rayon combines partial results in.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Map every row index to a partial value and combine the partials
pub(crate) fn fold_rows<T, M, C>(rows: usize, identity: T, map: M, combine: C) -> T
where
    T: Clone + Send + Sync,
    M: Fn(usize) -> T + Send + Sync,
    C: Fn(T, T) -> T + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        (0..rows)
            .into_par_iter()
            .map(map)
            .reduce(|| identity.clone(), &combine)
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..rows).map(map).fold(identity, combine)
    }
}

/// Element-wise sum of fixed-size counters
pub(crate) fn add_counters<const N: usize>(mut a: [u64; N], b: [u64; N]) -> [u64; N] {
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x += *y;
    }
    a
}
