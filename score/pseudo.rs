// ========================================================================================
//
//                              Pseudo-count augmentation
//
// ========================================================================================
//
// Several metrics divide by row variance or take row-wise log ratios, which are undefined
// on constant rows. Embedding an `n x n` matrix in an `(n + c) x (n + c)` identity gives
// every row a nonzero variance. The synthetic mutations are singleton clusters; half are
// declared ancestors of every real mutation and the rest descendants of every real one.
// Truth, prediction and both baselines must be augmented with the same `c`.

use ndarray::{Array2, ArrayView2, ArrayViewMut2, s};

/// Default number of synthetic mutations for `n` real ones: `ceil(sqrt(n))`.
pub fn default_pseudo_count(n: usize) -> usize {
    (n as f64).sqrt().ceil() as usize
}

/// Resolves an optional override against the default for `n` mutations.
pub fn resolve_pseudo_count(n: usize, count: Option<usize>) -> usize {
    count.unwrap_or_else(|| default_pseudo_count(n))
}

/// Number of rows whose entries are all equal.
pub fn constant_rows(matrix: ArrayView2<f64>) -> usize {
    matrix
        .rows()
        .into_iter()
        .filter(|row| {
            let mut values = row.iter();
            values.next().is_none_or(|&first| values.all(|&v| v == first))
        })
        .count()
}

/// Warns about zero-variance rows of `matrix` ahead of augmentation with `count`
/// synthetic mutations, returning how many there are.
pub fn warn_constant_rows(matrix: ArrayView2<f64>, what: &str, count: usize) -> usize {
    let constant = constant_rows(matrix);
    if constant == 0 {
        return 0;
    }
    if count == 0 {
        log::warn!(
            "{what}: {constant} of {} rows have zero variance and no pseudo counts are added; pearson, spearman and pseudoV may be undefined.",
            matrix.nrows()
        );
    } else {
        log::warn!(
            "{what}: {constant} of {} rows have zero variance before adding {count} pseudo counts.",
            matrix.nrows()
        );
    }
    constant
}

/// Enlarges a CCM (and optionally its AD matrix) with `count` synthetic mutations.
///
/// `count == Some(0)` returns the inputs untouched. The original `n x n` block is
/// preserved exactly in both outputs.
pub fn add_pseudo_counts(
    ccm: Array2<f64>,
    ad: Option<Array2<f64>>,
    count: Option<usize>,
) -> (Array2<f64>, Option<Array2<f64>>) {
    let n = ccm.nrows();
    let count = resolve_pseudo_count(n, count);
    if count == 0 {
        return (ccm, ad);
    }
    let mut new_ccm = Array2::eye(n + count);
    new_ccm.slice_mut(s![..n, ..n]).assign(&ccm);
    drop(ccm);

    (new_ccm, ad.map(|ad| augment_ad(ad, n, count)))
}

/// [`add_pseudo_counts`] for callers that always carry an AD matrix.
pub fn add_pseudo_counts_with_ancestry(
    ccm: Array2<f64>,
    ad: Array2<f64>,
    count: Option<usize>,
) -> (Array2<f64>, Array2<f64>) {
    let n = ccm.nrows();
    let count = resolve_pseudo_count(n, count);
    let (ccm, _) = add_pseudo_counts(ccm, None, Some(count));
    (ccm, augment_ad(ad, n, count))
}

fn augment_ad(ad: Array2<f64>, n: usize, count: usize) -> Array2<f64> {
    if count == 0 {
        return ad;
    }
    let size = n + count;
    let mut new_ad = Array2::zeros((size, size));
    new_ad.slice_mut(s![..n, ..n]).assign(&ad);
    mark_synthetic_ancestry(new_ad.view_mut(), n, count);
    new_ad
}

/// Rows `n .. n + count/2` become ancestors of every real mutation, and the remaining
/// synthetic columns become descendants of every real mutation.
fn mark_synthetic_ancestry(mut ad: ArrayViewMut2<f64>, n: usize, count: usize) {
    let ancestors = count / 2;
    ad.slice_mut(s![n..n + ancestors, ..n]).fill(1.0);
    ad.slice_mut(s![..n, n + ancestors..n + count]).fill(1.0);
}

/// Augments a CCM that was loaded into an oversized buffer, without reallocating.
///
/// The buffer must be at least `n + count` square; the synthetic block is reset to the
/// identity and the cross blocks to zero. Returns `None` if the buffer is too small.
pub fn add_pseudo_counts_in_place(
    buffer: &mut Array2<f64>,
    n: usize,
    count: usize,
) -> Option<ArrayViewMut2<'_, f64>> {
    let size = n + count;
    if buffer.nrows() < size || buffer.ncols() < size {
        return None;
    }
    buffer.slice_mut(s![..n, n..size]).fill(0.0);
    let mut tail = buffer.slice_mut(s![n..size, ..size]);
    tail.fill(0.0);
    for i in 0..count {
        tail[[i, n + i]] = 1.0;
    }
    Some(buffer.slice_mut(s![..size, ..size]))
}

/// Owned variant of [`add_pseudo_counts_in_place`] that falls back to a copying
/// augmentation when the buffer cannot hold the synthetic block.
pub fn augment_buffer(mut buffer: Array2<f64>, n: usize, count: usize) -> Array2<f64> {
    let size = n + count;
    if add_pseudo_counts_in_place(&mut buffer, n, count).is_some() {
        buffer.slice_move(s![..size, ..size])
    } else {
        let (ccm, _) = add_pseudo_counts(buffer.slice_move(s![..n, ..n]), None, Some(count));
        ccm
    }
}
