//! Common utilities used across the crate.
//!
//! This module provides parallelism configuration, the tree-structured
//! reduction used by the distributed objective, and small vector helpers.

use ndarray::ArrayView1;
use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// This is a simple flag passed through training components.
/// When `Parallel`, components may use `rayon` parallel iterators.
/// When `Sequential`, components must use sequential iteration.
///
/// The actual thread pool is set up by the caller via [`run_with_threads`].
/// Components don't manage thread pools - they just respect this flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Parallelism {
    Sequential,
    #[default]
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use the global rayon pool)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// Falls back to the global pool if a dedicated pool cannot be created.
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                Err(err) => {
                    log::warn!("could not build a {n_threads}-thread pool ({err}); using the global pool");
                    f(Parallelism::Parallel)
                }
            }
        }
    }
}

// =============================================================================
// Tree Aggregation
// =============================================================================

/// Combine partition-local partial results with a multi-level tree reduction.
///
/// With `n` partials and `depth` levels, each level combines groups of
/// `ceil(n^(1/depth))` partials in parallel, so no single combine step sees
/// more than that many inputs. `depth = 1` is a flat reduction.
///
/// `combine` must be associative; the grouping (but not the order of
/// partials) changes with `depth`. Returns `None` for an empty input.
pub fn tree_aggregate<T, F>(mut partials: Vec<T>, depth: usize, combine: F) -> Option<T>
where
    T: Send,
    F: Fn(T, T) -> T + Sync + Send,
{
    let depth = depth.max(1);
    let fan_in = ((partials.len() as f64).powf(1.0 / depth as f64).ceil() as usize).max(2);

    let mut level = 1;
    while level < depth && partials.len() > fan_in {
        let mut groups: Vec<Vec<T>> = Vec::with_capacity(partials.len().div_ceil(fan_in));
        let mut iter = partials.into_iter();
        loop {
            let group: Vec<T> = iter.by_ref().take(fan_in).collect();
            if group.is_empty() {
                break;
            }
            groups.push(group);
        }

        partials = groups
            .into_par_iter()
            .filter_map(|group| group.into_iter().reduce(|a, b| combine(a, b)))
            .collect();
        level += 1;
    }

    partials.into_iter().reduce(|a, b| combine(a, b))
}

// =============================================================================
// Vector Helpers
// =============================================================================

/// Euclidean norm of a vector.
#[inline]
pub fn l2_norm(v: ArrayView1<f64>) -> f64 {
    v.dot(&v).sqrt()
}

/// Relative change between two consecutive values, guarded against tiny magnitudes.
#[inline]
pub fn relative_change(previous: f64, current: f64) -> f64 {
    (previous - current).abs() / previous.abs().max(current.abs()).max(1.0)
}
