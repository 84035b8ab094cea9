//! Parallel processing utilities

use crate::error::{QcError, Result};

/// Run `f` on a dedicated rayon pool of `n_threads` workers, or on the
/// global pool when `n_threads` is `None`.
pub fn run_with_threads<T, F>(n_threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match n_threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n.max(1))
                .build()
                .map_err(|e| QcError::ConfigError(format!("Thread pool error: {}", e)))?;
            Ok(pool.install(f))
        }
        None => Ok(f()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_dedicated_pool_size() {
        let threads = run_with_threads(Some(2), rayon::current_num_threads).unwrap();
        assert_eq!(threads, 2);
    }

    #[test]
    fn test_global_pool() {
        let sum: i64 = run_with_threads(None, || (0..100i64).into_par_iter().sum()).unwrap();
        assert_eq!(sum, 4950);
    }
}
