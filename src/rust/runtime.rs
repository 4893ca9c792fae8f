use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

/// Bounds the worker threads used for per-label training and batch
/// prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of worker threads; 0 lets rayon use one per available core.
    pub num_threads: usize,
}

impl RuntimeConfig {
    pub fn with_threads(num_threads: usize) -> Self {
        Self { num_threads }
    }
}

pub fn create_thread_pool(config: &RuntimeConfig) -> Result<ThreadPool, ThreadPoolBuildError> {
    let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("label-worker-{i}"));

    // 0 keeps rayon's default of one thread per core
    if config.num_threads > 0 {
        builder = builder.num_threads(config.num_threads);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_uses_available_cores() {
        let pool = create_thread_pool(&RuntimeConfig::default()).unwrap();
        assert!(pool.current_num_threads() >= 1);
    }

    #[test]
    fn test_pool_thread_bound() {
        let pool = create_thread_pool(&RuntimeConfig::with_threads(2)).unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
