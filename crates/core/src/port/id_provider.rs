// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique job ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential provider (`job-1`, `job-2`, ...) for tests and fixtures
#[derive(Default)]
pub struct SequentialIdProvider {
    next: std::sync::atomic::AtomicU64,
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        let n = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        format!("job-{}", n)
    }
}
