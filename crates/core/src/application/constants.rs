// Workflow constants (No magic values)
use std::time::Duration;

/// First wait between provider polls (5s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for the backoff-grown poll interval (30s)
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Multiplier applied to the poll interval after each pending poll
pub const DEFAULT_POLL_BACKOFF_FACTOR: f64 = 1.5;

/// Wall-clock budget for one external test (3 minutes)
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(180);

/// Timeout for a single provider request (submit or poll, 30s)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for one local measurement or screenshot (90s)
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(90);

/// Timeout for recommendation generation (60s)
pub const DEFAULT_RECOMMENDATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an adapter waits for a browser session before failing (120s)
pub const DEFAULT_POOL_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(120);

/// Concurrent browser sessions shared by all jobs
pub const DEFAULT_BROWSER_POOL_SIZE: usize = 4;

/// Metric used for ranking unless configured otherwise
pub const DEFAULT_PRIMARY_METRIC: &str = "performance_score";

/// Adapter identifiers
pub const LOCAL_ADAPTER: &str = "local";
pub const WEBPAGETEST_ADAPTER: &str = "webpagetest";
pub const GTMETRIX_ADAPTER: &str = "gtmetrix";
pub const RECOMMENDATION_ADAPTER: &str = "recommendation";
pub const REPORT_ADAPTER: &str = "report";
pub const SCREENSHOT_ADAPTER_PREFIX: &str = "screenshot";
