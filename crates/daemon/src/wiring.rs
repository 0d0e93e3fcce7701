//! Composition root
//!
//! Credentials are resolved here, once: a configured provider gets the
//! polling adapter, a missing one gets the local estimator.

use crate::config::{Config, StoreKind};
use anyhow::{Context, Result};
use perfscope_core::application::agents::{external_agent, screenshot_agents, LocalAgent};
use perfscope_core::application::constants::{
    DEFAULT_CAPABILITY_TIMEOUT, DEFAULT_POOL_CHECKOUT_TIMEOUT, DEFAULT_RECOMMENDATION_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, GTMETRIX_ADAPTER, WEBPAGETEST_ADAPTER,
};
use perfscope_core::application::{
    Aggregator, BrowserPool, Orchestrator, PollConfig, PollingClient, RecommendationStage,
    Scheduler, StagePlan,
};
use perfscope_core::port::job_store::memory::InMemoryJobStore;
use perfscope_core::port::provider::TestOptions;
use perfscope_core::port::{
    Agent, IdProvider, JobStore, MeasurementCapability, Recommender, ReportRenderer,
    TestProvider, TimeProvider, VisualCapture,
};
use perfscope_infra_providers::{
    ChromiumCapture, GtMetrixProvider, HttpTimingProbe, JsonReportRenderer, OpenAiRecommender,
    WebPageTestProvider,
};
use perfscope_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use std::sync::Arc;
use tracing::info;

pub async fn build_store(
    config: &Config,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<Arc<dyn JobStore>> {
    match &config.store {
        StoreKind::Memory => {
            info!("Using in-memory job store");
            Ok(Arc::new(InMemoryJobStore::new(id_provider, time_provider)))
        }
        StoreKind::Sqlite(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
            info!(db_path = %path.display(), "Initializing database");
            let pool = create_pool(&path.to_string_lossy())
                .await
                .context("DB pool creation failed")?;
            run_migrations(&pool).await.context("Migration failed")?;
            Ok(Arc::new(SqliteJobStore::new(pool, id_provider, time_provider)))
        }
    }
}

pub fn build_orchestrator(
    config: &Config,
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<Orchestrator> {
    let pool = BrowserPool::new(config.browser_pool_size, DEFAULT_POOL_CHECKOUT_TIMEOUT);
    let measurement: Arc<dyn MeasurementCapability> = Arc::new(
        HttpTimingProbe::new(DEFAULT_CAPABILITY_TIMEOUT)
            .context("HTTP probe setup failed")?
            .with_max_body_bytes(config.max_body_bytes),
    );
    let polling = Arc::new(PollingClient::new(PollConfig {
        interval: config.poll_interval,
        timeout: config.poll_timeout,
        ..PollConfig::default()
    }));

    let webpagetest: Option<Arc<dyn TestProvider>> = match &config.webpagetest {
        Some(c) => Some(Arc::new(
            WebPageTestProvider::new(&c.base_url, &c.api_key, DEFAULT_REQUEST_TIMEOUT)
                .context("WebPageTest client setup failed")?,
        )),
        None => None,
    };
    let gtmetrix: Option<Arc<dyn TestProvider>> = match &config.gtmetrix {
        Some(c) => Some(Arc::new(
            GtMetrixProvider::new(
                &c.base_url,
                c.username.clone(),
                &c.api_key,
                DEFAULT_REQUEST_TIMEOUT,
            )
            .context("GTmetrix client setup failed")?,
        )),
        None => None,
    };
    let recommender: Option<Arc<dyn Recommender>> = match &config.openai {
        Some(c) => Some(Arc::new(
            OpenAiRecommender::new(&c.base_url, &c.api_key, &c.model, DEFAULT_RECOMMENDATION_TIMEOUT)
                .context("OpenAI client setup failed")?,
        )),
        None => None,
    };
    info!(
        webpagetest = webpagetest.is_some(),
        gtmetrix = gtmetrix.is_some(),
        ai_recommendations = recommender.is_some(),
        screenshots = config.screenshots,
        mode = %config.execution_mode,
        "Capabilities resolved"
    );

    let measurement_agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(LocalAgent::new(
            measurement.clone(),
            pool.clone(),
            DEFAULT_CAPABILITY_TIMEOUT,
        )),
        external_agent(
            WEBPAGETEST_ADAPTER,
            webpagetest,
            polling.clone(),
            TestOptions::default(),
            measurement.clone(),
            pool.clone(),
            DEFAULT_CAPABILITY_TIMEOUT,
        ),
        external_agent(
            GTMETRIX_ADAPTER,
            gtmetrix,
            polling,
            TestOptions::default(),
            measurement,
            pool.clone(),
            DEFAULT_CAPABILITY_TIMEOUT,
        ),
    ];

    let capture: Option<Arc<dyn VisualCapture>> = if config.screenshots {
        Some(Arc::new(ChromiumCapture::new(
            &config.chromium_binary,
            &config.screenshots_dir,
            DEFAULT_CAPABILITY_TIMEOUT,
        )))
    } else {
        None
    };
    let capture_agents = match &capture {
        Some(capture) => screenshot_agents(
            capture.clone(),
            &config.viewports,
            &pool,
            DEFAULT_CAPABILITY_TIMEOUT,
        ),
        None => Vec::new(),
    };

    let renderer: Arc<dyn ReportRenderer> = Arc::new(JsonReportRenderer::new(&config.reports_dir));
    let scheduler = Scheduler::new(
        store.clone(),
        time_provider.clone(),
        Aggregator::new(config.primary_metric.clone()),
        RecommendationStage::new(recommender, DEFAULT_RECOMMENDATION_TIMEOUT),
        renderer.clone(),
        DEFAULT_CAPABILITY_TIMEOUT,
    );
    let plan = StagePlan::build(config.execution_mode, measurement_agents, capture_agents);
    info!(stages = plan.stages().len(), total_weight = plan.total_weight(), "Stage plan built");

    let orchestrator = Orchestrator::new(store, time_provider, scheduler, plan, renderer);
    Ok(match capture {
        Some(capture) => orchestrator.with_capture_cleanup(capture),
        None => orchestrator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfscope_core::port::id_provider::UuidProvider;
    use perfscope_core::port::time_provider::SystemTimeProvider;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_wires_memory_store_without_credentials() {
        let config = config(&[("PERFSCOPE_STORE", "memory")]);
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let store = build_store(&config, Arc::new(UuidProvider), time.clone())
            .await
            .unwrap();

        let orchestrator = tokio_test::assert_ok!(build_orchestrator(&config, store, time));
        assert_eq!(orchestrator.health().await.unwrap().active_jobs, 0);
    }

    #[tokio::test]
    async fn test_wires_sqlite_store_with_credentials() {
        let dir = std::env::temp_dir().join(format!("perfscope-daemon-{}", UuidProvider.generate_id()));
        let db = dir.join("jobs.db");
        let config = config(&[
            ("PERFSCOPE_DB_PATH", db.to_str().unwrap()),
            ("WEBPAGETEST_API_KEY", "wpt"),
            ("GTMETRIX_API_KEY", "gtm"),
            ("OPENAI_API_KEY", "sk"),
            ("PERFSCOPE_SCREENSHOTS", "false"),
        ]);
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let store = build_store(&config, Arc::new(UuidProvider), time.clone())
            .await
            .unwrap();
        assert!(db.exists());

        tokio_test::assert_ok!(build_orchestrator(&config, store, time));
        let _ = std::fs::remove_dir_all(dir);
    }
}
