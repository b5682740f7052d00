use database::Database;
use deal_engine::{
    DealService, DedupConfig, DedupStore, EngineConfig, FetchMode, FilterChain, FilterConfig,
    NicheConfig, Orchestrator, Ranker, ServiceConfig,
};
use dealwatch_core::{AppConfig, CommissionTable, CoreError};
use price_client::{BudgetConfig, DealQuery, FanOutConfig, PriceApiClient, PriceSource};
use publisher::{GovernorConfig, HttpPublisher, PublishGovernor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealwatch=info,deal_engine=info,price_client=info".into()),
        )
        .init();

    tracing::info!("Starting Dealwatch");

    let config = AppConfig::from_env()?;
    config.validate()?;

    let single_cycle = std::env::args().any(|arg| arg == "--single");

    let db = Database::connect(&config.database_url)
        .await
        .map_err(CoreError::Database)?;
    db.run_migrations().await.map_err(CoreError::Database)?;
    let store = Arc::new(db);

    let source = Arc::new(PriceApiClient::new(
        config.price_api_base_url.clone(),
        config.price_api_key.clone(),
        BudgetConfig {
            tokens_per_minute: config.tokens_per_minute,
            token_buffer: config.token_buffer,
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
        },
    ));

    let posting = Arc::new(HttpPublisher::new(
        config.publisher_base_url.clone(),
        config.publisher_token.clone(),
    ));

    let commissions = CommissionTable::default();
    let fanout = price_client::CategoryFanOut::new(
        source.clone(),
        commissions.clone(),
        FanOutConfig {
            max_workers: config.fanout_workers,
            top_categories: config.fanout_top_categories,
            inter_request_pause: Duration::from_millis(config.inter_request_pause_ms),
        },
    );

    let fetch_mode = if config.use_fanout() {
        tracing::info!(
            "high-volume token plan, fanning out across {} categories",
            config.fanout_top_categories
        );
        FetchMode::FanOut {
            categories: config.target_categories.clone(),
        }
    } else {
        FetchMode::Single
    };

    let orchestrator = Arc::new(Orchestrator::new(
        source.clone(),
        store,
        posting,
        fanout,
        FilterChain::new(
            FilterConfig {
                min_discount_percent: config.min_discount_percent,
                min_price_drop: config.min_price_drop,
                min_product_price: config.min_product_price,
                max_product_price: config.max_product_price,
                min_rating: config.min_rating,
                min_review_count: config.min_review_count,
                max_sales_rank: config.max_sales_rank,
                require_prime: config.require_prime,
            },
            NicheConfig {
                min_discount_percent: config.niche_min_discount,
                min_price: config.niche_min_price,
                max_price: config.niche_max_price,
                price_floor: config.niche_price_floor,
                ..Default::default()
            },
        ),
        DedupStore::new(DedupConfig {
            detect_cooldown: chrono::Duration::hours(config.detect_cooldown_hours),
            publish_cooldown: chrono::Duration::hours(config.publish_cooldown_hours),
        }),
        Ranker::new(commissions, config.batch_size),
        PublishGovernor::new(GovernorConfig {
            max_posts_per_hour: config.max_posts_per_hour,
            min_post_interval: chrono::Duration::seconds(config.min_post_interval_secs as i64),
        }),
        EngineConfig {
            fetch_mode,
            base_query: DealQuery {
                min_discount_percent: config.min_discount_percent,
                min_price: config.min_product_price,
                max_price: config.max_product_price,
                category_id: None,
                max_sales_rank: config.max_sales_rank,
                min_rating: Some(config.min_rating),
                page: 0,
            },
            fallback_min_discount: config.fallback_min_discount,
            niche_only_publish: config.niche_only_publish,
            publishing_enabled: config.publishing_enabled,
        },
    ));

    if single_cycle {
        tracing::info!("running one cycle and exiting");
        let stats = orchestrator.run_cycle().await;
        log_source_health(&source).await;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let health_source = source.clone();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(60 * 60));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        timer.tick().await;
        loop {
            timer.tick().await;
            log_source_health(&health_source).await;
        }
    });

    let service = DealService::new(
        orchestrator,
        ServiceConfig {
            cycle_interval: Duration::from_secs(config.cycle_interval_minutes * 60),
            reset_interval: Duration::from_secs(24 * 60 * 60),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    service.run(shutdown_rx).await;
    tracing::info!("Dealwatch stopped");
    Ok(())
}

/// Periodic health line: local budget pressure plus the upstream's own view
/// of the remaining token quota.
async fn log_source_health(source: &PriceApiClient) {
    let budget = source.budget_status().await;
    let traffic = source.metrics().snapshot();
    tracing::info!(
        "call budget: {}/{} this window, {:.0}% used; {} of {} requests throttled, mean wait {:?}",
        budget.calls_this_window,
        budget.effective_cap,
        budget.utilization_percentage(),
        traffic.throttled_requests,
        traffic.requests,
        traffic.mean_budget_wait()
    );
    match source.remaining_quota().await {
        Ok(tokens) => tracing::info!("upstream reports {} tokens left", tokens),
        Err(e) => tracing::warn!("quota check failed: {}", e),
    }
}
