use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealwatch_core::{Candidate, CandidateStore, CycleStats, DatabaseError, StoredDeal};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed deal store. One pool, shared by every pipeline component.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if absent) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: format!("invalid database url: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("connected to {}", database_url);
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id TEXT NOT NULL,
                title TEXT NOT NULL,
                current_price REAL NOT NULL,
                reference_price REAL NOT NULL,
                discount_percent REAL NOT NULL,
                category_id INTEGER NOT NULL,
                category_name TEXT NOT NULL DEFAULT '',
                brand TEXT,
                sales_rank INTEGER,
                rating REAL,
                review_count INTEGER,
                prime_eligible INTEGER NOT NULL DEFAULT 0,
                image_url TEXT,
                detected_at TEXT NOT NULL,
                published INTEGER NOT NULL DEFAULT 0,
                published_at TEXT,
                post_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|_| DatabaseError::MigrationFailed {
            migration: "create deals".to_string(),
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_deals_product ON deals (product_id, detected_at)")
            .execute(&self.pool)
            .await
            .map_err(|_| DatabaseError::MigrationFailed {
                migration: "index deals".to_string(),
            })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cycle_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                categories_checked INTEGER NOT NULL,
                categories_failed INTEGER NOT NULL,
                fetched INTEGER NOT NULL,
                persisted INTEGER NOT NULL,
                filtered_out INTEGER NOT NULL,
                published INTEGER NOT NULL,
                errors INTEGER NOT NULL,
                elapsed_ms INTEGER NOT NULL,
                completed INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|_| DatabaseError::MigrationFailed {
            migration: "create cycle_metrics".to_string(),
        })?;

        debug!("migrations applied");
        Ok(())
    }

    /// Aggregate counts for deals detected at or after `since`.
    pub async fn daily_summary(&self, since: DateTime<Utc>) -> Result<DailySummary, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS detected,
                COALESCE(SUM(published), 0) AS published,
                COALESCE(AVG(discount_percent), 0.0) AS avg_discount
            FROM deals
            WHERE detected_at >= ?1
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(DailySummary {
            detected: row.try_get("detected")?,
            published: row.try_get("published")?,
            average_discount: row.try_get("avg_discount")?,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, Clone)]
pub struct DailySummary {
    pub detected: i64,
    pub published: i64,
    pub average_discount: f64,
}

fn stored_deal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredDeal, DatabaseError> {
    let detected_at: String = row.try_get("detected_at")?;
    let published_at: Option<String> = row.try_get("published_at")?;

    Ok(StoredDeal {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        title: row.try_get("title")?,
        detected_at: parse_timestamp(&detected_at)?,
        published: row.try_get::<i64, _>("published")? != 0,
        published_at: published_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::QueryFailed {
            query: format!("unparseable timestamp '{}'", raw),
        })
}

#[async_trait]
impl CandidateStore for Database {
    async fn save_candidate(&self, candidate: &Candidate) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO deals (
                product_id, title, current_price, reference_price, discount_percent,
                category_id, category_name, brand, sales_rank, rating, review_count,
                prime_eligible, image_url, detected_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&candidate.product_id)
        .bind(&candidate.title)
        .bind(candidate.current_price)
        .bind(candidate.reference_price)
        .bind(candidate.discount_percent)
        .bind(candidate.category_id as i64)
        .bind(&candidate.category_name)
        .bind(&candidate.brand)
        .bind(candidate.sales_rank.map(|r| r as i64))
        .bind(candidate.rating)
        .bind(candidate.review_count.map(|c| c as i64))
        .bind(candidate.prime_eligible as i64)
        .bind(&candidate.image_url)
        .bind(candidate.detected_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn mark_published(
        &self,
        product_id: &str,
        post_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE deals
            SET published = 1, published_at = ?2, post_id = ?3
            WHERE id = (
                SELECT id FROM deals WHERE product_id = ?1
                ORDER BY detected_at DESC LIMIT 1
            )
            "#,
        )
        .bind(product_id)
        .bind(at.to_rfc3339())
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_recent(
        &self,
        product_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<StoredDeal>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, title, detected_at, published, published_at
            FROM deals
            WHERE product_id = ?1 AND detected_at >= ?2
            ORDER BY detected_at DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .bind(since.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(stored_deal_from_row).transpose()
    }

    async fn record_metrics(&self, stats: &CycleStats) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO cycle_metrics (
                recorded_at, categories_checked, categories_failed, fetched,
                persisted, filtered_out, published, errors, elapsed_ms, completed
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(stats.categories_checked as i64)
        .bind(stats.categories_failed as i64)
        .bind(stats.fetched as i64)
        .bind(stats.persisted as i64)
        .bind(stats.filtered_out as i64)
        .bind(stats.published as i64)
        .bind(stats.errors as i64)
        .bind(stats.elapsed_ms as i64)
        .bind(stats.completed as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
