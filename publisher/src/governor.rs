use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Posts allowed within one clock hour.
    pub max_posts_per_hour: u32,
    /// Minimum spacing between consecutive posts.
    pub min_post_interval: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_posts_per_hour: 10,
            min_post_interval: Duration::seconds(300),
        }
    }
}

/// Outbound posting throttle. All methods take `&mut self`; callers share
/// one governor behind a single lock so a can-publish check and the
/// following record run as one unit.
///
/// The hourly count rolls over on the clock-hour boundary, not a sliding
/// window. Spacing is enforced across rollovers.
#[derive(Debug)]
pub struct PublishGovernor {
    config: GovernorConfig,
    posted_this_hour: u32,
    hour_anchor: DateTime<Utc>,
    last_post_at: Option<DateTime<Utc>>,
}

impl PublishGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            posted_this_hour: 0,
            hour_anchor: Utc::now(),
            last_post_at: None,
        }
    }

    fn roll_hour(&mut self, now: DateTime<Utc>) {
        let same_hour = now.date_naive() == self.hour_anchor.date_naive()
            && now.hour() == self.hour_anchor.hour();
        if !same_hour {
            debug!(
                "hourly posting window rolled over, {} posts last hour",
                self.posted_this_hour
            );
            self.posted_this_hour = 0;
            self.hour_anchor = now;
        }
    }

    /// Whether a post may go out at `now`. Does not record anything.
    pub fn can_publish(&mut self, now: DateTime<Utc>) -> bool {
        self.roll_hour(now);

        if self.posted_this_hour >= self.config.max_posts_per_hour {
            debug!(
                "hourly post cap reached ({}/{})",
                self.posted_this_hour, self.config.max_posts_per_hour
            );
            return false;
        }

        if let Some(last) = self.last_post_at {
            if now - last < self.config.min_post_interval {
                debug!("holding post, {}s since the last one", (now - last).num_seconds());
                return false;
            }
        }

        true
    }

    /// Account for a post that just went out.
    pub fn record_publish(&mut self, now: DateTime<Utc>) {
        self.roll_hour(now);
        self.posted_this_hour += 1;
        self.last_post_at = Some(now);
    }

    /// Daily reset: clears the hourly count. The spacing gate is untouched,
    /// two posts are never allowed closer than the minimum interval even
    /// across a reset.
    pub fn reset_period(&mut self, now: DateTime<Utc>) {
        info!("posting governor reset");
        self.posted_this_hour = 0;
        self.hour_anchor = now;
    }

    pub fn posted_this_hour(&self) -> u32 {
        self.posted_this_hour
    }
}
