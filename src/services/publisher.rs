//! Publisher
//!
//! Posts composed text to the social platform at most once per glitch
//! occurrence:
//! 1. Derive the idempotency key from the event kind and its cycle boundary
//! 2. If the post log already holds that key, return the recorded post
//! 3. Otherwise call the platform (retrying transient failures) with the key
//!    attached, then append the result to the post log

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::adapters::{PostRequest, SocialPlatform};
use crate::clock::Clock;
use crate::domain::{GlitchEvent, GlitchKind, PostRecord};
use crate::error::PublishError;
use crate::persistence::PostLog;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::services::composer::post_title;

/// Start of the cycle containing `at`: floored to a multiple of
/// `cycle_period` since the Unix epoch
pub fn cycle_boundary(at: DateTime<Utc>, cycle_period: Duration) -> DateTime<Utc> {
    let period = cycle_period.as_secs() as i64;
    if period <= 0 {
        return at;
    }
    let floored = at.timestamp().div_euclid(period) * period;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(at)
}

/// Deterministic key for one glitch occurrence
pub fn idempotency_key(kind: GlitchKind, triggered_at: DateTime<Utc>, cycle_period: Duration) -> String {
    let boundary = cycle_boundary(triggered_at, cycle_period);
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(boundary.to_rfc3339().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("gg-{}", &digest[..32])
}

pub struct Publisher {
    platform: Arc<dyn SocialPlatform>,
    log: PostLog,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    cycle_period: Duration,
}

impl Publisher {
    pub fn new(
        platform: Arc<dyn SocialPlatform>,
        log: PostLog,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        cycle_period: Duration,
    ) -> Self {
        Self {
            platform,
            log,
            clock,
            retry,
            cycle_period,
        }
    }

    pub fn post_log(&self) -> &PostLog {
        &self.log
    }

    pub async fn publish(&self, event: &GlitchEvent, text: &str) -> Result<PostRecord, PublishError> {
        let key = idempotency_key(event.kind, event.triggered_at, self.cycle_period);

        if let Some(existing) = self.log.find(&key).await? {
            info!(
                idempotency_key = %key,
                post_id = %existing.platform_post_id,
                "Already published, skipping platform call"
            );
            return Ok(existing);
        }

        let request = PostRequest {
            title: post_title(event.kind),
            content: text.to_string(),
            idempotency_key: key.clone(),
        };

        let post_id = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            "create_post",
            PublishError::is_transient,
            || self.platform.create_post(&request),
        )
        .await?;

        let record = PostRecord {
            event: event.clone(),
            platform_post_id: post_id,
            posted_at: self.clock.now(),
            idempotency_key: key,
        };

        if let Err(e) = self.log.append(&record).await {
            error!(
                idempotency_key = %record.idempotency_key,
                "Post published but not recorded: {}",
                e
            );
        }

        info!(
            kind = %event.kind,
            post_id = %record.platform_post_id,
            idempotency_key = %record.idempotency_key,
            "Posted to Moltbook"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::traits::MockSocialPlatform;
    use crate::clock::ManualClock;
    use crate::domain::MarketSnapshot;
    use rust_decimal_macros::dec;

    const HOUR: Duration = Duration::from_secs(3600);

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn event(triggered_at: DateTime<Utc>) -> GlitchEvent {
        GlitchEvent::new(
            GlitchKind::BullishSqueeze,
            triggered_at,
            MarketSnapshot::new(triggered_at, dec!(4.5), dec!(146)),
            None,
        )
    }

    fn temp_log(name: &str) -> PostLog {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "glitchygopher_publisher_{}_{}",
            name,
            Utc::now().timestamp_nanos_opt().unwrap_or(0)
        ));
        p.push("posts.jsonl");
        PostLog::new(p)
    }

    fn publisher(platform: MockSocialPlatform, log: PostLog, clock: Arc<ManualClock>) -> Publisher {
        Publisher::new(Arc::new(platform), log, clock, RetryPolicy::default(), HOUR)
    }

    #[test]
    fn test_cycle_boundary_floors_to_period() {
        assert_eq!(cycle_boundary(at(9, 47), HOUR), at(9, 0));
        assert_eq!(cycle_boundary(at(9, 0), HOUR), at(9, 0));
        assert_eq!(cycle_boundary(at(9, 47), Duration::from_secs(1800)), at(9, 30));
    }

    #[test]
    fn test_idempotency_key_is_deterministic_per_cycle() {
        let a = idempotency_key(GlitchKind::BullishSqueeze, at(9, 5), HOUR);
        let b = idempotency_key(GlitchKind::BullishSqueeze, at(9, 55), HOUR);
        let next_cycle = idempotency_key(GlitchKind::BullishSqueeze, at(10, 5), HOUR);
        let other_kind = idempotency_key(GlitchKind::PanicIntervention, at(9, 5), HOUR);

        assert_eq!(a, b);
        assert_ne!(a, next_cycle);
        assert_ne!(a, other_kind);
        assert!(a.starts_with("gg-"));
        assert_eq!(a.len(), 35);
    }

    #[tokio::test]
    async fn test_publish_twice_posts_once() {
        let clock = Arc::new(ManualClock::new(at(9, 5)));
        let log = temp_log("twice");
        let log_path = log.path().to_path_buf();

        let mut platform = MockSocialPlatform::new();
        platform
            .expect_create_post()
            .times(1)
            .returning(|_| Ok("post-1".to_string()));
        let publisher = publisher(platform, log, clock);

        let first = publisher.publish(&event(at(9, 5)), "US10Y 4.5%").await.unwrap();
        let second = publisher.publish(&event(at(9, 5)), "US10Y 4.5%").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.platform_post_id, "post-1");
        let records = PostLog::new(log_path).read_all().await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_key_is_sent_to_platform() {
        let clock = Arc::new(ManualClock::new(at(9, 5)));
        let expected_key = idempotency_key(GlitchKind::BullishSqueeze, at(9, 5), HOUR);

        let mut platform = MockSocialPlatform::new();
        platform
            .expect_create_post()
            .withf(move |req| {
                req.idempotency_key == expected_key
                    && req.title == "GlitchyGopher Report: Bullish Squeeze"
                    && req.content == "hello"
            })
            .times(1)
            .returning(|_| Ok("post-2".to_string()));

        let record = publisher(platform, temp_log("key"), clock)
            .publish(&event(at(9, 5)), "hello")
            .await
            .unwrap();
        assert_eq!(record.posted_at, at(9, 5));
    }

    #[tokio::test]
    async fn test_transient_failures_retry_with_backoff() {
        let clock = Arc::new(ManualClock::new(at(9, 5)));
        let mut platform = MockSocialPlatform::new();
        let mut seq = mockall::Sequence::new();
        platform
            .expect_create_post()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(PublishError::Transient("HTTP 503".into())));
        platform
            .expect_create_post()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("post-3".to_string()));

        let record = publisher(platform, temp_log("retry"), clock.clone())
            .publish(&event(at(9, 5)), "text")
            .await
            .unwrap();

        assert_eq!(record.platform_post_id, "post-3");
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_rejection_is_terminal_and_not_logged() {
        let clock = Arc::new(ManualClock::new(at(9, 5)));
        let log = temp_log("rejected");
        let log_path = log.path().to_path_buf();

        let mut platform = MockSocialPlatform::new();
        platform
            .expect_create_post()
            .times(1)
            .returning(|_| Err(PublishError::Rejected("HTTP 422: policy".into())));

        let result = publisher(platform, log, clock)
            .publish(&event(at(9, 5)), "text")
            .await;

        tokio_test::assert_err!(&result);
        assert_eq!(result, Err(PublishError::Rejected("HTTP 422: policy".into())));
        assert!(PostLog::new(log_path).read_all().await.unwrap().is_empty());
    }
}
