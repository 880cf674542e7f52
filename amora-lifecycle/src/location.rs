use amora_shared::clients::redis::RedisClient;
use redis::Script;
use uuid::Uuid;

use crate::geo::LocationReport;

const LOCATION_PREFIX: &str = "lifecycle:location";

/// Newest-wins write. KEYS: report, capture stamp. ARGV: capture millis,
/// report json, ttl secs. Returns 1 when stored.
const RECORD_SCRIPT: &str = r#"
local stamp = redis.call('GET', KEYS[2])
if stamp and tonumber(stamp) >= tonumber(ARGV[1]) then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
redis.call('SET', KEYS[2], ARGV[1], 'EX', ARGV[3])
return 1
"#;

fn location_key(user_id: &Uuid) -> String {
    format!("{LOCATION_PREFIX}:{user_id}")
}

fn stamp_key(user_id: &Uuid) -> String {
    format!("{LOCATION_PREFIX}:{user_id}:captured")
}

fn record_args(report: &LocationReport, ttl_secs: u64) -> Result<Vec<String>, serde_json::Error> {
    Ok(vec![
        report.captured_at.timestamp_millis().to_string(),
        serde_json::to_string(report)?,
        ttl_secs.to_string(),
    ])
}

/// Latest location report per user, expiring after `ttl_secs` of silence.
#[derive(Clone)]
pub struct LocationCache {
    redis: RedisClient,
    ttl_secs: u64,
    script: Script,
}

impl LocationCache {
    pub fn new(redis: RedisClient, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs, script: Script::new(RECORD_SCRIPT) }
    }

    /// Reports for the given users, skipping anyone without a stored report.
    pub async fn latest_for(&self, user_ids: &[Uuid]) -> Vec<LocationReport> {
        let keys: Vec<String> = user_ids.iter().map(location_key).collect();
        match self.redis.mget(&keys).await {
            Ok(values) => values
                .into_iter()
                .flatten()
                .filter_map(|data| serde_json::from_str(&data).ok())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read location reports");
                Vec::new()
            }
        }
    }

    /// Returns false when a report captured at the same time or later is
    /// already stored.
    pub async fn record(&self, report: &LocationReport) -> Result<bool, redis::RedisError> {
        let args = record_args(report, self.ttl_secs).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "serialize location", e.to_string()))
        })?;
        let keys = [location_key(&report.user_id), stamp_key(&report.user_id)];
        let stored: i64 = self.redis.run_script(&self.script, &keys, &args).await?;
        if stored == 0 {
            tracing::debug!(user_id = %report.user_id, "ignoring out-of-order location report");
        }
        Ok(stored == 1)
    }
}
