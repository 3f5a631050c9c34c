//! Every environment/configuration knob enumerated in spec §6, collected in one place
//! and loaded from the environment the way the teacher's `main.rs` reads `RUST_LOG`,
//! `DB` and `SENTRY_DSN` — string lookups with documented defaults, no config-file
//! parser, since the teacher doesn't carry one either.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Ed25519,
    P256,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requester_limit: u32,
    pub requester_window: Duration,
    pub target_limit: u32,
    pub target_window: Duration,
    pub ip_limit: u32,
    pub ip_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requester_limit: 10,
            requester_window: Duration::from_secs(60),
            target_limit: 50,
            target_window: Duration::from_secs(60),
            ip_limit: 100,
            ip_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub rate_limit: RateLimitConfig,
    pub sealed_sender_max_invalid_per_hour: u32,
    pub signed_prekey_ttl: Duration,
    pub one_time_prekey_ttl: Duration,
    pub sealed_sender_key_ttl: Duration,
    pub transparency_epoch_interval: Duration,
    pub transparency_signing_algorithm: SigningAlgorithm,
    pub otk_low_threshold: u32,
    pub otk_batch_size: u32,
    pub padding_block_sizes: [usize; 5],
    pub timestamp_bucket_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            sealed_sender_max_invalid_per_hour: 10,
            signed_prekey_ttl: Duration::from_secs(7 * 24 * 3600),
            one_time_prekey_ttl: Duration::from_secs(30 * 24 * 3600),
            sealed_sender_key_ttl: Duration::from_secs(30 * 24 * 3600),
            transparency_epoch_interval: Duration::from_secs(60),
            transparency_signing_algorithm: SigningAlgorithm::Ed25519,
            otk_low_threshold: 25,
            otk_batch_size: 100,
            padding_block_sizes: protocol::padding::BLOCK_SIZES,
            timestamp_bucket_ms: protocol::sealed::TIMESTAMP_BUCKET_MS,
        }
    }
}

impl DirectoryConfig {
    /// Overlay environment variables on top of the defaults. Unset/unparsable variables
    /// silently keep the default, matching the teacher's `RUST_LOG` fallback posture.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u32("RATE_LIMIT_REQUESTER_PER_MIN") {
            cfg.rate_limit.requester_limit = v;
        }
        if let Some(v) = env_u32("RATE_LIMIT_TARGET_PER_MIN") {
            cfg.rate_limit.target_limit = v;
        }
        if let Some(v) = env_u32("RATE_LIMIT_IP_PER_MIN") {
            cfg.rate_limit.ip_limit = v;
        }
        if let Some(v) = env_u32("SEALED_SENDER_MAX_INVALID_PER_HOUR") {
            cfg.sealed_sender_max_invalid_per_hour = v;
        }
        if let Some(v) = env_u32("TRANSPARENCY_EPOCH_INTERVAL_SECS") {
            cfg.transparency_epoch_interval = Duration::from_secs(v as u64);
        }
        if let Ok(v) = std::env::var("TRANSPARENCY_SIGNING_ALGORITHM") {
            cfg.transparency_signing_algorithm = match v.to_ascii_lowercase().as_str() {
                "p256" => SigningAlgorithm::P256,
                _ => SigningAlgorithm::Ed25519,
            };
        }
        if let Some(v) = env_u32("OTK_LOW_THRESHOLD") {
            cfg.otk_low_threshold = v;
        }
        if let Some(v) = env_u32("OTK_BATCH_SIZE") {
            cfg.otk_batch_size = v;
        }

        cfg
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
