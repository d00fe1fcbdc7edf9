/// Beacon API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Name of the default broadcast connection ("poll", "redis", "log", "null").
    pub default_connection: String,
    /// Redis connection string (redis broadcaster, redis KV/lock stores).
    pub redis_url: String,
    /// Backend for the session/socket key-value store: "memory" or "redis".
    pub kv_driver: String,
    /// Prefix prepended to channel names published to Redis.
    pub redis_channel_prefix: String,
    /// How long persisted poll events are retained before the sweeper drops them.
    pub poll_retention_secs: u64,
    /// Per-channel cap on persisted poll events (oldest evicted first).
    pub poll_max_per_channel: usize,
    /// Presence members not touched within this window are swept out.
    pub presence_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a development default; production deployments set
    /// them explicitly.
    pub fn from_env() -> Self {
        Self {
            port: var_or("PORT", 4010),
            default_connection: std::env::var("BROADCAST_CONNECTION")
                .unwrap_or_else(|_| "poll".to_string()),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            kv_driver: std::env::var("KV_DRIVER").unwrap_or_else(|_| "memory".to_string()),
            redis_channel_prefix: std::env::var("REDIS_CHANNEL_PREFIX")
                .unwrap_or_else(|_| "beacon:".to_string()),
            poll_retention_secs: var_or("POLL_RETENTION_SECS", 600),
            poll_max_per_channel: var_or("POLL_MAX_EVENTS_PER_CHANNEL", 1000),
            presence_ttl_secs: var_or("PRESENCE_TTL_SECS", 60),
        }
    }
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
