// kavach/src/config.rs
//
// Environment-driven runtime configuration.
//
// Every external collaborator (LLM provider, ML probability service, Redis,
// callback sink) is optional: a missing variable disables that collaborator
// and the pipeline degrades to rule-only operation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// The ML client never waits longer than this regardless of configuration.
pub const ML_TIMEOUT_CAP_MS: u64 = 180;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared secret expected in `x-api-key`. Empty → auth disabled (dev mode).
    pub api_key: String,

    // LLM provider (OpenAI-compatible chat completions)
    pub llm_api_key:  Option<String>,
    pub llm_base_url: String,
    pub llm_model:    String,
    pub llm_timeout:  Duration,

    // ML probability service
    pub ml_url:        Option<String>,
    pub ml_timeout_ms: u64,

    // Persistence
    pub redis_url: Option<String>,

    // Honeypot engine
    pub session_timeout_mins:      i64,
    pub scam_threshold:            f32,
    pub min_messages_for_callback: usize,
    pub callback_url:              Option<String>,

    pub bind:       SocketAddr,
    pub output_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let api_key = env_or("KAVACH_API_KEY", "");
        if api_key.is_empty() {
            warn!("KAVACH_API_KEY not set — API authentication disabled");
        }

        let ml_timeout_ms = env_or("ML_TIMEOUT_MS", "150")
            .parse::<u64>()
            .unwrap_or(150)
            .min(ML_TIMEOUT_CAP_MS);

        let port: u16 = env_or("PORT", "4000").parse().unwrap_or(4000);

        Self {
            api_key,
            llm_api_key:  env_opt("LLM_API_KEY"),
            llm_base_url: env_or("LLM_BASE_URL", "https://api.openai.com/v1"),
            llm_model:    env_or("LLM_MODEL", "gpt-4o-mini"),
            llm_timeout:  Duration::from_secs(
                env_or("LLM_TIMEOUT_SECS", "6").parse().unwrap_or(6),
            ),
            ml_url:        env_opt("ML_API_URL"),
            ml_timeout_ms,
            redis_url:     env_opt("REDIS_URL"),
            session_timeout_mins: env_or("SESSION_TIMEOUT_MINUTES", "30")
                .parse().unwrap_or(30),
            scam_threshold: env_or("SCAM_THRESHOLD", "0.4").parse().unwrap_or(0.4),
            min_messages_for_callback: env_or("MIN_MESSAGES_FOR_CALLBACK", "3")
                .parse().unwrap_or(3),
            callback_url:  env_opt("CALLBACK_URL"),
            bind:          SocketAddr::from(([0, 0, 0, 0], port)),
            output_dir:    PathBuf::from(env_or("OUTPUT_DIR", "/tmp/kavach_output")),
        }
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn llm_configured(&self) -> bool {
        self.llm_api_key.as_deref().map(|k| !k.is_empty()).unwrap_or(false)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ml_timeout_is_capped() {
        std::env::set_var("ML_TIMEOUT_MS", "5000");
        let s = Settings::from_env();
        assert_eq!(s.ml_timeout_ms, ML_TIMEOUT_CAP_MS);
        std::env::remove_var("ML_TIMEOUT_MS");
    }

    #[test]
    fn defaults_hold_without_env() {
        std::env::remove_var("SCAM_THRESHOLD");
        std::env::remove_var("SESSION_TIMEOUT_MINUTES");
        let s = Settings::from_env();
        assert!((s.scam_threshold - 0.4).abs() < f32::EPSILON);
        assert_eq!(s.session_timeout_mins, 30);
        assert_eq!(s.min_messages_for_callback, 3);
    }
}
