//! Engine configuration
//!
//! All tunables for buffering, retry, timers and fades live here. The
//! configuration is loaded once (from a TOML file or built in code) and
//! shared by reference; nothing mutates it at runtime.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Network and buffering policy applied to every stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferingConfig {
    /// Seconds of decoded audio to hold before a stalled stream resumes.
    pub min_buffer_secs: u64,

    /// Upper bound on buffered audio; decoding pauses once reached.
    pub max_buffer_secs: u64,

    /// Seconds of audio required before initial playback starts.
    pub pre_roll_secs: u64,

    /// Seconds of audio required to come back from a mid-stream stall.
    pub post_rebuffer_secs: u64,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Timeout for reading a response in seconds.
    pub read_timeout_secs: u64,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Maximum HTTP redirects to follow before giving up.
    pub max_redirects: u32,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            min_buffer_secs: 10,
            max_buffer_secs: 60,
            pre_roll_secs: 10,
            post_rebuffer_secs: 5,
            connect_timeout_secs: 15,
            read_timeout_secs: 15,
            user_agent: format!("lull-player/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 8,
        }
    }
}

impl BufferingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.min_buffer_secs == 0 || self.max_buffer_secs == 0 {
            return Err(Error::Config(
                "buffer thresholds must be non-zero".to_string(),
            ));
        }
        if self.min_buffer_secs > self.max_buffer_secs {
            return Err(Error::Config(format!(
                "min_buffer_secs ({}) exceeds max_buffer_secs ({})",
                self.min_buffer_secs, self.max_buffer_secs
            )));
        }
        if self.pre_roll_secs > self.max_buffer_secs {
            return Err(Error::Config(format!(
                "pre_roll_secs ({}) exceeds max_buffer_secs ({})",
                self.pre_roll_secs, self.max_buffer_secs
            )));
        }
        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Buffering and network policy.
    pub buffering: BufferingConfig,

    /// Silent fallback attempts before surfacing an error.
    pub max_retries: u32,

    /// Progress publication period in milliseconds.
    pub progress_interval_ms: u64,

    /// Buffer-fill sampling period while a stream is loading.
    pub buffering_sample_interval_ms: u64,

    /// Sleep timer countdown granularity in seconds.
    pub sleep_tick_secs: u64,

    /// Number of volume steps in the sleep timer fade-out.
    pub fade_steps: u32,

    /// Delay between fade-out steps in milliseconds.
    pub fade_step_ms: u64,

    /// Output volume applied when asked to duck for another audio source.
    pub duck_volume: f32,

    /// Default relative seek distance in milliseconds.
    pub seek_step_ms: u64,

    /// Capacity of the broadcast event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffering: BufferingConfig::default(),
            max_retries: 2,
            progress_interval_ms: 500,
            buffering_sample_interval_ms: 200,
            sleep_tick_secs: 60,
            fade_steps: 20,
            fade_step_ms: 100,
            duck_volume: 0.3,
            seek_step_ms: 10_000,
            event_capacity: 100,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing keys fall back to
    /// their defaults, so a partial file is fine.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn buffering_sample_interval(&self) -> Duration {
        Duration::from_millis(self.buffering_sample_interval_ms)
    }

    pub fn sleep_tick(&self) -> Duration {
        Duration::from_secs(self.sleep_tick_secs)
    }

    pub fn fade_step(&self) -> Duration {
        Duration::from_millis(self.fade_step_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.buffering.validate()?;
        if self.fade_steps == 0 {
            return Err(Error::Config("fade_steps must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.duck_volume) {
            return Err(Error::Config(format!(
                "duck_volume {} outside [0.0, 1.0]",
                self.duck_volume
            )));
        }
        if self.progress_interval_ms == 0 || self.buffering_sample_interval_ms == 0 {
            return Err(Error::Config(
                "sampling intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffering.min_buffer_secs, 10);
        assert_eq!(config.buffering.max_buffer_secs, 60);
        assert_eq!(config.buffering.pre_roll_secs, 10);
        assert_eq!(config.buffering.post_rebuffer_secs, 5);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.fade_steps, 20);
        assert_eq!(config.fade_step_ms, 100);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            max_retries = 3

            [buffering]
            pre_roll_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.buffering.pre_roll_secs, 5);
        assert_eq!(config.buffering.max_buffer_secs, 60);
        assert_eq!(config.progress_interval_ms, 500);
    }

    #[test]
    fn rejects_inverted_buffer_bounds() {
        let mut config = EngineConfig::default();
        config.buffering.min_buffer_secs = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_duck_volume() {
        let mut config = EngineConfig::default();
        config.duck_volume = 1.5;
        assert!(config.validate().is_err());
    }
}
