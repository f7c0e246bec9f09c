//! Producer and consumer descriptors, and the JSON run configuration.
//!
//! Descriptors are plain values. A task takes its descriptor by value when it
//! is built, so nothing can change a task's configuration once it runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use framepipe_channel::EndpointConfig;
use framepipe_frame::{required_capacity, Pattern, MIN_FRAME_LEN};

/// Trigger mode stamped into synthetic hits when none is configured.
pub const DEFAULT_TRIGGER_MODE: i32 = 2;

/// Errors raised while loading or validating a run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config defines no producer/consumer pairs")]
    NoPairs,

    #[error("pair {pair}: invalid {field}: {reason}")]
    InvalidField {
        pair: usize,
        field: &'static str,
        reason: String,
    },

    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
}

/// When a producer stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunBound {
    /// Stop after this many frames.
    Count(u64),
    /// Stop once this much time has passed since the first step.
    Duration(#[serde(with = "duration_str")] Duration),
    /// Run until the source is exhausted or the run is cancelled.
    #[default]
    Unbounded,
}

/// Where a producer's frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadKind {
    /// Frames whose body is filled with a fixed pattern.
    Pattern {
        #[serde(default)]
        pattern: Pattern,
        body_len: usize,
    },
    /// Synthetic hit records.
    Hit,
    /// Length-prefixed records replayed from a file.
    File { path: PathBuf },
}

impl PayloadKind {
    pub fn is_file(&self) -> bool {
        matches!(self, PayloadKind::File { .. })
    }
}

/// Immutable producer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_id: u32,
    /// Pauses per second when pacing; `0` disables pacing.
    #[serde(default)]
    pub rate: f64,
    /// Records per pacing burst, and the DOM id range for hits.
    #[serde(default)]
    pub num_doms: u32,
    #[serde(default = "default_trigger_mode")]
    pub trigger_mode: i32,
    #[serde(default)]
    pub bound: RunBound,
    pub payload: PayloadKind,
    /// Seed for random bodies and hits. Unseeded runs draw from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_trigger_mode() -> i32 {
    DEFAULT_TRIGGER_MODE
}

impl SourceDescriptor {
    /// Pause inserted after every `num_doms` records, if pacing is enabled.
    pub fn pacing_interval(&self) -> Option<Duration> {
        if self.num_doms == 0 || self.rate <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.rate).ok()
    }

    fn validate(&self, pair: usize, endpoint: &EndpointConfig) -> Result<(), ConfigError> {
        let invalid = |field, reason: String| ConfigError::InvalidField {
            pair,
            field,
            reason,
        };

        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(invalid("rate", format!("{} is not a non-negative number", self.rate)));
        }
        if self.num_doms > 0 && self.rate > 0.0 && self.pacing_interval().is_none() {
            return Err(invalid(
                "rate",
                format!("{} gives a pause too long to represent", self.rate),
            ));
        }
        match self.bound {
            RunBound::Count(0) => return Err(invalid("bound", "count must be greater than zero".into())),
            RunBound::Duration(d) if d.is_zero() => {
                return Err(invalid("bound", "duration must be greater than zero".into()))
            }
            RunBound::Duration(d) if std::time::Instant::now().checked_add(d).is_none() => {
                return Err(invalid("bound", format!("duration {d:?} is too long")))
            }
            _ => {}
        }
        match &self.payload {
            PayloadKind::Pattern { body_len, .. } => {
                let frame_len = required_capacity(*body_len);
                if frame_len > endpoint.max_frame_len || frame_len > i32::MAX as usize {
                    return Err(invalid(
                        "body_len",
                        format!(
                            "{body_len}-byte body needs a {frame_len}-byte frame (max {})",
                            endpoint.max_frame_len
                        ),
                    ));
                }
            }
            PayloadKind::Hit => {
                if self.num_doms == 0 {
                    return Err(invalid("num_doms", "hit payloads need at least one DOM".into()));
                }
            }
            PayloadKind::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(invalid("payload.path", "must not be empty".into()));
                }
            }
        }
        Ok(())
    }
}

/// What a consumer does with each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkKind {
    /// Append raw frame bytes to a file.
    File { path: PathBuf },
    /// Drop frames, optionally waiting after each one.
    Discard {
        #[serde(default, with = "duration_str")]
        delay: Duration,
    },
}

/// Immutable consumer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkDescriptor {
    #[serde(flatten)]
    pub kind: SinkKind,
    /// Check every body against its declared pattern.
    #[serde(default)]
    pub verify: bool,
}

impl Default for SinkDescriptor {
    fn default() -> Self {
        Self {
            kind: SinkKind::Discard {
                delay: Duration::ZERO,
            },
            verify: false,
        }
    }
}

/// One producer feeding one consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub source: SourceDescriptor,
    #[serde(default)]
    pub sink: SinkDescriptor,
}

impl PairConfig {
    /// Check one pair against the endpoint limits it will run under.
    pub fn validate(&self, pair: usize, endpoint: &EndpointConfig) -> Result<(), ConfigError> {
        self.source.validate(pair, endpoint)?;
        if let SinkKind::File { path } = &self.sink.kind {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidField {
                    pair,
                    field: "sink.path",
                    reason: "must not be empty".into(),
                });
            }
        }
        if self.sink.verify && matches!(self.source.payload, PayloadKind::Hit) {
            return Err(ConfigError::InvalidField {
                pair,
                field: "sink.verify",
                reason: "hit bodies carry no fill pattern".into(),
            });
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let PayloadKind::File { path } = &mut self.source.payload {
            *path = resolve(base, path);
        }
        if let SinkKind::File { path } = &mut self.sink.kind {
            *path = resolve(base, path);
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// A complete run: shared endpoint tunables plus every pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    pub pairs: Vec<PairConfig>,
}

impl HarnessConfig {
    /// Parse a configuration from JSON text.
    ///
    /// Only whole-config problems fail here. Pairs are validated one by one
    /// when the harness is built, so a bad pair does not stop its siblings.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = serde_json::from_str(input)?;
        config.check_endpoint()?;
        if config.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        Ok(config)
    }

    /// Load a configuration file. Relative payload and sink paths are taken
    /// relative to the file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&text)?;
        if let Some(base) = path.parent() {
            for pair in &mut config.pairs {
                pair.resolve_paths(base);
            }
        }
        Ok(config)
    }

    fn check_endpoint(&self) -> Result<(), ConfigError> {
        let endpoint = &self.endpoint;
        if endpoint.pipe_capacity == 0 {
            return Err(ConfigError::InvalidArgument {
                field: "endpoint.pipe_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if endpoint.max_frame_len < MIN_FRAME_LEN {
            return Err(ConfigError::InvalidArgument {
                field: "endpoint.max_frame_len",
                reason: format!("must be at least {MIN_FRAME_LEN}"),
            });
        }
        Ok(())
    }
}

/// Parse `"5s"`, `"500ms"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    let invalid = |reason: String| ConfigError::InvalidArgument {
        field: "duration",
        reason,
    };
    if input.is_empty() {
        return Err(invalid("must not be empty".into()));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| invalid(format!("invalid duration value: {input}")))?;

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

pub(crate) mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "endpoint": { "pipe_capacity": 4096 },
        "pairs": [
            {
                "source": {
                    "source_id": 4000,
                    "bound": { "count": 5 },
                    "payload": { "kind": "pattern", "pattern": "incrementing", "body_len": 300 },
                    "seed": 7
                },
                "sink": { "kind": "file", "path": "out/4000.dat", "verify": true }
            },
            {
                "source": {
                    "source_id": 4001,
                    "rate": 2.0,
                    "num_doms": 60,
                    "bound": { "duration": "500ms" },
                    "payload": { "kind": "hit" }
                },
                "sink": { "kind": "discard", "delay": "1ms" }
            },
            {
                "source": {
                    "source_id": 4002,
                    "payload": { "kind": "file", "path": "records.dat" }
                }
            }
        ]
    }"#;

    #[test]
    fn parses_sample_config() {
        let cfg = HarnessConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(cfg.endpoint.pipe_capacity, 4096);
        assert_eq!(cfg.endpoint.default_buffer_capacity, 32_000);
        assert_eq!(cfg.pairs.len(), 3);

        let first = &cfg.pairs[0];
        assert_eq!(first.source.bound, RunBound::Count(5));
        assert_eq!(
            first.source.payload,
            PayloadKind::Pattern {
                pattern: Pattern::Incrementing,
                body_len: 300
            }
        );
        assert_eq!(first.source.trigger_mode, DEFAULT_TRIGGER_MODE);
        assert!(first.sink.verify);

        let second = &cfg.pairs[1];
        assert_eq!(second.source.bound, RunBound::Duration(Duration::from_millis(500)));
        assert_eq!(
            second.sink.kind,
            SinkKind::Discard {
                delay: Duration::from_millis(1)
            }
        );
        assert_eq!(second.source.pacing_interval(), Some(Duration::from_millis(500)));

        let third = &cfg.pairs[2];
        assert_eq!(third.source.bound, RunBound::Unbounded);
        assert_eq!(third.sink, SinkDescriptor::default());
        assert!(third.source.payload.is_file());

        for (i, pair) in cfg.pairs.iter().enumerate() {
            pair.validate(i, &cfg.endpoint).unwrap();
        }
    }

    #[test]
    fn empty_pairs_rejected() {
        let err = HarnessConfig::from_json_str(r#"{"pairs": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::NoPairs));
    }

    #[test]
    fn malformed_json_rejected() {
        let err = HarnessConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_pipe_capacity_rejected() {
        let err = HarnessConfig::from_json_str(
            r#"{"endpoint": {"pipe_capacity": 0}, "pairs": []}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidArgument {
                field: "endpoint.pipe_capacity",
                ..
            }
        ));
    }

    fn pattern_pair(bound: RunBound, body_len: usize) -> PairConfig {
        PairConfig {
            source: SourceDescriptor {
                source_id: 1,
                rate: 0.0,
                num_doms: 0,
                trigger_mode: DEFAULT_TRIGGER_MODE,
                bound,
                payload: PayloadKind::Pattern {
                    pattern: Pattern::Zero,
                    body_len,
                },
                seed: None,
            },
            sink: SinkDescriptor::default(),
        }
    }

    #[test]
    fn zero_count_rejected() {
        let err = pattern_pair(RunBound::Count(0), 10)
            .validate(3, &EndpointConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                pair: 3,
                field: "bound",
                ..
            }
        ));
    }

    #[test]
    fn body_larger_than_max_frame_rejected() {
        let endpoint = EndpointConfig {
            max_frame_len: 100,
            ..EndpointConfig::default()
        };
        assert!(pattern_pair(RunBound::Count(1), 56).validate(0, &endpoint).is_ok());
        let err = pattern_pair(RunBound::Count(1), 57)
            .validate(0, &endpoint)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "body_len", .. }));
    }

    #[test]
    fn negative_rate_rejected() {
        let mut pair = pattern_pair(RunBound::Count(1), 10);
        pair.source.rate = -1.0;
        let err = pair.validate(0, &EndpointConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "rate", .. }));
    }

    #[test]
    fn unrepresentable_pacing_rejected() {
        let mut pair = pattern_pair(RunBound::Count(1), 10);
        pair.source.rate = 1e-30;
        pair.source.num_doms = 1;
        assert_eq!(pair.source.pacing_interval(), None);
        let err = pair.validate(0, &EndpointConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "rate", .. }));

        pair.source.num_doms = 0;
        pair.validate(0, &EndpointConfig::default()).unwrap();
    }

    #[test]
    fn duration_past_the_clock_rejected() {
        let json = r#"{
            "pairs": [{
                "source": {
                    "source_id": 1,
                    "bound": { "duration": "18446744073709551615s" },
                    "payload": { "kind": "pattern", "body_len": 8 }
                }
            }]
        }"#;
        let cfg = HarnessConfig::from_json_str(json).unwrap();
        let err = cfg.pairs[0]
            .validate(0, &EndpointConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "bound", .. }));
    }

    #[test]
    fn hit_payload_needs_doms_and_no_verify() {
        let mut pair = pattern_pair(RunBound::Count(1), 10);
        pair.source.payload = PayloadKind::Hit;
        let err = pair.validate(0, &EndpointConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "num_doms", .. }));

        pair.source.num_doms = 4;
        pair.sink.verify = true;
        let err = pair.validate(0, &EndpointConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { field: "sink.verify", .. }));
    }

    #[test]
    fn pacing_needs_rate_and_doms() {
        let mut pair = pattern_pair(RunBound::Count(1), 10);
        assert_eq!(pair.source.pacing_interval(), None);
        pair.source.rate = 4.0;
        assert_eq!(pair.source.pacing_interval(), None);
        pair.source.num_doms = 3;
        assert_eq!(pair.source.pacing_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut cfg = HarnessConfig::from_json_str(SAMPLE).unwrap();
        for pair in &mut cfg.pairs {
            pair.resolve_paths(Path::new("/data/run"));
        }
        assert_eq!(
            cfg.pairs[0].sink.kind,
            SinkKind::File {
                path: PathBuf::from("/data/run/out/4000.dat")
            }
        );
        assert_eq!(
            cfg.pairs[2].source.payload,
            PayloadKind::File {
                path: PathBuf::from("/data/run/records.dat")
            }
        );
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0ms").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
