//! Engine settings and config file resolution
//!
//! Settings are persisted by whoever embeds the engine; here they are just
//! plain values with defaults, loadable from a TOML file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sink used when nothing else is configured
pub const DEFAULT_SINK: &str = "autoaudiosink";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CADENZA_CONFIG";

/// Number of equalizer bands
pub const EQUALIZER_BANDS: usize = 10;

/// Ceiling for fade, preload and polling durations (ten minutes)
pub const MAX_DURATION_MS: u64 = 600_000;

/// Sinks that accept a free-form, user-editable device string
const DEVICE_CAPABLE_SINKS: [&str; 3] = ["alsasink", "osssink", "pulsesink"];

/// Whether the named output sink accepts a user-editable device string
pub fn sink_supports_device(sink: &str) -> bool {
    DEVICE_CAPABLE_SINKS.contains(&sink)
}

/// Output sink and device selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub sink: String,
    /// Device name; empty selects the sink's default device
    pub device: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            sink: DEFAULT_SINK.to_string(),
            device: String::new(),
        }
    }
}

/// Which replay gain tag set to honour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayGainMode {
    #[default]
    Track,
    Album,
}

/// Replay gain parameters handed to every new pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayGainSettings {
    pub enabled: bool,
    pub mode: ReplayGainMode,
    /// Pre-amplification in dB
    pub preamp: f64,
    /// Apply a limiter to avoid clipping
    pub compression: bool,
}

impl Default for ReplayGainSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ReplayGainMode::Track,
            preamp: 0.0,
            compression: true,
        }
    }
}

/// Equalizer state restored at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerSettings {
    pub enabled: bool,
    pub preamp: i32,
    pub band_gains: Vec<i32>,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            preamp: 0,
            band_gains: vec![0; EQUALIZER_BANDS],
        }
    }
}

/// Engine-wide settings snapshot
///
/// Cached by the engine at construction and on reload; pipelines that
/// already exist keep the values they were created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Crossfade on manual track changes
    pub crossfade_enabled: bool,
    /// Crossfade on automatic track changes (playlist advance)
    pub autocrossfade_enabled: bool,
    /// Fade out instead of cutting off on stop
    pub fadeout_enabled: bool,
    /// Duration of every fade-in/fade-out
    pub fadeout_duration_ms: u64,
    /// Main volume, 0-100 (linear, as shown to the user)
    pub volume: u8,
    /// Fixed volume for background streams, 0-100
    pub background_volume: u8,
    /// Period of the position-polling timer
    pub poll_interval_ms: u64,
    /// Lead time for gapless preloading when not crossfading
    pub preload_gap_ms: u64,
    /// Upper bound on redirects followed by a single play request
    pub max_redirects: u32,

    pub output: OutputSettings,
    pub replay_gain: ReplayGainSettings,
    pub equalizer: EqualizerSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            crossfade_enabled: false,
            autocrossfade_enabled: false,
            fadeout_enabled: false,
            fadeout_duration_ms: 2000,
            volume: 100,
            background_volume: 30,
            poll_interval_ms: 500,
            preload_gap_ms: 1000,
            max_redirects: 16,
            output: OutputSettings::default(),
            replay_gain: ReplayGainSettings::default(),
            equalizer: EqualizerSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from TOML text; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: EngineSettings = toml::from_str(content)?;
        Ok(settings.validated())
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading engine settings from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file and load it, or fall back to defaults
    ///
    /// See [`resolve_config_path`] for the lookup order. An explicitly
    /// named file that fails to load is an error; no file at all is not.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) => Self::load(&path).map_err(|e| {
                Error::Config(format!("Failed to load {}: {}", path.display(), e))
            }),
            None => {
                debug!("No config file found, using default engine settings");
                Ok(Self::default())
            }
        }
    }

    /// Normalise out-of-range or contradictory values
    pub fn validated(mut self) -> Self {
        if self.volume > 100 {
            warn!("Volume {} out of range, clamping to 100", self.volume);
            self.volume = 100;
        }
        if self.background_volume > 100 {
            warn!(
                "Background volume {} out of range, clamping to 100",
                self.background_volume
            );
            self.background_volume = 100;
        }
        if !self.output.device.is_empty() && !sink_supports_device(&self.output.sink) {
            warn!(
                "Sink '{}' does not take a device name, ignoring device '{}'",
                self.output.sink, self.output.device
            );
            self.output.device.clear();
        }
        if self.output.sink.is_empty() {
            self.output.sink = DEFAULT_SINK.to_string();
        }
        for (name, value) in [
            ("Fadeout duration", &mut self.fadeout_duration_ms),
            ("Preload gap", &mut self.preload_gap_ms),
            ("Poll interval", &mut self.poll_interval_ms),
        ] {
            if *value > MAX_DURATION_MS {
                warn!(
                    "{} {}ms out of range, clamping to {}ms",
                    name, value, MAX_DURATION_MS
                );
                *value = MAX_DURATION_MS;
            }
        }
        if self.fadeout_duration_ms == 0
            && (self.crossfade_enabled || self.autocrossfade_enabled || self.fadeout_enabled)
        {
            warn!("Fadeout duration is 0ms, disabling crossfade and fadeout");
            self.crossfade_enabled = false;
            self.autocrossfade_enabled = false;
            self.fadeout_enabled = false;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = EngineSettings::default().poll_interval_ms;
        }
        self
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<user config dir>/cadenza/config.toml`, if it exists
///
/// Returns `None` when no file applies, meaning built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_file().filter(|path| path.exists())
}

/// Per-user config file location for the platform
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadenza").join("config.toml"))
}
