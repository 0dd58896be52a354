//! Process-wide tunable knobs for the analyzer core.
//!
//! Mirrors the resolution order used by the teacher crate's own `config`
//! module: in-memory defaults, overridden by an optional settings file in
//! the working directory, overridden last by environment variables.
//! `Config::reload()` re-runs this resolution so long-running embedders can
//! pick up changes without restarting.

use lazy_static::lazy_static;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

const DEFAULT_GROWTH_INCREMENT: usize = 500 * 1024;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Analyzer settings. Cloneable and cheap; a `Demuxer` reads one at
/// construction time and does not watch it afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte increment an elementary accumulator grows by when full.
    pub accumulator_growth_increment: usize,
    /// When true, per-packet detail is omitted from the XML output and only
    /// PSI/frame-level summaries are emitted.
    pub terse: bool,
    /// When true, the MPEG-2 video / AVC codec parsers run on accumulated
    /// elementary-stream payloads; when false, only PES headers are parsed.
    pub analyze_elementary_stream: bool,
}

impl Config {
    fn new() -> Self {
        let mut config = Config {
            accumulator_growth_increment: DEFAULT_GROWTH_INCREMENT,
            terse: true,
            analyze_elementary_stream: false,
        };

        for path in ["./mpts_probe.toml"] {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    apply_file_contents(&mut config, &content);
                }
            }
        }

        if let Ok(val) = env::var("MPTS_PROBE_TERSE") {
            config.terse = parse_bool(&val, config.terse);
        }
        if let Ok(val) = env::var("MPTS_PROBE_ANALYZE_ES") {
            config.analyze_elementary_stream = parse_bool(&val, config.analyze_elementary_stream);
        }
        if let Ok(val) = env::var("MPTS_PROBE_GROWTH_INCREMENT") {
            if let Ok(n) = val.trim().parse::<usize>() {
                config.accumulator_growth_increment = n;
            }
        }

        config
    }

    /// Re-reads the settings file and environment, replacing the
    /// process-wide configuration in place.
    pub fn reload() {
        let new_config = Config::new();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }

    /// Returns a snapshot of the current process-wide configuration.
    pub fn current() -> Config {
        CONFIG.read().unwrap().clone()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

fn parse_bool(val: &str, fallback: bool) -> bool {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}

fn apply_file_contents(config: &mut Config, content: &str) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key {
            "terse" => config.terse = parse_bool(value, config.terse),
            "analyze_elementary_stream" => {
                config.analyze_elementary_stream = parse_bool(value, config.analyze_elementary_stream)
            }
            "accumulator_growth_increment" => {
                if let Ok(n) = value.parse::<usize>() {
                    config.accumulator_growth_increment = n;
                }
            }
            _ => {}
        }
    }
}

/// Creates a default settings file template if it doesn't exist.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# mpts-probe configuration
# This is a template. Replace the values with your actual configuration.

terse = true
analyze_elementary_stream = false
accumulator_growth_increment = 512000
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}
