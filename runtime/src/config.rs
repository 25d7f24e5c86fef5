//! Loads `[network] speed` / `[cpu] strength` / `[cpu] cores` from an
//! INI-formatted config file, the same on-disk shape as the original
//! implementation's `ConfigParser`-based config.

use std::path::Path;

use scavenger_core::peer::NetClass;

const DEFAULT_NETWORK_SPEED: f64 = 500_000.0;
const DEFAULT_CPU_CORES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file '{path}' is not valid INI: {reason}")]
    Parse { path: String, reason: String },

    #[error("required option '{0}' is missing")]
    MissingRequired(String),

    #[error("option '{section}.{key}' has an invalid value '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// The local host's resolved network/CPU parameters, ready to hand to
/// [`crate::runtime::ScavengerRuntime`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalConfig {
    pub network_speed: f64,
    pub cpu_strength: f64,
    pub cpu_cores: u32,
}

impl LocalConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let ini = ini::Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let network_speed = match ini.get_from(Some("network"), "speed") {
            Some(raw) => parse_speed("network", "speed", raw)?,
            None => DEFAULT_NETWORK_SPEED,
        };

        let cpu_strength = match ini.get_from(Some("cpu"), "strength") {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                section: "cpu".to_string(),
                key: "strength".to_string(),
                value: raw.to_string(),
            })?,
            None => return Err(ConfigError::MissingRequired("cpu.strength".to_string())),
        };

        let cpu_cores = match ini.get_from(Some("cpu"), "cores") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                section: "cpu".to_string(),
                key: "cores".to_string(),
                value: raw.to_string(),
            })?,
            None => DEFAULT_CPU_CORES,
        };

        Ok(LocalConfig {
            network_speed,
            cpu_strength,
            cpu_cores: cpu_cores.max(1),
        })
    }
}

fn parse_speed(section: &str, key: &str, raw: &str) -> Result<f64, ConfigError> {
    let trimmed = raw.trim();
    if let Some(bytes_per_sec) = NetClass::from_name(trimmed) {
        return Ok(bytes_per_sec as f64);
    }
    trimmed.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "scavenger-config-test-{:?}-{}.ini",
            std::thread::current().id(),
            contents.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_numeric_speed_and_required_strength() {
        let path = write_config("[network]\nspeed = 1000000\n[cpu]\nstrength = 3.5\n");
        let cfg = LocalConfig::load(&path).unwrap();
        assert_eq!(cfg.network_speed, 1_000_000.0);
        assert_eq!(cfg.cpu_strength, 3.5);
        assert_eq!(cfg.cpu_cores, 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn resolves_nominal_network_class_name() {
        let path = write_config("[network]\nspeed = LAN100\n[cpu]\nstrength = 2.0\ncores = 4\n");
        let cfg = LocalConfig::load(&path).unwrap();
        assert_eq!(cfg.network_speed, 9_375_000.0);
        assert_eq!(cfg.cpu_cores, 4);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_speed_defaults() {
        let path = write_config("[cpu]\nstrength = 1.0\n");
        let cfg = LocalConfig::load(&path).unwrap();
        assert_eq!(cfg.network_speed, DEFAULT_NETWORK_SPEED);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_strength_is_an_error() {
        let path = write_config("[network]\nspeed = 500000\n");
        let err = LocalConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(opt) if opt == "cpu.strength"));
        std::fs::remove_file(path).ok();
    }
}
