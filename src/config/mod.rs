use crate::dumper::memory::Target;
use crate::version::Version;
use crate::{muted_error, weak_error};
use log::error;
use std::fs::read_to_string;
use std::path::Path;

mod ser;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error("invalid framework version `{0}`")]
    Version(String),
    #[error("unsupported pointer size {0}, expect 4 or 8")]
    PointerSize(usize),
    #[error("headroom {headroom} does not fit into output buffer of {capacity} bytes")]
    Headroom { headroom: usize, capacity: usize },
}

/// Enumeration limits, the only bound of a request latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caps {
    /// Max children of array, list, hash and map containers.
    pub container_cap: usize,
    /// `std::list` nodes are counted up to this limit.
    pub std_list_count_cap: usize,
    /// Max children of set containers.
    pub set_cap: usize,
    /// Absolute limit of visited nodes per request.
    pub node_walk_limit: usize,
    /// Number of byte array bytes shown in a value.
    pub byte_array_preview: usize,
    /// Number of leading elements probed before enumeration.
    pub validate_prefix: usize,
}

/// Dumper configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumperConfig {
    /// Framework namespace prefix.
    pub namespace: String,
    pub framework_version: Version,
    pub target: Target,
    pub output_buffer_size: usize,
    /// Bytes reserved at the end of the output buffer for closing delimiters.
    pub headroom: usize,
    /// Library logging switch.
    pub log: bool,
    pub caps: Caps,
}

impl Default for DumperConfig {
    fn default() -> Self {
        let preset = include_str!("preset/config.toml");
        let file: ser::ConfigFile = toml::de::from_str(preset).expect("should de");
        file.merge(Self::builtin()).expect("preset must be valid")
    }
}

impl DumperConfig {
    const DEFAULT_PATH: &'static str = ".config/qdumper/config.toml";

    fn builtin() -> Self {
        Self {
            namespace: String::new(),
            framework_version: Version::default(),
            target: Target::host(),
            output_buffer_size: 1_000_000,
            headroom: 100,
            log: true,
            caps: Caps {
                container_cap: 1000,
                std_list_count_cap: 100,
                set_cap: 100,
                node_walk_limit: 10_000,
                byte_array_preview: 100,
                validate_prefix: 10,
            },
        }
    }

    /// Parse configuration, missing fields are taken from defaults.
    pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
        let file: ser::ConfigFile = toml::de::from_str(data)?;
        file.merge(Self::default())
    }

    /// Load configuration from file, default location is used if `path` is [`None`].
    /// Return [`None`] on errors.
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    error!("Error while load config file: {err}");
                    return None;
                }
            },
        };

        weak_error!(Self::from_toml(&data), "config:")
    }

    /// Like [`DumperConfig::from_file`] but fall back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// Same config with another namespace.
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Same config with another target description.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Apply log switch to the library.
    pub fn apply_log_switch(&self) {
        if self.log {
            crate::log::enable()
        } else {
            crate::log::disable()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dumper::memory::{ByteOrder, StdAbi};
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default() {
        let config = DumperConfig::default();
        assert_eq!(config.namespace, "");
        assert_eq!(config.framework_version, Version((4, 6, 2)));
        assert_eq!(config.target, Target::host());
        assert_eq!(config.output_buffer_size, 1_000_000);
        assert_eq!(config.headroom, 100);
        assert_eq!(config.caps.container_cap, 1000);
        assert_eq!(config.caps.std_list_count_cap, 100);
        assert_eq!(config.caps.set_cap, 100);
        assert_eq!(config.caps.node_walk_limit, 10_000);
        assert_eq!(config.caps.byte_array_preview, 100);
        assert_eq!(config.caps.validate_prefix, 10);
    }

    #[test]
    fn test_from_toml() {
        let config = DumperConfig::from_toml(
            r#"
            namespace = "MyNs"
            framework_version = "4.7"
            abi = "msvc"
            pointer_size = 4
            byte_order = "big"

            [caps]
            container_cap = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.namespace, "MyNs");
        assert_eq!(config.framework_version, Version((4, 7, 0)));
        assert_eq!(
            config.target,
            Target {
                pointer_size: 4,
                byte_order: ByteOrder::Big,
                abi: StdAbi::Msvc,
            }
        );
        assert_eq!(config.caps.container_cap, 50);
        assert_eq!(config.caps.set_cap, 100);
    }

    #[test]
    fn test_from_toml_errors() {
        assert!(matches!(
            DumperConfig::from_toml("pointer_size = 3"),
            Err(ConfigError::PointerSize(3))
        ));
        assert!(matches!(
            DumperConfig::from_toml("framework_version = \"four\""),
            Err(ConfigError::Version(_))
        ));
        assert!(matches!(
            DumperConfig::from_toml("output_buffer_size = 10\nheadroom = 20"),
            Err(ConfigError::Headroom { .. })
        ));
        assert!(matches!(
            DumperConfig::from_toml("unknown_field = 1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("qdumper-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "namespace = \"Ns\"").unwrap();
        drop(file);

        let config = DumperConfig::from_file(Some(&path)).unwrap();
        assert_eq!(config.namespace, "Ns");
        std::fs::remove_file(&path).unwrap();

        assert!(DumperConfig::from_file(Some(Path::new("/nonexistent/qdumper.toml"))).is_none());
        assert_eq!(
            DumperConfig::load(Some(Path::new("/nonexistent/qdumper.toml"))),
            DumperConfig::default()
        );
    }

    #[test]
    #[serial]
    fn test_log_switch() {
        let mut config = DumperConfig::default();
        config.log = false;
        config.apply_log_switch();
        assert!(!crate::log::is_enabled());
        config.log = true;
        config.apply_log_switch();
        assert!(crate::log::is_enabled());
    }
}
