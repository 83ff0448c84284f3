use crate::config::{Caps, ConfigError, DumperConfig};
use crate::dumper::memory::{ByteOrder, StdAbi, Target};
use crate::version::Version;
use serde::Deserialize;

/// Config file representation, every field is optional and falls back to the preset.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ConfigFile {
    namespace: Option<String>,
    framework_version: Option<String>,
    abi: Option<StdAbi>,
    pointer_size: Option<usize>,
    byte_order: Option<ByteOrder>,
    output_buffer_size: Option<usize>,
    headroom: Option<usize>,
    log: Option<bool>,
    #[serde(default)]
    caps: CapsFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CapsFile {
    container_cap: Option<usize>,
    std_list_count_cap: Option<usize>,
    set_cap: Option<usize>,
    node_walk_limit: Option<usize>,
    byte_array_preview: Option<usize>,
    validate_prefix: Option<usize>,
}

impl CapsFile {
    fn merge(self, base: Caps) -> Caps {
        Caps {
            container_cap: self.container_cap.unwrap_or(base.container_cap),
            std_list_count_cap: self.std_list_count_cap.unwrap_or(base.std_list_count_cap),
            set_cap: self.set_cap.unwrap_or(base.set_cap),
            node_walk_limit: self.node_walk_limit.unwrap_or(base.node_walk_limit),
            byte_array_preview: self.byte_array_preview.unwrap_or(base.byte_array_preview),
            validate_prefix: self.validate_prefix.unwrap_or(base.validate_prefix),
        }
    }
}

impl ConfigFile {
    /// Apply file values on top of `base`.
    pub(super) fn merge(self, base: DumperConfig) -> Result<DumperConfig, ConfigError> {
        let framework_version = match self.framework_version {
            None => base.framework_version,
            Some(raw) => Version::parse(&raw).ok_or(ConfigError::Version(raw))?,
        };

        let pointer_size = self.pointer_size.unwrap_or(base.target.pointer_size);
        if pointer_size != 4 && pointer_size != 8 {
            return Err(ConfigError::PointerSize(pointer_size));
        }

        let output_buffer_size = self.output_buffer_size.unwrap_or(base.output_buffer_size);
        let headroom = self.headroom.unwrap_or(base.headroom);
        if headroom >= output_buffer_size {
            return Err(ConfigError::Headroom {
                headroom,
                capacity: output_buffer_size,
            });
        }

        Ok(DumperConfig {
            namespace: self.namespace.unwrap_or(base.namespace),
            framework_version,
            target: Target {
                pointer_size,
                byte_order: self.byte_order.unwrap_or(base.target.byte_order),
                abi: self.abi.unwrap_or(base.target.abi),
            },
            output_buffer_size,
            headroom,
            log: self.log.unwrap_or(base.log),
            caps: self.caps.merge(base.caps),
        })
    }
}
