use crate::weak_error;
use itertools::Itertools;
use once_cell::sync;
use regex::Regex;
use std::fmt::{Display, Formatter};

/// Version of the wire format produced by the dumper.
pub const DUMPER_VERSION: &str = "1.3";

/// Framework (Qt) SemVer version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(pub (u32, u32, u32));

impl Version {
    /// Parse version from strings like "4.6.2" or "4.7". Missing patch component means zero.
    pub fn parse(s: &str) -> Option<Self> {
        static V_RE: sync::Lazy<Regex> = sync::Lazy::new(|| {
            Regex::new(r"^\s*(\d+)\.(\d+)(?:\.(\d+))?").expect("must compile")
        });

        let captures = V_RE.captures(s)?;
        let major = weak_error!(captures[1].parse::<u32>())?;
        let minor = weak_error!(captures[2].parse::<u32>())?;
        let patch = match captures.get(3) {
            None => 0,
            Some(p) => weak_error!(p.as_str().parse::<u32>())?,
        };
        Some(Version((major, minor, patch)))
    }

    pub fn major(&self) -> u32 {
        self.0 .0
    }

    pub fn minor(&self) -> u32 {
        self.0 .1
    }

    pub fn patch(&self) -> u32 {
        self.0 .2
    }
}

impl Default for Version {
    fn default() -> Self {
        Version((4, 6, 2))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Execute expression depending on framework version.
#[macro_export]
macro_rules! version_switch {
            ($lang_v:expr, $($v1:tt ..= $v2:expr => $code: expr),+ $(,)?) => {
                $(
                    if $lang_v >= $crate::version::Version($v1) && $lang_v <= $crate::version::Version($v2) {
                        Some($code)
                    } else
                )*
                {
                    None
                }
            };
        }

/// Supported framework version diapasons.
static SUPPORTED_FRAMEWORK: &[(Version, Version)] = &[
    (Version((4, 5, 0)), Version((4, 5, u32::MAX))),
    (Version((4, 6, 0)), Version((4, 6, u32::MAX))),
    (Version((4, 7, 0)), Version((4, 7, u32::MAX))),
    (Version((4, 8, 0)), Version((4, 8, u32::MAX))),
];

pub fn supported_versions_to_string() -> String {
    format!(
        "[{}]",
        SUPPORTED_FRAMEWORK
            .iter()
            .map(|(v, _)| format!("{}.{}.x", v.major(), v.minor()))
            .join(", ")
    )
}

/// Return true if layouts for a framework version are known.
pub fn is_supported(version: Version) -> bool {
    SUPPORTED_FRAMEWORK
        .iter()
        .any(|(v_min, v_max)| version >= *v_min && version <= *v_max)
}
