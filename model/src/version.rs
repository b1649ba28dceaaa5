use crate::error::{self, Result};
use serde_plain::{derive_deserialize_from_fromstr, derive_serialize_from_display};
use snafu::OptionExt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Represents a parsed Kubernetes version. Examples of valid values when parsing:
/// - `v1.29`
/// - `1.29`
/// - `v1.29.4`
/// - `1.30.2-gke.1587003`
///
/// Versions are ordered numerically by major, minor and patch, so `1.10` is greater than `1.9`. A
/// version without a patch value sorts before the same minor with any patch value.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct K8sVersion {
    major: u8,
    minor: u8,
    patch: Option<u8>,
    suffix: Option<String>,
}

impl K8sVersion {
    pub const fn new(major: u8, minor: u8, patch: Option<u8>) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix: None,
        }
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Returns a string representation of the Kubernetes version without a v prefix, and only
    /// includes the major and minor versions (even if a patch value is present). Example: `1.29`.
    pub fn major_minor_without_v(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// Returns a string representation of the Kubernetes version without a v prefix. Includes the
    /// patch value and provider suffix if they exist. Examples: `1.29.1` when a patch value exists,
    /// or `1.29` if the patch value is `None`.
    pub fn full_version_without_v(&self) -> String {
        let mut s = match self.patch {
            Some(patch) => format!("{}.{}.{}", self.major, self.minor, patch),
            None => self.major_minor_without_v(),
        };
        if let Some(suffix) = &self.suffix {
            s.push('-');
            s.push_str(suffix);
        }
        s
    }

    /// `true` when `self` is on the same or a later minor release than `other`, ignoring patch
    /// values. This is the check used to decide that an upgrade has landed.
    pub fn at_least_minor(&self, other: &K8sVersion) -> bool {
        (self.major, self.minor) >= (other.major, other.minor)
    }

    /// `true` when both versions name the same minor release.
    pub fn same_minor(&self, other: &K8sVersion) -> bool {
        (self.major, self.minor) == (other.major, other.minor)
    }

    pub fn parse<S: AsRef<str>>(s: S) -> Result<Self> {
        let original = s.as_ref().trim();
        let no_v = original.strip_prefix('v').unwrap_or(original);
        let (numbers, suffix) = match no_v.split_once('-') {
            Some((numbers, suffix)) => (numbers, Some(suffix.to_string())),
            None => (no_v, None),
        };
        let mut iter = numbers.split('.');
        let major = parse_component(original, "major", iter.next())?;
        let minor = parse_component(original, "minor", iter.next())?;
        let patch = match iter.next() {
            Some(patch) => Some(parse_component(original, "patch", Some(patch))?),
            None => None,
        };
        Ok(Self {
            major,
            minor,
            patch,
            suffix,
        })
    }
}

fn parse_component(original: &str, which: &str, value: Option<&str>) -> Result<u8> {
    let value = value.context(error::VersionParseSnafu {
        value: original,
        reason: format!("unable to find the {} version number", which),
    })?;
    value.parse::<u8>().map_err(|e| {
        error::OpaqueError::VersionParse {
            value: original.to_string(),
            reason: format!("bad {} version number: {}", which, e),
        }
        .into()
    })
}

impl Display for K8sVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.full_version_without_v(), f)
    }
}

impl FromStr for K8sVersion {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        K8sVersion::parse(s)
    }
}

derive_serialize_from_display!(K8sVersion);
derive_deserialize_from_fromstr!(K8sVersion, "k8s version such as 1.29 or v1.30.2");

/// Sorts `versions` from highest to lowest, dropping values that do not parse as versions.
pub fn sorted_descending<S: AsRef<str>>(versions: &[S]) -> Vec<K8sVersion> {
    let mut parsed: Vec<K8sVersion> = versions
        .iter()
        .filter_map(|v| K8sVersion::parse(v).ok())
        .collect();
    parsed.sort_by(|a, b| b.cmp(a));
    parsed
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_variants() {
        let v = K8sVersion::parse("v1.29").unwrap();
        assert_eq!(v, K8sVersion::new(1, 29, None));
        let v = K8sVersion::parse("1.29.4").unwrap();
        assert_eq!(v, K8sVersion::new(1, 29, Some(4)));
        let v = K8sVersion::parse("1.30.2-gke.1587003").unwrap();
        assert_eq!(v.major_minor_without_v(), "1.30");
        assert_eq!(v.to_string(), "1.30.2-gke.1587003");
    }

    #[test]
    fn parse_failures() {
        assert!(K8sVersion::parse("").is_err());
        assert!(K8sVersion::parse("1").is_err());
        assert!(K8sVersion::parse("one.two").is_err());
        assert!(K8sVersion::parse("1.29.x").is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        let nine = K8sVersion::parse("1.9").unwrap();
        let ten = K8sVersion::parse("1.10").unwrap();
        assert!(ten > nine);
        // A plain string comparison gets this wrong.
        assert!("1.10" < "1.9");
    }

    #[test]
    fn at_least_minor_ignores_patch() {
        let desired = K8sVersion::parse("1.29").unwrap();
        assert!(K8sVersion::parse("1.30").unwrap().at_least_minor(&desired));
        assert!(K8sVersion::parse("1.29.8").unwrap().at_least_minor(&desired));
        assert!(!K8sVersion::parse("1.28.15").unwrap().at_least_minor(&desired));
    }

    #[test]
    fn sorted_descending_skips_garbage() {
        let sorted = sorted_descending(&["1.28", "bogus", "1.30", "1.29"]);
        let sorted: Vec<String> = sorted.iter().map(|v| v.to_string()).collect();
        assert_eq!(sorted, vec!["1.30", "1.29", "1.28"]);
    }

    #[test]
    fn serde_round_trip_as_string() {
        let v: K8sVersion = serde_json::from_str("\"1.29\"").unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.29\"");
    }
}
