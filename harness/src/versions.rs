use crate::error::{self, Result};
use hosted_model::{sorted_descending, K8sVersion};
use snafu::OptionExt;

/// Chooses the Kubernetes version for a new cluster.
///
/// A pinned version (`DOWNSTREAM_K8S_MINOR_VERSION`) wins: the highest available version with the
/// same minor is used, or the pinned value itself when none is listed. Otherwise the highest
/// available version is used, or, for clusters that a scenario will upgrade, the highest version
/// of the second-highest minor release.
pub fn k8s_version_for<S: AsRef<str>>(
    pinned: Option<&str>,
    available: &[S],
    for_upgrade: bool,
) -> Result<String> {
    let sorted = sorted_descending(available);
    if let Some(pinned) = pinned.map(str::trim).filter(|p| !p.is_empty()) {
        let chosen = K8sVersion::parse(pinned)
            .ok()
            .and_then(|wanted| sorted.iter().find(|v| v.same_minor(&wanted)).cloned())
            .map(|v| v.to_string())
            .unwrap_or_else(|| pinned.to_string());
        return Ok(chosen);
    }
    let highest = sorted.first().context(error::MissingConfigSnafu {
        what: "no Kubernetes versions are available",
    })?;
    if !for_upgrade {
        return Ok(highest.to_string());
    }
    sorted
        .iter()
        .find(|v| !v.same_minor(highest))
        .map(|v| v.to_string())
        .context(error::MissingConfigSnafu {
            what: format!(
                "an upgrade needs a minor release below {}",
                highest.major_minor_without_v()
            ),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    const AVAILABLE: &[&str] = &["1.28.9", "1.30.2", "1.29.4", "1.30.1", "1.29.6"];

    #[test]
    fn highest_for_provisioning() {
        assert_eq!(k8s_version_for(None, AVAILABLE, false).unwrap(), "1.30.2");
    }

    #[test]
    fn second_highest_minor_for_upgrades() {
        assert_eq!(k8s_version_for(None, AVAILABLE, true).unwrap(), "1.29.6");
    }

    #[test]
    fn pinned_minor_wins() {
        assert_eq!(
            k8s_version_for(Some("1.28"), AVAILABLE, false).unwrap(),
            "1.28.9"
        );
        assert_eq!(k8s_version_for(Some("1.28"), AVAILABLE, true).unwrap(), "1.28.9");
        assert_eq!(k8s_version_for(Some("1.27"), AVAILABLE, false).unwrap(), "1.27");
        assert_eq!(k8s_version_for(Some("1.31"), &[] as &[&str], false).unwrap(), "1.31");
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(k8s_version_for(None, &["1.9", "1.10"], false).unwrap(), "1.10");
    }

    #[test]
    fn errors_without_versions() {
        assert!(k8s_version_for(None, &[] as &[&str], false).is_err());
        assert!(k8s_version_for(None, &["1.30.1", "1.30.2"], true).is_err());
    }
}
