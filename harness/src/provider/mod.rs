/*!

Provider-side verification. These wrappers run the providers' own CLIs so that scenarios can
confirm, independently of the management API, that a change reached the provider, or make changes
directly on the provider that the management API is expected to sync back.

!*/

mod command;
mod eksctl;
mod gcloud;
pub mod query;

pub use eksctl::{format_tags, EksResource, Eksctl, NodeGroupOperation};
pub use gcloud::{Gcloud, GkeResource};

use std::fmt::{Display, Formatter};

/// Where a cluster lives. EKS clusters are always regional. GKE clusters are either zonal or
/// regional.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Location {
    Region(String),
    Zone(String),
}

impl Location {
    /// The `--region=` or `--zone=` flag selecting this location.
    pub fn flag(&self) -> String {
        match self {
            Location::Region(region) => format!("--region={}", region),
            Location::Zone(zone) => format!("--zone={}", zone),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Location::Region(name) | Location::Zone(name) => name,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Region(region) => write!(f, "region {}", region),
            Location::Zone(zone) => write!(f, "zone {}", zone),
        }
    }
}
