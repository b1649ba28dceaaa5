/*!

This library provides the data model shared by the hosted provider end-to-end harness: the cluster
resource as the management API reports it, Kubernetes versions, convergence windows, and the
management API client.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use cluster::{
    ClusterConfig, ClusterResource, ClusterStatus, NodeGroupSpec, Provider, Transitioning,
};
pub use error::{Error, Result};
pub use version::{sorted_descending, K8sVersion};
pub use window::ConvergenceWindow;

mod cluster;
pub mod clients;
pub mod constants;
mod error;
mod version;
mod window;
