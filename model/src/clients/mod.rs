/*!

Clients for the cluster management API. [`ManagementClient`] is the seam the harness works
against; [`RancherClient`] implements it over HTTP.

!*/

mod error;
mod http_status_code;
mod management_client;
mod rancher_client;
pub mod wire;

pub use error::{Error, Result};
pub use http_status_code::{HttpStatusCode, StatusCode};
pub use management_client::{ManagementClient, Token};
pub use rancher_client::RancherClient;
