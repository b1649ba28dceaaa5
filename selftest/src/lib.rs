/*!

Provides fakes for testing the harness without a management API or a cloud account. We call this
testing modality `selftest` to distinguish it from the end-to-end scenarios themselves.

!*/

pub mod fake_api;
pub mod fake_cli;
mod test_settings;

pub use fake_api::{DuplicateWording, FakeManagementApi};
pub use fake_cli::FakeCli;
