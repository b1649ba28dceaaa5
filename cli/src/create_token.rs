use anyhow::{Context, Result};
use clap::Parser;
use hosted_harness::Harness;

/// Create an API token, for example to build a kubeconfig for a downstream cluster.
#[derive(Debug, Parser)]
pub(crate) struct CreateToken {
    /// Description attached to the token.
    #[clap(long, default_value = "hosted e2e")]
    description: String,

    /// Output the token in JSON format instead of printing only its bearer value.
    #[clap(long = "json")]
    json: bool,
}

impl CreateToken {
    pub(crate) async fn run(self) -> Result<()> {
        let harness = Harness::from_env().context("Unable to set up the harness")?;
        let token = harness
            .client()
            .create_token(&self.description)
            .await
            .context("Unable to create token")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&token).context("Could not serialize token")?
            );
        } else {
            println!("{}", token.token);
        }
        Ok(())
    }
}
