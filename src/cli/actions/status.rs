use crate::{api::ApiClient, cli::globals::Config};
use anyhow::{bail, Result};

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub session_id: String,
}

/// Execute the status action.
/// # Errors
/// Returns an error if the client cannot be built or the session is not successful.
pub async fn execute(args: Args) -> Result<()> {
    let client = ApiClient::new(&args.config)?;
    let response = client.check_status(&args.session_id).await;

    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        bail!(
            "{}",
            response.error_message().unwrap_or("session is not authenticated")
        );
    }

    Ok(())
}
