use crate::cli::actions::{check_ip, flow, gate, status, Action};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Gate(args) => gate::execute(args).await,
        Action::CheckIp(args) => check_ip::execute(&args),
        Action::Status(args) => status::execute(args).await,
        Action::Flow(args) => flow::execute(args).await,
    }
}
