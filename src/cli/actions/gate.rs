use crate::edge::{gate, EdgePolicy};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub static_dir: PathBuf,
    pub trust_forwarded_for: bool,
    pub policy: EdgePolicy,
}

/// Execute the gate action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    for entry in &args.policy.allow_list {
        let (first, last) = entry.range();
        debug!(%entry, %first, %last, "allow-list entry");
    }

    if !args.static_dir.is_dir() {
        warn!(
            "static directory {} does not exist, only /health will answer",
            args.static_dir.display()
        );
    }

    let state = gate::GateState {
        policy: Arc::new(args.policy),
        trust_forwarded_for: args.trust_forwarded_for,
    };

    gate::new(args.port, args.static_dir, state).await
}
