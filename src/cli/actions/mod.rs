pub mod check_ip;
pub mod flow;
pub mod gate;
pub mod status;

// Internal "interpreter" for `Action`.
mod run;

#[derive(Debug)]
pub enum Action {
    Gate(gate::Args),
    CheckIp(check_ip::Args),
    Status(status::Args),
    Flow(flow::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
