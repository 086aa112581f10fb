mod run;

use crate::server::ServeOptions;
use std::path::PathBuf;

/// Action enum representing each possible command
#[derive(Debug)]
pub enum Action {
    Serve(ServeOptions),
    Generate {
        cert: PathBuf,
        key: PathBuf,
        common_name: String,
        lifetime_days: u32,
    },
}

impl Action {
    /// Execute the action
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails to execute
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
