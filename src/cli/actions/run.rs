use super::Action;
use crate::{metrics::IDENTITY_EXPIRY_DAYS, tls::issue_certificate};
use anyhow::Context;
use tokio::task;
use tracing::info;

/// Execute the action's business logic by delegating to the appropriate module
pub async fn execute(action: Action) -> anyhow::Result<()> {
    match action {
        Action::Serve(options) => crate::server::start(options).await,
        Action::Generate {
            cert,
            key,
            common_name,
            lifetime_days,
        } => {
            let identity = task::spawn_blocking(move || {
                issue_certificate(&cert, &key, &common_name, lifetime_days)
                    .with_context(|| format!("failed to issue certificate for {common_name}"))
            })
            .await??;

            let metadata = identity.metadata()?;
            IDENTITY_EXPIRY_DAYS.set(metadata.expiry_days());
            info!(
                subject = %metadata.subject,
                not_after = %metadata.not_after,
                serial = %metadata.serial,
                "certificate written"
            );

            Ok(())
        }
    }
}
