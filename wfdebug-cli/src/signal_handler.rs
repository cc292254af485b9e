use anyhow::Context;
use tokio::signal;
use tracing::info;
use wfdebug::CallContext;

/// Cancel `ctx` on Ctrl+C or, on unix, SIGTERM
///
/// In-flight calls then fail with a cancellation error instead of the
/// process being killed mid-output.
pub fn cancel_on_signal(ctx: CallContext) -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install terminate signal handler")?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = async move {
            terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminated = std::future::pending::<()>();

        tokio::select! {
            Ok(()) = signal::ctrl_c() => {
                info!("Received Ctrl+C signal, cancelling");
            },
            _ = terminated => {
                info!("Received terminate signal, cancelling");
            },
        }
        ctx.cancel();
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_signal_handler_setup_leaves_context_live() {
        let ctx = CallContext::new();
        cancel_on_signal(ctx.clone()).unwrap();

        sleep(Duration::from_millis(10)).await;
        assert!(!ctx.cancellation_token().is_cancelled());
    }
}
