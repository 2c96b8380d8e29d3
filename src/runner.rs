//! Consumer loop driving the efficacy app until the simulation ends.

use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::app::EfficacyApp;
use crate::bus::{Delivery, Subscription, unwrap_json_string};
use crate::sim::message::{SimulationStatus, parse_log};

/// Why the consumer loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The simulation log reported a terminal status.
    Completed(SimulationStatus),
    /// The output subscription was closed by the bus.
    OutputClosed,
    /// The shutdown future resolved.
    Shutdown,
}

/// Feeds output deliveries to `app` until the run ends.
///
/// Per-timestep failures are logged and skipped. When `log` is given, a
/// terminal process status on it ends the loop. A closed log subscription
/// is ignored from then on. Pending output is drained before log entries
/// are looked at, so every timestep published before the final status is
/// still written.
pub async fn run<F>(
    app: &mut EfficacyApp,
    output: &mut Subscription,
    mut log: Option<&mut Subscription>,
    shutdown: F,
) -> StopReason
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let simulation_id = app.simulation_id().to_string();
    let mut log_open = log.is_some();
    let mut processed = 0usize;

    let reason = loop {
        tokio::select! {
            biased;

            () = &mut shutdown => break StopReason::Shutdown,
            delivery = output.recv() => {
                let Some(delivery) = delivery else {
                    break StopReason::OutputClosed;
                };
                match app.on_message(&delivery).await {
                    Ok(Some(_)) => processed += 1,
                    Ok(None) => {}
                    Err(e) => error!(%simulation_id, error = %e, "dropping timestep"),
                }
            }
            entry = next_log(&mut log), if log_open => {
                let Some(delivery) = entry else {
                    warn!(%simulation_id, "simulation log subscription closed");
                    log_open = false;
                    continue;
                };
                let Some(log_entry) = parse_log(&unwrap_json_string(delivery.body)) else {
                    continue;
                };
                if let Some(message) = &log_entry.log_message {
                    debug!(%simulation_id, status = ?log_entry.process_status, %message, "simulation log");
                }
                if log_entry.process_status.is_terminal() {
                    break StopReason::Completed(log_entry.process_status);
                }
            }
        }
    };

    info!(%simulation_id, ?reason, processed, "efficacy run finished");
    reason
}

/// Next log delivery, or pending forever when there is no log subscription.
async fn next_log(log: &mut Option<&mut Subscription>) -> Option<Delivery> {
    match log {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
