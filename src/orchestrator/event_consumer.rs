//! Platform event consumer: feeds gateway activity into the supervisor.
//!
//! Reads [`PlatformEvent`]s from the shared `mpsc` channel. `Ready` flips
//! the watch flag the supervisor's tick loop is waiting on; membership and
//! command events go to the matching supervisor hooks.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::platform::PlatformEvent;

use super::supervisor::SessionSupervisor;

/// Spawn a background task that routes platform events to the supervisor.
///
/// The task runs until the `CancellationToken` fires or the `mpsc` channel
/// closes.
///
/// # Arguments
///
/// * `rx`         - Receiving end of the platform event channel.
/// * `supervisor` - Supervisor whose hooks handle the events.
/// * `ready_tx`   - Set to `true` on the first `Ready` event.
/// * `cancel`     - Cancellation token for graceful shutdown.
#[must_use]
pub fn spawn_event_consumer(
    mut rx: mpsc::Receiver<PlatformEvent>,
    supervisor: Arc<SessionSupervisor>,
    ready_tx: watch::Sender<bool>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    info!("platform event consumer shutting down");
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(e) = maybe_event { e } else {
                        info!("platform event channel closed");
                        break;
                    }
                }
            };

            match event {
                PlatformEvent::Ready => {
                    if !ready_tx.send_replace(true) {
                        info!("platform ready, releasing session supervisor");
                    }
                }
                PlatformEvent::VoiceStateUpdate {
                    guild_id,
                    user_id,
                    channel_id,
                } => {
                    let outcome = supervisor
                        .on_voice_state_update(guild_id, user_id, channel_id)
                        .await;
                    debug!(%guild_id, %user_id, ?outcome, "voice state update handled");
                }
                PlatformEvent::CommandIssued {
                    guild_id,
                    channel_id,
                } => {
                    supervisor.on_command(guild_id, channel_id).await;
                }
            }
        }
    })
}
