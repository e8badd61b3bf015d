use std::sync::mpsc;
use std::thread;

use engine::{
    Command, EditSession, ErrorEvent, Event, MediaBackend, PlacementService, Settings,
};
use iced::futures::{SinkExt, StreamExt, channel::mpsc as futures_mpsc, executor};
use iced::{Subscription, stream};
use tracing::{info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 8;
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 32;

/// Sender used by the UI thread to dispatch commands to the session thread.
pub type EngineCommandSender = mpsc::SyncSender<Command>;

/// Receiver used by the UI thread to read replies from the session thread.
pub type EngineEventReceiver = mpsc::Receiver<SessionReply>;

/// One message from the session thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionReply {
    Event(Event),
    /// All events of the oldest unanswered command have been sent.
    CommandDone,
}

/// Messages emitted by the session bridge subscription.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Ready(EngineCommandSender),
    Event(Event),
    CommandDone,
    Disconnected,
}

/// Builds a subscription that starts the session bridge and forwards events.
pub fn engine_subscription() -> Subscription<BridgeEvent> {
    Subscription::run(bridge_worker_stream)
}

fn bridge_worker_stream() -> impl iced::futures::Stream<Item = BridgeEvent> {
    bridge_worker_stream_with(spawn_placement_bridge)
}

fn bridge_worker_stream_with(
    spawn_bridge: fn() -> (EngineCommandSender, EngineEventReceiver),
) -> impl iced::futures::Stream<Item = BridgeEvent> {
    stream::channel(
        SUBSCRIPTION_CHANNEL_CAPACITY,
        move |mut output| async move {
            let (engine_tx, engine_rx) = spawn_bridge();
            let _ = output.send(BridgeEvent::Ready(engine_tx)).await;

            let (forward_tx, mut forward_rx) =
                futures_mpsc::channel::<BridgeEvent>(SUBSCRIPTION_CHANNEL_CAPACITY);

            thread::spawn(move || {
                let mut forward_tx = forward_tx;
                while let Ok(reply) = engine_rx.recv() {
                    let event = match reply {
                        SessionReply::Event(event) => BridgeEvent::Event(event),
                        SessionReply::CommandDone => BridgeEvent::CommandDone,
                    };
                    if executor::block_on(forward_tx.send(event)).is_err() {
                        return;
                    }
                }
                let _ = executor::block_on(forward_tx.send(BridgeEvent::Disconnected));
            });

            while let Some(event) = forward_rx.next().await {
                if output.send(event).await.is_err() {
                    break;
                }
            }
        },
    )
}

/// Spawns the production bridge: FFmpeg media plus the HTTP service client.
///
/// Settings that fail to load or validate are logged and replaced by defaults.
pub fn spawn_placement_bridge() -> (EngineCommandSender, EngineEventReceiver) {
    spawn_session_bridge(|| {
        let settings = load_settings();
        info!(base_url = %settings.api.base_url, "placement service configured");
        EditSession::from_settings(&settings).map_err(|error| ErrorEvent::from_error(&error))
    })
}

fn load_settings() -> Settings {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => {
            warn!(%error, "failed to load settings, using defaults");
            return Settings::default();
        }
    };
    if let Err(reason) = settings.validate() {
        warn!(%reason, "invalid settings, using defaults");
        return Settings::default();
    }
    settings
}

/// Spawns a bridge around the session produced by `build`.
///
/// The session is built on the worker thread, which owns it for its whole
/// life. The first event is a snapshot of the fresh session. A failed command
/// emits [`Event::Error`] followed by a snapshot carrying the error slot. Every
/// command, failed or not, ends with [`SessionReply::CommandDone`].
pub fn spawn_session_bridge<F, M, S>(build: F) -> (EngineCommandSender, EngineEventReceiver)
where
    F: FnOnce() -> Result<EditSession<M, S>, ErrorEvent> + Send + 'static,
    M: MediaBackend + 'static,
    S: PlacementService + 'static,
{
    let (command_tx, command_rx) = mpsc::sync_channel::<Command>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<SessionReply>(EVENT_CHANNEL_CAPACITY);

    thread::spawn(move || {
        let mut session = match build() {
            Ok(session) => session,
            Err(error) => {
                warn!(message = %error.message, "failed to start edit session");
                let _ = event_tx.send(SessionReply::Event(Event::Error(error)));
                return;
            }
        };
        if event_tx
            .send(SessionReply::Event(Event::SessionChanged(session.snapshot())))
            .is_err()
        {
            return;
        }

        while let Ok(command) = command_rx.recv() {
            let events = match session.handle_command(command) {
                Ok(events) => events,
                Err(error) => vec![
                    Event::Error(ErrorEvent::from_error(&error)),
                    Event::SessionChanged(session.snapshot()),
                ],
            };
            let replies = events
                .into_iter()
                .map(SessionReply::Event)
                .chain([SessionReply::CommandDone]);
            for reply in replies {
                if event_tx.send(reply).is_err() {
                    return;
                }
            }
        }
    });

    (command_tx, event_rx)
}
