//! Shared fakes and harness construction for integration tests.
//!
//! Provides in-memory voice and text layers, a decoder process table, and
//! a canned now-playing source so individual test modules can focus on
//! behaviour rather than boilerplate. Every fake appends to one shared
//! journal so tests can assert cross-component ordering.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nts_radio::models::ids::{ChannelId, GuildId, UserId};
use nts_radio::models::session::PlaybackStatus;
use nts_radio::orchestrator::idle_store::SessionStateStore;
use nts_radio::orchestrator::playback::{PlaybackController, PlaybackSettings};
use nts_radio::orchestrator::supervisor::{SessionSupervisor, SupervisorSettings};
use nts_radio::platform::{
    Activity, AudioSource, BoxFuture, OutgoingMessage, Participant, TextLayer, VoiceConnection,
    VoiceLayer,
};
use nts_radio::process::reaper::{ProcessReaper, ReapSettings};
use nts_radio::process::table::{Discovery, ProcessEntry, ProcessTable, ReapSignal};
use nts_radio::radio::now_playing::NowPlayingSource;
use nts_radio::{AppError, Result};

/// The bot's own user ID in every fake.
pub const BOT: UserId = UserId(1);

/// Ordered record of side effects across all fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

fn log(journal: &Journal, entry: impl Into<String>) {
    journal.lock().unwrap().push(entry.into());
}

// ── Voice ────────────────────────────────────────────────

#[derive(Default)]
struct VoiceState {
    connections: HashMap<GuildId, ChannelId>,
    status: HashMap<GuildId, PlaybackStatus>,
    rosters: HashMap<ChannelId, Vec<Participant>>,
    disconnect_failures: HashMap<GuildId, u32>,
    fail_connect: bool,
    presence: Option<Activity>,
    volume: HashMap<GuildId, f32>,
}

/// In-memory voice layer.
pub struct FakeVoice {
    state: Mutex<VoiceState>,
    journal: Journal,
}

impl FakeVoice {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Mutex::new(VoiceState::default()),
            journal,
        }
    }

    /// Put the bot in `channel` with the given status and only itself present.
    pub fn add_session(&self, guild: GuildId, channel: ChannelId, status: PlaybackStatus) {
        let mut state = self.state.lock().unwrap();
        state.connections.insert(guild, channel);
        state.status.insert(guild, status);
        state.rosters.insert(channel, vec![Participant::bot(BOT)]);
    }

    /// Replace a channel's roster; the bot itself is always included.
    pub fn set_roster(&self, channel: ChannelId, listeners: &[u64]) {
        let mut roster = vec![Participant::bot(BOT)];
        roster.extend(listeners.iter().map(|id| Participant::listener(*id)));
        self.state.lock().unwrap().rosters.insert(channel, roster);
    }

    pub fn set_status(&self, guild: GuildId, status: PlaybackStatus) {
        self.state.lock().unwrap().status.insert(guild, status);
    }

    /// Make the next `count` disconnect calls for `guild` fail.
    pub fn fail_disconnects(&self, guild: GuildId, count: u32) {
        self.state
            .lock()
            .unwrap()
            .disconnect_failures
            .insert(guild, count);
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn is_connected(&self, guild: GuildId) -> bool {
        self.state.lock().unwrap().connections.contains_key(&guild)
    }

    pub fn channel_of(&self, guild: GuildId) -> Option<ChannelId> {
        self.state.lock().unwrap().connections.get(&guild).copied()
    }

    pub fn playback_status_of(&self, guild: GuildId) -> PlaybackStatus {
        self.playback_status(guild)
    }

    pub fn presence(&self) -> Option<Activity> {
        self.state.lock().unwrap().presence.clone()
    }

    pub fn volume(&self, guild: GuildId) -> Option<f32> {
        self.state.lock().unwrap().volume.get(&guild).copied()
    }
}

impl VoiceLayer for FakeVoice {
    fn current_user(&self) -> UserId {
        BOT
    }

    fn connections(&self) -> Vec<VoiceConnection> {
        let mut connections: Vec<VoiceConnection> = self
            .state
            .lock()
            .unwrap()
            .connections
            .iter()
            .map(|(guild_id, channel_id)| VoiceConnection {
                guild_id: *guild_id,
                channel_id: *channel_id,
            })
            .collect();
        connections.sort_by_key(|c| c.guild_id);
        connections
    }

    fn playback_status(&self, guild_id: GuildId) -> PlaybackStatus {
        self.state
            .lock()
            .unwrap()
            .status
            .get(&guild_id)
            .copied()
            .unwrap_or_default()
    }

    fn roster(&self, channel_id: ChannelId) -> Vec<Participant> {
        self.state
            .lock()
            .unwrap()
            .rosters
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            log(&self.journal, format!("connect {guild_id} {channel_id}"));
            let mut state = self.state.lock().unwrap();
            if state.fail_connect {
                return Err(AppError::Voice("handshake timed out".into()));
            }
            state.connections.insert(guild_id, channel_id);
            state.status.insert(guild_id, PlaybackStatus::Stopped);
            Ok(())
        })
    }

    fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            log(&self.journal, format!("move {guild_id} {channel_id}"));
            self.state
                .lock()
                .unwrap()
                .connections
                .insert(guild_id, channel_id);
            Ok(())
        })
    }

    fn disconnect(&self, guild_id: GuildId, force: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            log(&self.journal, format!("disconnect {guild_id} force={force}"));
            let mut state = self.state.lock().unwrap();
            if let Some(remaining) = state.disconnect_failures.get_mut(&guild_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::Voice("gateway rejected disconnect".into()));
                }
            }
            state.connections.remove(&guild_id);
            state.status.remove(&guild_id);
            Ok(())
        })
    }

    fn play(&self, guild_id: GuildId, source: AudioSource) -> Result<()> {
        log(&self.journal, format!("play {guild_id} {}", source.url));
        let mut state = self.state.lock().unwrap();
        if !state.connections.contains_key(&guild_id) {
            return Err(AppError::Voice("not connected".into()));
        }
        state.status.insert(guild_id, PlaybackStatus::Playing);
        state.volume.insert(guild_id, source.volume);
        Ok(())
    }

    fn pause(&self, guild_id: GuildId) -> Result<()> {
        log(&self.journal, format!("pause {guild_id}"));
        self.state
            .lock()
            .unwrap()
            .status
            .insert(guild_id, PlaybackStatus::Paused);
        Ok(())
    }

    fn resume(&self, guild_id: GuildId) -> Result<()> {
        log(&self.journal, format!("resume {guild_id}"));
        self.state
            .lock()
            .unwrap()
            .status
            .insert(guild_id, PlaybackStatus::Playing);
        Ok(())
    }

    fn stop(&self, guild_id: GuildId) -> Result<()> {
        log(&self.journal, format!("stop {guild_id}"));
        self.state
            .lock()
            .unwrap()
            .status
            .insert(guild_id, PlaybackStatus::Stopped);
        Ok(())
    }

    fn set_presence(&self, activity: Option<Activity>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let shown = activity
                .as_ref()
                .map_or_else(|| "none".to_owned(), |a| a.listening_to.clone());
            log(&self.journal, format!("presence {shown}"));
            self.state.lock().unwrap().presence = activity;
            Ok(())
        })
    }
}

// ── Text ─────────────────────────────────────────────────

#[derive(Default)]
struct TextState {
    sent: Vec<(ChannelId, OutgoingMessage)>,
    permitted: HashSet<ChannelId>,
    system: HashMap<GuildId, ChannelId>,
    channels: HashMap<GuildId, Vec<ChannelId>>,
    fail_send: bool,
}

/// In-memory text layer.
pub struct FakeText {
    state: Mutex<TextState>,
    journal: Journal,
}

impl FakeText {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Mutex::new(TextState::default()),
            journal,
        }
    }

    /// Register a guild's text channels; `permitted` are the ones the bot may post in.
    pub fn set_channels(
        &self,
        guild: GuildId,
        system: Option<ChannelId>,
        channels: &[ChannelId],
        permitted: &[ChannelId],
    ) {
        let mut state = self.state.lock().unwrap();
        if let Some(system) = system {
            state.system.insert(guild, system);
        }
        state.channels.insert(guild, channels.to_vec());
        state.permitted.extend(permitted.iter().copied());
    }

    pub fn permit(&self, channel: ChannelId) {
        self.state.lock().unwrap().permitted.insert(channel);
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_send = true;
    }

    /// Plain-text bodies sent to `channel`, in order.
    pub fn texts_in(&self, channel: ChannelId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, m)| m.body.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }
}

impl TextLayer for FakeText {
    fn send(&self, channel_id: ChannelId, message: OutgoingMessage) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            log(&self.journal, format!("send {channel_id}"));
            let mut state = self.state.lock().unwrap();
            if state.fail_send {
                return Err(AppError::Messaging("missing access".into()));
            }
            state.sent.push((channel_id, message));
            Ok(())
        })
    }

    fn can_send(&self, channel_id: ChannelId) -> bool {
        self.state.lock().unwrap().permitted.contains(&channel_id)
    }

    fn system_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.state.lock().unwrap().system.get(&guild_id).copied()
    }

    fn text_channels(&self, guild_id: GuildId) -> Vec<ChannelId> {
        self.state
            .lock()
            .unwrap()
            .channels
            .get(&guild_id)
            .cloned()
            .unwrap_or_default()
    }
}

// ── Processes ────────────────────────────────────────────

/// Decoder process table where every process exits on `SIGTERM`.
pub struct FakeDecoders {
    alive: Mutex<HashMap<u32, String>>,
    journal: Journal,
}

impl FakeDecoders {
    pub fn new(journal: Journal) -> Self {
        Self {
            alive: Mutex::new(HashMap::new()),
            journal,
        }
    }

    pub fn spawn_decoder(&self, pid: u32) {
        self.alive.lock().unwrap().insert(pid, "ffmpeg".into());
    }

    pub fn alive_count(&self) -> usize {
        self.alive.lock().unwrap().len()
    }
}

impl ProcessTable for FakeDecoders {
    fn list(&self, _discovery: Discovery) -> Result<Vec<ProcessEntry>> {
        log(&self.journal, "reap");
        Ok(self
            .alive
            .lock()
            .unwrap()
            .iter()
            .map(|(pid, name)| ProcessEntry {
                pid: *pid,
                name: name.clone(),
            })
            .collect())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains_key(&pid)
    }

    fn signal(&self, pid: u32, _signal: ReapSignal) -> Result<()> {
        self.alive
            .lock()
            .unwrap()
            .remove(&pid)
            .map(|_| ())
            .ok_or_else(|| AppError::Process(format!("pid {pid} not found")))
    }

    fn kill_by_name(&self, _name: &str) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

// ── Now playing ──────────────────────────────────────────

/// Canned now-playing lines.
pub struct FakeNowPlaying;

impl NowPlayingSource for FakeNowPlaying {
    fn describe(&self, channel: u8) -> BoxFuture<'_, String> {
        Box::pin(async move { format!("station {channel} line") })
    }
}

// ── Harness ──────────────────────────────────────────────

/// Playback settings with every delay removed.
pub fn instant_playback_settings() -> PlaybackSettings {
    PlaybackSettings {
        decoder_pattern: "ffmpeg*".into(),
        terminate_on_idle_pause: true,
        settle_delay: Duration::ZERO,
        stop_delay: Duration::ZERO,
        disconnect_delay: Duration::ZERO,
        resume_hint: Some("Use `/live_on_1` or `/live_on_2` to start streaming again!".into()),
    }
}

/// Fully wired supervisor over fakes.
pub struct Harness {
    pub journal: Journal,
    pub voice: Arc<FakeVoice>,
    pub text: Arc<FakeText>,
    pub decoders: Arc<FakeDecoders>,
    pub controller: Arc<PlaybackController>,
    pub store: Arc<SessionStateStore>,
    pub supervisor: Arc<SessionSupervisor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_playback(instant_playback_settings())
    }

    pub fn with_playback(playback: PlaybackSettings) -> Self {
        let journal: Journal = Arc::default();
        let voice = Arc::new(FakeVoice::new(Arc::clone(&journal)));
        let text = Arc::new(FakeText::new(Arc::clone(&journal)));
        let decoders = Arc::new(FakeDecoders::new(Arc::clone(&journal)));
        let reaper = Arc::new(ProcessReaper::new(
            Arc::clone(&decoders) as Arc<dyn ProcessTable>,
            ReapSettings::default(),
        ));
        let controller = Arc::new(PlaybackController::new(
            Arc::clone(&voice) as Arc<dyn VoiceLayer>,
            Arc::clone(&text) as Arc<dyn TextLayer>,
            reaper,
            playback,
        ));
        let store = Arc::new(SessionStateStore::new());
        let supervisor = Arc::new(SessionSupervisor::new(
            Arc::clone(&voice) as Arc<dyn VoiceLayer>,
            Arc::clone(&controller),
            Arc::clone(&store),
            SupervisorSettings {
                tick_interval: Duration::from_secs(10),
                idle_timeout: Duration::from_secs(60),
            },
        ));
        Self {
            journal,
            voice,
            text,
            decoders,
            controller,
            store,
            supervisor,
        }
    }

    /// Journal entries that start with `prefix`.
    pub fn entries(&self, prefix: &str) -> Vec<String> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Index of the first journal entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .position(|e| e.starts_with(prefix))
    }
}
