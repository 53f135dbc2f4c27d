//! In-memory voice transport used by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::sync::oneshot;

use crate::{
    audio::transport::{PlaybackCompletion, VoiceSession, VoiceTransport},
    error::TransportError,
};

#[derive(Default)]
struct FakeState {
    connected: HashMap<GuildId, ChannelId>,
    connect_outcomes: VecDeque<Result<(), TransportError>>,
    late_handshake: Option<ChannelId>,
    move_failure: Option<TransportError>,
    connect_delay: Duration,
    play_duration: Duration,
    connect_calls: usize,
    move_calls: usize,
    stop_calls: usize,
    disconnects: Vec<(GuildId, bool)>,
    active_plays: HashMap<GuildId, usize>,
    max_concurrent: usize,
    fail_payloads: Vec<Vec<u8>>,
    completed: Vec<Vec<u8>>,
}

/// Scriptable [`VoiceTransport`]: connects succeed unless told otherwise, playback
/// "plays" each file for a fixed duration and records its bytes.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes for the next connect calls, in order; once exhausted connects succeed.
    pub fn script_connects(&self, outcomes: Vec<Result<(), TransportError>>) {
        self.state.lock().connect_outcomes = outcomes.into();
    }

    /// Failed connects still leave the guild joined to `channel`, as a late handshake would.
    pub fn complete_handshake_on_failure(&self, channel: ChannelId) {
        self.state.lock().late_handshake = Some(channel);
    }

    pub fn fail_moves(&self, err: TransportError) {
        self.state.lock().move_failure = Some(err);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    pub fn set_play_duration(&self, duration: Duration) {
        self.state.lock().play_duration = duration;
    }

    pub fn fail_playback_of(&self, audio: Vec<u8>) {
        self.state.lock().fail_payloads.push(audio);
    }

    /// Simulates the bot being kicked from its channel.
    pub fn drop_connection(&self, guild_id: GuildId) {
        self.state.lock().connected.remove(&guild_id);
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    pub fn move_calls(&self) -> usize {
        self.state.lock().move_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    pub fn disconnects(&self) -> Vec<(GuildId, bool)> {
        self.state.lock().disconnects.clone()
    }

    pub fn completed(&self) -> Vec<Vec<u8>> {
        self.state.lock().completed.clone()
    }

    pub fn max_concurrent_plays(&self) -> usize {
        self.state.lock().max_concurrent
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let delay = {
            let mut state = self.state.lock();
            state.connect_calls += 1;
            state.connect_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let outcome = state.connect_outcomes.pop_front().unwrap_or(Ok(()));
        match &outcome {
            Ok(()) => {
                state.connected.insert(guild_id, channel_id);
            }
            Err(_) => {
                if let Some(channel) = state.late_handshake {
                    state.connected.insert(guild_id, channel);
                }
            }
        }
        outcome
    }

    async fn move_to(
        &self,
        session: &VoiceSession,
        channel_id: ChannelId,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.move_calls += 1;
        if let Some(err) = state.move_failure.clone() {
            return Err(err);
        }
        if !state.connected.contains_key(&session.guild_id) {
            return Err(TransportError::NotConnected);
        }
        state.connected.insert(session.guild_id, channel_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId, force: bool) {
        let mut state = self.state.lock();
        state.connected.remove(&guild_id);
        state.disconnects.push((guild_id, force));
    }

    async fn is_connected(&self, session: &VoiceSession) -> bool {
        self.state.lock().connected.get(&session.guild_id) == Some(&session.channel_id)
    }

    async fn is_playing(&self, session: &VoiceSession) -> bool {
        self.state
            .lock()
            .active_plays
            .get(&session.guild_id)
            .is_some_and(|active| *active > 0)
    }

    async fn play(
        &self,
        session: &VoiceSession,
        source: &Path,
    ) -> Result<PlaybackCompletion, TransportError> {
        let audio = std::fs::read(source).map_err(|e| TransportError::Io(e.to_string()))?;
        let guild_id = session.guild_id;

        let duration = {
            let mut state = self.state.lock();
            if state.fail_payloads.contains(&audio) {
                return Err(TransportError::Io("undecodable audio".to_string()));
            }
            let active = state.active_plays.entry(guild_id).or_insert(0);
            *active += 1;
            let active = *active;
            state.max_concurrent = state.max_concurrent.max(active);
            state.play_duration
        };

        let (sender, completion) = oneshot::channel();
        let shared = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            {
                let mut state = shared.lock();
                if let Some(active) = state.active_plays.get_mut(&guild_id) {
                    *active = active.saturating_sub(1);
                }
                state.completed.push(audio);
            }
            let _ = sender.send(());
        });

        Ok(completion)
    }

    async fn stop(&self, _guild_id: GuildId) {
        self.state.lock().stop_calls += 1;
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.state.lock().connected.get(&guild_id).copied()
    }
}
