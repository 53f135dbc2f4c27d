use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, TryLockError};
use tracing::debug;

use crate::{
    audio::{player::PlaybackTask, queue::PlaybackQueue, transport::VoiceSession},
    tts::params::VoiceProfile,
};

/// Slot holding the guild's voice session; only reachable through the connect lock.
pub type SessionSlot = Option<VoiceSession>;

/// Everything one guild owns: its session slot, audio queue, playback task and voice.
#[derive(Debug)]
pub struct GuildAudioState {
    connect_lock: AsyncMutex<SessionSlot>,
    queue: PlaybackQueue,
    driver: Mutex<Option<PlaybackTask>>,
    profile: RwLock<VoiceProfile>,
}

impl GuildAudioState {
    pub fn new(guild_id: GuildId, profile: VoiceProfile) -> Self {
        Self {
            connect_lock: AsyncMutex::new(None),
            queue: PlaybackQueue::new(guild_id),
            driver: Mutex::new(None),
            profile: RwLock::new(profile),
        }
    }

    /// Acquires the guild's connect lock.
    ///
    /// Every inspect-then-act on the session (connect, move, disconnect, starting a
    /// driver for it) must happen while the guard is alive.
    pub async fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        self.connect_lock.lock().await
    }

    pub fn try_lock_session(&self) -> Result<MutexGuard<'_, SessionSlot>, TryLockError> {
        self.connect_lock.try_lock()
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub(crate) fn driver_slot(&self) -> parking_lot::MutexGuard<'_, Option<PlaybackTask>> {
        self.driver.lock()
    }

    /// Whether a playback task is currently alive for this guild.
    #[cfg(test)]
    pub fn has_live_driver(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Aborts the playback task if one exists. Returns `true` if a live task was cancelled.
    pub fn cancel_driver(&self) -> bool {
        match self.driver.lock().take() {
            Some(task) => {
                let was_live = !task.is_finished();
                task.abort();
                was_live
            }
            None => false,
        }
    }

    /// Cancels the playback task and empties the queue.
    ///
    /// Returns whether a live task was cancelled and how many payloads were dropped.
    pub fn discard_audio(&self) -> (bool, usize) {
        let task_cancelled = self.cancel_driver();
        let drained = self.queue.drain();
        (task_cancelled, drained)
    }

    /// Copy of the current voice profile, as used for one synthesis call.
    pub fn profile(&self) -> VoiceProfile {
        self.profile.read().clone()
    }

    pub fn update_profile<R>(&self, f: impl FnOnce(&mut VoiceProfile) -> R) -> R {
        f(&mut self.profile.write())
    }
}

/// Per-guild state, created the first time a guild is touched.
pub struct GuildRegistry {
    guilds: DashMap<GuildId, Arc<GuildAudioState>>,
    default_profile: VoiceProfile,
}

impl GuildRegistry {
    pub fn new(default_profile: VoiceProfile) -> Self {
        Self {
            guilds: DashMap::new(),
            default_profile,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildAudioState> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Creando estado de audio para guild {}", guild_id);
                Arc::new(GuildAudioState::new(guild_id, self.default_profile.clone()))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildAudioState>> {
        self.guilds.get(&guild_id).map(|state| state.clone())
    }

    pub fn default_profile(&self) -> &VoiceProfile {
        &self.default_profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::params::ParamKind;

    fn registry() -> GuildRegistry {
        GuildRegistry::new(VoiceProfile::new("春日部つむぎ", "ノーマル"))
    }

    #[test]
    fn test_registry_returns_same_state_per_guild() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(1));
        let c = registry.get_or_create(GuildId::new(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(registry.get(GuildId::new(3)).is_none());
    }

    #[test]
    fn test_profiles_are_independent_per_guild() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(2));

        a.update_profile(|p| p.params.set(ParamKind::Speed, 2.0));
        a.update_profile(|p| p.speaker_name = "四国めたん".to_string());

        assert_eq!(a.profile().params.speed, 2.0);
        assert_eq!(a.profile().speaker_name, "四国めたん");
        assert_eq!(b.profile(), *registry.default_profile());
    }

    #[tokio::test]
    async fn test_connect_lock_is_exclusive() {
        let state = GuildAudioState::new(GuildId::new(1), VoiceProfile::new("a", "b"));
        let guard = state.lock_session().await;
        assert!(state.try_lock_session().is_err());
        drop(guard);
        assert!(state.try_lock_session().is_ok());
    }

    #[test]
    fn test_cancel_without_driver_is_noop() {
        let state = GuildAudioState::new(GuildId::new(1), VoiceProfile::new("a", "b"));
        assert!(!state.cancel_driver());
        assert!(!state.has_live_driver());
    }

    #[test]
    fn test_discard_audio_empties_queue() {
        let state = GuildAudioState::new(GuildId::new(1), VoiceProfile::new("a", "b"));
        state.queue().push(bytes::Bytes::from_static(b"x"));
        state.queue().push(bytes::Bytes::from_static(b"y"));

        assert_eq!(state.discard_audio(), (false, 2));
        assert!(state.queue().is_empty());
    }
}
