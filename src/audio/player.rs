use std::{io::Write, sync::Arc, time::Duration};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        queue::AudioPayload,
        transport::{VoiceSession, VoiceTransport},
    },
    error::PlaybackError,
    voice::state::GuildAudioState,
};

/// Handle to a running playback loop, tagged with the session it plays into.
#[derive(Debug)]
pub struct PlaybackTask {
    generation: u64,
    handle: JoinHandle<()>,
}

impl PlaybackTask {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Spawns and supervises the per-guild playback loops.
pub struct AudioPlayer {
    transport: Arc<dyn VoiceTransport>,
    poll_interval: Duration,
}

impl AudioPlayer {
    pub fn new(transport: Arc<dyn VoiceTransport>, poll_interval: Duration) -> Self {
        Self {
            transport,
            poll_interval,
        }
    }

    /// Makes sure exactly one loop is draining the guild's queue into `session`.
    ///
    /// Returns `true` when a new loop was spawned. A live loop for the same session is
    /// left alone; a loop serving an older session is aborted and replaced. Finished
    /// loops are never restarted, a fresh task takes their place.
    pub fn ensure_running(&self, state: &Arc<GuildAudioState>, session: VoiceSession) -> bool {
        let mut slot = state.driver_slot();

        if let Some(task) = slot.as_ref() {
            if !task.is_finished() {
                if task.generation() == session.generation {
                    return false;
                }
                debug!(
                    "Reemplazando driver de la sesión #{} por la sesión #{} en guild {}",
                    task.generation(),
                    session.generation,
                    session.guild_id
                );
                task.abort();
            }
        }

        let handle = tokio::spawn(playback_loop(
            self.transport.clone(),
            state.clone(),
            session,
            self.poll_interval,
        ));
        *slot = Some(PlaybackTask {
            generation: session.generation,
            handle,
        });

        true
    }
}

async fn playback_loop(
    transport: Arc<dyn VoiceTransport>,
    state: Arc<GuildAudioState>,
    session: VoiceSession,
    poll_interval: Duration,
) {
    info!(
        "▶️ Driver de reproducción iniciado en guild {} (sesión #{})",
        session.guild_id, session.generation
    );

    loop {
        if !transport.is_connected(&session).await {
            break;
        }

        let payload = state.queue().pop().await;

        if !transport.is_connected(&session).await {
            // El audio pertenece a la sesión caída; no se reproduce en la siguiente
            debug!(
                "Descartando audio #{} de la sesión #{} en guild {}",
                payload.sequence, session.generation, session.guild_id
            );
            break;
        }

        if let Err(e) = play_one(transport.as_ref(), &session, &payload, poll_interval).await {
            warn!(
                "⚠️ Error reproduciendo audio #{} en guild {}: {}",
                payload.sequence, session.guild_id, e
            );
        }

        if state.queue().is_empty() {
            debug!("Cola vacía en guild {}, esperando audio", session.guild_id);
        }
    }

    info!(
        "⏹️ Driver de reproducción detenido en guild {} (sesión #{})",
        session.guild_id, session.generation
    );
}

async fn play_one(
    transport: &dyn VoiceTransport,
    session: &VoiceSession,
    payload: &AudioPayload,
    poll_interval: Duration,
) -> Result<(), PlaybackError> {
    while transport.is_playing(session).await {
        tokio::time::sleep(poll_interval).await;
    }

    let staged = stage_audio(&payload.audio)?;
    let completion = transport.play(session, staged.path()).await?;
    debug!("🎵 Reproduciendo audio #{} en guild {}", payload.sequence, session.guild_id);

    if completion.await.is_err() {
        debug!(
            "El transporte descartó la notificación de fin del audio #{}",
            payload.sequence
        );
    }

    release(staged);
    Ok(())
}

fn stage_audio(audio: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("vv-")
        .suffix(".wav")
        .tempfile()?;
    file.write_all(audio)?;
    file.flush()?;
    Ok(file)
}

fn release(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!("No se pudo borrar el archivo temporal {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::FakeTransport, tts::params::VoiceProfile};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};

    const GUILD: GuildId = GuildId::new(10);
    const CHANNEL: ChannelId = ChannelId::new(20);

    async fn setup() -> (Arc<FakeTransport>, Arc<GuildAudioState>, VoiceSession, AudioPlayer) {
        let transport = Arc::new(FakeTransport::new());
        transport.set_play_duration(Duration::from_millis(5));
        transport
            .connect(GUILD, CHANNEL, Duration::from_secs(1))
            .await
            .unwrap();

        let state = Arc::new(GuildAudioState::new(GUILD, VoiceProfile::new("a", "b")));
        let session = VoiceSession {
            guild_id: GUILD,
            channel_id: CHANNEL,
            generation: 1,
        };
        let player = AudioPlayer::new(transport.clone(), Duration::from_millis(1));
        (transport, state, session, player)
    }

    async fn wait_for_plays(transport: &FakeTransport, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while transport.completed().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("playback should finish");
    }

    #[tokio::test]
    async fn test_plays_in_enqueue_order_without_overlap() {
        let (transport, state, session, player) = setup().await;

        for i in 0..8u8 {
            state.queue().push(Bytes::from(vec![i]));
        }
        assert!(player.ensure_running(&state, session));

        wait_for_plays(&transport, 8).await;

        let expected: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i]).collect();
        assert_eq!(transport.completed(), expected);
        assert_eq!(transport.max_concurrent_plays(), 1);
    }

    #[tokio::test]
    async fn test_failed_item_does_not_stall_queue() {
        let (transport, state, session, player) = setup().await;
        transport.fail_playback_of(vec![0xBA, 0xD0]);

        state.queue().push(Bytes::from_static(&[1]));
        state.queue().push(Bytes::from_static(&[0xBA, 0xD0]));
        state.queue().push(Bytes::from_static(&[2]));
        player.ensure_running(&state, session);

        wait_for_plays(&transport, 2).await;

        assert_eq!(transport.completed(), vec![vec![1], vec![2]]);
        assert!(state.has_live_driver());
    }

    #[tokio::test]
    async fn test_ensure_running_is_idempotent() {
        let (_transport, state, session, player) = setup().await;

        assert!(player.ensure_running(&state, session));
        assert!(!player.ensure_running(&state, session));
        assert!(!player.ensure_running(&state, session));
        assert!(state.has_live_driver());
    }

    #[tokio::test]
    async fn test_driver_stops_when_disconnected_and_discards_item() {
        let (transport, state, session, player) = setup().await;

        player.ensure_running(&state, session);
        // Let the loop park on the empty queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.disconnect(GUILD, true).await;
        // Wake the idle loop so it notices the dropped session.
        state.queue().push(Bytes::from_static(&[7]));

        tokio::time::timeout(Duration::from_secs(1), async {
            while state.has_live_driver() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("driver should stop");

        assert!(state.queue().is_empty());

        transport
            .connect(GUILD, CHANNEL, Duration::from_secs(1))
            .await
            .unwrap();
        let next = VoiceSession {
            generation: 2,
            ..session
        };
        assert!(player.ensure_running(&state, next));
        state.queue().push(Bytes::from_static(&[8]));

        wait_for_plays(&transport, 1).await;
        assert_eq!(transport.completed(), vec![vec![8]]);
    }

    #[tokio::test]
    async fn test_waits_for_transport_to_finish_current_track() {
        let (transport, state, session, player) = setup().await;
        transport.set_play_duration(Duration::from_millis(40));

        // A track started outside the driver is still playing.
        let busy = stage_audio(&[1]).unwrap();
        let _completion = transport.play(&session, busy.path()).await.unwrap();

        state.queue().push(Bytes::from_static(&[2]));
        player.ensure_running(&state, session);

        wait_for_plays(&transport, 2).await;
        assert_eq!(transport.completed(), vec![vec![1], vec![2]]);
        assert_eq!(transport.max_concurrent_plays(), 1);
    }

    #[tokio::test]
    async fn test_new_session_replaces_old_driver() {
        let (_transport, state, session, player) = setup().await;

        player.ensure_running(&state, session);
        let newer = VoiceSession {
            generation: 2,
            ..session
        };
        assert!(player.ensure_running(&state, newer));
        assert_eq!(state.driver_slot().as_ref().unwrap().generation(), 2);
    }

    #[test]
    fn test_staged_audio_is_removed_on_release() {
        let staged = stage_audio(b"RIFF").unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");

        release(staged);
        assert!(!path.exists());
    }
}
