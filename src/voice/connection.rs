use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{info, warn};

use super::state::SessionSlot;
use crate::{
    audio::transport::{VoiceSession, VoiceTransport},
    error::{ConnectError, TransportError},
};

/// How hard to try before giving up on a voice handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): `base * attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            connect_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Owns every transition of a guild's voice session.
///
/// Callers pass the slot they obtained from [`GuildAudioState::lock_session`], so
/// the whole inspect-then-act sequence runs under one acquisition of the connect lock.
///
/// [`GuildAudioState::lock_session`]: super::state::GuildAudioState::lock_session
pub struct ConnectionManager {
    transport: Arc<dyn VoiceTransport>,
    policy: RetryPolicy,
    next_generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn VoiceTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Returns a connected session for `target`, reusing, moving or creating one.
    pub async fn ensure_connected(
        &self,
        guild_id: GuildId,
        slot: &mut SessionSlot,
        target: ChannelId,
    ) -> Result<VoiceSession, ConnectError> {
        if let Some(session) = *slot {
            if self.transport.is_connected(&session).await {
                if session.channel_id == target {
                    return Ok(session);
                }

                match self
                    .transport
                    .move_to(&session, target, self.policy.connect_timeout)
                    .await
                {
                    Ok(()) => {
                        let moved = VoiceSession {
                            channel_id: target,
                            ..session
                        };
                        *slot = Some(moved);
                        info!(
                            "🔀 Sesión #{} movida al canal {} en guild {}",
                            moved.generation, target, guild_id
                        );
                        return Ok(moved);
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ No se pudo mover la sesión #{} en guild {}: {}",
                            session.generation, guild_id, e
                        );
                    }
                }
            } else {
                warn!(
                    "🔌 La sesión #{} de guild {} ya no está conectada",
                    session.generation, guild_id
                );
            }

            self.transport.disconnect(guild_id, true).await;
            *slot = None;
        }

        let session = self.connect_fresh(guild_id, target).await?;
        *slot = Some(session);
        Ok(session)
    }

    /// Leaves the guild's channel. Returns whether a session was recorded.
    pub async fn disconnect(&self, guild_id: GuildId, slot: &mut SessionSlot) -> bool {
        let had_session = slot.take().is_some();
        self.transport.disconnect(guild_id, false).await;
        had_session
    }

    /// Whether the recorded session is still live according to the transport.
    pub async fn is_live(&self, slot: &SessionSlot) -> Option<VoiceSession> {
        match slot {
            Some(session) if self.transport.is_connected(session).await => Some(*session),
            _ => None,
        }
    }

    async fn connect_fresh(
        &self,
        guild_id: GuildId,
        target: ChannelId,
    ) -> Result<VoiceSession, ConnectError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_cause = TransportError::NotConnected;

        for attempt in 1..=max_attempts {
            match self
                .transport
                .connect(guild_id, target, self.policy.connect_timeout)
                .await
            {
                Ok(()) => return Ok(self.new_session(guild_id, target)),
                Err(e) if e.is_transient() => {
                    warn!(
                        "⚠️ Intento {}/{} de conexión fallido en guild {}: {}",
                        attempt, max_attempts, guild_id, e
                    );
                    last_cause = e;

                    if attempt < max_attempts {
                        // Descarta la sesión a medio abrir (p. ej. 4006) antes de reintentar
                        self.transport.disconnect(guild_id, true).await;
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
                Err(e) => {
                    warn!("❌ Conexión rechazada en guild {}: {}", guild_id, e);
                    return Err(ConnectError {
                        last_cause: e,
                        attempts: attempt,
                    });
                }
            }
        }

        // El handshake pudo completarse del lado remoto pese al error local
        if self.transport.current_channel(guild_id).await == Some(target) {
            info!(
                "🩹 Conexión en guild {} confirmada tras {} intentos fallidos",
                guild_id, max_attempts
            );
            return Ok(self.new_session(guild_id, target));
        }

        Err(ConnectError {
            last_cause,
            attempts: max_attempts,
        })
    }

    fn new_session(&self, guild_id: GuildId, channel_id: ChannelId) -> VoiceSession {
        let session = VoiceSession {
            guild_id,
            channel_id,
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
        };
        info!(
            "🔊 Sesión #{} creada en canal {} de guild {}",
            session.generation, channel_id, guild_id
        );
        session
    }
}
