use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::Notify;
use tracing::{debug, info};

/// One synthesized utterance waiting to be played.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub guild_id: GuildId,
    pub sequence: u64,
    pub audio: Bytes,
    pub enqueued_at: DateTime<Utc>,
}

/// Unbounded FIFO of utterances for one guild.
///
/// Any number of command handlers push; only the guild's playback driver pops.
#[derive(Debug)]
pub struct PlaybackQueue {
    guild_id: GuildId,
    items: Mutex<VecDeque<AudioPayload>>,
    notify: Notify,
    next_sequence: AtomicU64,
}

impl PlaybackQueue {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Agrega audio al final de la cola y devuelve su número de orden
    pub fn push(&self, audio: Bytes) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let payload = AudioPayload {
            guild_id: self.guild_id,
            sequence,
            audio,
            enqueued_at: Utc::now(),
        };

        {
            let mut items = self.items.lock();
            items.push_back(payload);
            debug!("➕ Audio #{} en cola de guild {} ({} pendientes)", sequence, self.guild_id, items.len());
        }
        self.notify.notify_one();

        sequence
    }

    /// Espera (sin sondeo) hasta que haya audio disponible
    pub async fn pop(&self) -> AudioPayload {
        loop {
            let notified = self.notify.notified();
            if let Some(payload) = self.try_pop() {
                return payload;
            }
            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<AudioPayload> {
        self.items.lock().pop_front()
    }

    /// Vacía la cola y devuelve cuántos elementos se descartaron
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.try_pop().is_some() {
            drained += 1;
        }
        if drained > 0 {
            info!("🗑️ Descartados {} audios pendientes en guild {}", drained, self.guild_id);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
