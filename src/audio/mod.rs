//! # Audio Module
//!
//! Playback of synthesized speech in Discord voice channels.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback Queue
//! - Unbounded FIFO per guild, many producers and a single consumer
//! - The consumer suspends while the queue is empty
//!
//! ### [`player`] - Playback Driver
//! - One loop per guild that plays queued utterances strictly one after another
//! - Each utterance is staged in a temporary `.wav` file that is removed once played
//!
//! ### [`transport`] - Voice Transport
//! - The operations the bot needs from a voice backend
//! - [`songbird_transport`] implements them on top of songbird, with the
//!   event handlers from [`events`]

pub mod events;
pub mod player;
pub mod queue;
pub mod songbird_transport;
pub mod transport;
