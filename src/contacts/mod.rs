//! Contacts: one durable record per person talking to the bot.

pub mod locks;
pub mod model;

pub use locks::{ContactGuard, ContactLocks};
pub use model::{Contact, ContactMode, ContactProfile, ModeTransitionError, Segment};
