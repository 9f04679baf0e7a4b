//! Countdown timers for Armada rooms.
//!
//! A [`Countdown`] runs on a background tokio task, invoking a tick
//! callback once per second with the remaining time and an expiry callback
//! when it reaches zero. Rooms use these for the ready check, round, and
//! turn deadlines, broadcasting each tick to clients so they can render
//! the countdown.
//!
//! Dropping a `Countdown` cancels it, so storing a fresh one in the slot
//! that held the old one restarts the deadline.

mod countdown;

pub use countdown::Countdown;
