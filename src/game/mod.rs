pub mod beat_clock;
pub mod bonus_event;
pub mod chance;
pub mod events;
pub mod judgment;
pub mod schedule;
pub mod session;
pub mod spawn_chain;
pub mod timing_stats;
pub mod timing_windows;
