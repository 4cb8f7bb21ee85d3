pub mod models;
pub mod phase_timer;
pub mod settings;
pub mod time_tracking;
pub mod timestamp;
