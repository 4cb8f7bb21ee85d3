pub mod bootstrap;
pub mod commands;
pub mod focus_session;
pub mod refresh;
pub mod summary;
