pub mod app;
pub mod audio;
pub mod config;
pub mod mapper;
pub mod playlist;
pub mod policy;
pub mod scheduler;
pub mod terminal;
