pub mod config;
pub mod logging;

pub mod api;
pub mod fetch;
pub mod install;
pub mod job;
pub mod poller;
pub mod registry;
pub mod storage;
pub mod task;
