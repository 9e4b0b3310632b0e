pub mod config;
pub mod logging;

pub mod control;
pub mod host_policy;
pub mod job;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod transfer;
