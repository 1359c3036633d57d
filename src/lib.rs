pub mod calibrator;
pub mod config;
pub mod ev;
pub mod export;
pub mod fair;
pub mod haircut;
pub mod logging;
pub mod odds;
pub mod pipeline;
pub mod simulator;
pub mod tracker;
