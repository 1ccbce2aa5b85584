pub mod config;
pub mod config_processors;
pub mod evaluation;
pub mod exemplars;
pub mod io;
pub mod metrics;
pub mod model;
pub mod sampling;
