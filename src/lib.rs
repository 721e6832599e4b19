pub mod agent;
pub mod config;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod project;
pub mod sections;
pub mod settings;
pub mod ui;
pub mod usage;
pub mod util;
pub mod validate;
