//! Terminal front end for the cpuwatch engine.

pub mod app;
pub mod chart;
pub mod cli;
pub mod settings;
pub mod store;
