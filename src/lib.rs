pub mod core;
pub mod geometry;
pub mod memo;
pub mod config_space;
pub mod graph;
pub mod catalog;
pub mod shape_source;
pub mod placement;
pub mod ledger;
pub mod config;
pub mod engine;
pub mod debug;
pub mod bench;
