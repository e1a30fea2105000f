pub mod config;
pub mod editor;
pub mod formatter;
pub mod models;
pub mod pricing;
pub mod remote;
pub mod snapshot;
