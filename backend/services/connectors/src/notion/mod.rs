pub mod activities;
pub mod client;
pub mod models;
pub mod render;
pub mod sync;
