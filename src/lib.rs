pub mod components;
pub mod config;
pub mod ecs;
pub mod entities;
pub mod error;
pub mod host;
pub mod math;
pub mod network;
pub mod rng;
pub mod scheduler;
pub mod spatial;
pub mod systems;
pub mod web;

pub use config::{Config, ConfigLoader};
pub use error::{Result, SimError};
pub use scheduler::{Game, System, SystemContext, TickStats};
