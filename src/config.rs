//! Configuration for the server, the world and the physics constants

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::Dimension2D;
use crate::rng::JitterRange;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_tick_rate_hz() -> f64 {
    120.0
}

fn default_max_players() -> usize {
    8
}

fn default_session_grace_ms() -> u64 {
    30_000
}

fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            world: WorldConfig::default(),
            physics: PhysicsConfig::default(),
            network: NetworkConfig::default(),
            seed: default_seed(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: f64,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Assigned sessions that never open a socket are released after this long.
    #[serde(default = "default_session_grace_ms")]
    pub session_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_rate_hz: default_tick_rate_hz(),
            max_players: default_max_players(),
            session_grace_ms: default_session_grace_ms(),
        }
    }
}

impl ServerConfig {
    /// Nominal tick length in milliseconds.
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.tick_rate_hz
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadPhaseKind {
    #[default]
    Grid,
    QuadTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub broad_phase: BroadPhaseKind,
    pub cell_width: f64,
    pub cell_height: f64,
    pub quad_tree_max_levels: usize,
    pub quad_tree_split_threshold: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 800.0,
            broad_phase: BroadPhaseKind::Grid,
            cell_width: 30.0,
            cell_height: 30.0,
            quad_tree_max_levels: 10,
            quad_tree_split_threshold: 10,
        }
    }
}

impl WorldConfig {
    pub fn dimension(&self) -> Dimension2D {
        Dimension2D::new(self.width, self.height)
    }

    pub fn cell_dimension(&self) -> Dimension2D {
        Dimension2D::new(self.cell_width, self.cell_height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: f64,
    pub player_move_velocity: f64,
    pub player_jump_acceleration: f64,
    pub player_jump_initial_velocity: f64,
    pub max_jump_time_ms: f64,
    pub terminal_velocity: f64,
    pub player_mass: f64,
    pub player_moment: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.0075,
            player_move_velocity: 1.0,
            player_jump_acceleration: -0.01,
            player_jump_initial_velocity: -0.9,
            max_jump_time_ms: 150.0,
            terminal_velocity: 4.5,
            player_mass: 10.0,
            player_moment: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub publish_interval_ms: JitterRange,
    pub player_update_interval_ms: JitterRange,
    pub floor_update_interval_ms: JitterRange,
    pub reconcile_threshold: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: JitterRange::new(0.0, 50.0),
            player_update_interval_ms: JitterRange::new(0.0, 50.0),
            floor_update_interval_ms: JitterRange::new(0.0, 500.0),
            reconcile_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(data: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("world.width", self.world.width),
            ("world.height", self.world.height),
            ("world.cell_width", self.world.cell_width),
            ("world.cell_height", self.world.cell_height),
            ("server.tick_rate_hz", self.server.tick_rate_hz),
            ("physics.player_mass", self.physics.player_mass),
            ("physics.player_moment", self.physics.player_moment),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.server.max_players == 0 {
            return Err(ConfigError::Validation(
                "server.max_players must be at least 1".to_string(),
            ));
        }
        if self.server.session_grace_ms == 0 {
            return Err(ConfigError::Validation(
                "server.session_grace_ms must be positive".to_string(),
            ));
        }
        if self.world.quad_tree_max_levels == 0 {
            return Err(ConfigError::Validation(
                "world.quad_tree_max_levels must be at least 1".to_string(),
            ));
        }
        let ranges = [
            ("network.publish_interval_ms", self.network.publish_interval_ms),
            ("network.player_update_interval_ms", self.network.player_update_interval_ms),
            ("network.floor_update_interval_ms", self.network.floor_update_interval_ms),
        ];
        for (name, range) in ranges {
            if !range.is_valid() {
                return Err(ConfigError::Validation(format!(
                    "{name} must satisfy 0 <= min <= max, got {}..{}",
                    range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)?;
        Config::from_yaml_str(&data)
    }
}
