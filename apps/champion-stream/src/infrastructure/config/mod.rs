//! Configuration Module
//!
//! Configuration loading for the stream service. Values are read once in
//! the composition root; the rest of the crate receives them explicitly.

mod settings;

pub use settings::{
    ChampionSettings, ConfigError, ReconnectSettings, ServerSettings, StreamConfig, Token,
};
