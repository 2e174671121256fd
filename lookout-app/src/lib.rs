//! Wiring for the `lookout` binary: configuration discovery and the HTTP server.
use std::path::Path;

use lookout_config::{LookoutConfig, LookoutConfigLoader, default_config_path};

pub mod server;

/// Load configuration from `path`, or from `./lookout.yaml` and the user
/// config directory when no path is given. Without any file the environment
/// alone configures the app.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LookoutConfig> {
    let loader = match path {
        Some(p) => LookoutConfigLoader::new().with_file(p),
        None => {
            let mut loader = LookoutConfigLoader::new();
            if let Some(user) = default_config_path() {
                loader = loader.with_optional_file(user);
            }
            loader.with_optional_file("lookout.yaml")
        }
    };
    Ok(loader.load()?)
}
