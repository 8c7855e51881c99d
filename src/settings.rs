use std::path::Path;

use framefetch_lib::{Config, ExtractError};

use crate::cli::ExtractArgs;

/// Load config from a TOML file, `$FRAMEFETCH_CONFIG`, or return defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ExtractError> {
    let cfg = Config::load(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Merge CLI arguments over the config file; a flag wins only when given.
pub fn resolve_extract_settings(mut config: Config, args: &ExtractArgs) -> Config {
    if let Some(name) = &args.frame_name {
        config.frame_name = name.clone();
    }
    if let Some(settle) = args.settle_delay {
        config.timeouts.settle = settle;
    }
    if let Some(frame_load) = args.frame_timeout {
        config.timeouts.frame_load = frame_load;
    }
    if let Some(download) = args.download_timeout {
        config.timeouts.download = download;
    }
    if let Some(navigation) = args.nav_timeout {
        config.timeouts.navigation = navigation;
    }
    if let Some(max) = args.max_concurrent {
        config.max_concurrent_sessions = max;
    }
    if args.headed {
        config.browser.headless = false;
    }
    config
}
