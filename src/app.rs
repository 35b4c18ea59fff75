use std::path::PathBuf;

use crate::cli::OutputMode;
use crate::config::Config;
use crate::error::Result;

pub struct AppContext {
    pub config_path: Option<PathBuf>,
    pub config: Config,
    pub output_mode: OutputMode,
    pub verbosity: u8,
}

impl AppContext {
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Ok(Self {
            config_path: cli.config.clone(),
            config,
            output_mode: cli.output_mode(),
            verbosity: cli.verbose,
        })
    }

    #[must_use]
    pub const fn robot_mode(&self) -> bool {
        matches!(self.output_mode, OutputMode::Robot)
    }
}
