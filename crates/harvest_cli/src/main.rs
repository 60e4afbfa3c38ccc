mod cli;
mod commands;
mod confirm;
mod interrupt;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use harvest_logging::{harvest_debug, harvest_error, harvest_warn, LogDestination};
use log::LevelFilter;

use crate::cli::{Args, Command};
use crate::settings::{load_settings, settings_path, Settings};

fn main() -> ExitCode {
    let args = Args::parse();
    let path = settings_path(args.settings.as_deref());
    let loaded = load_settings(&path);
    let log_to_file = args.log_file || loaded.as_ref().is_ok_and(|settings| settings.log_to_file);

    harvest_logging::initialize(
        if log_to_file {
            LogDestination::Both
        } else {
            LogDestination::Terminal
        },
        level_for(args.verbose),
    );

    let settings = match loaded {
        Ok(settings) => settings,
        Err(problem) => {
            harvest_warn!("{}", problem);
            Settings::default()
        }
    };
    harvest_debug!("Settings: {:?}", settings);

    let result = match args.command {
        Command::Text(text) => commands::text(text, &settings),
        Command::Images(images) => commands::images(images, &settings),
        Command::Models(models) => commands::models(models),
        Command::Settings(options) => commands::settings(options, &settings, &path),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            harvest_error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
