//! Command-line definitions.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use harvest_core::ImageKind;

/// Scrape serialized novels into text files and collect images from web pages.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file (RON). Defaults to ./harvest.ron when present.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Also write the log to ./harvest.log
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the chapters described by a task file into one text file
    Text(TextArgs),
    /// Find images on pages (and optionally the pages they link to)
    Images(ImageArgs),
    /// List the available site models
    Models(ModelsArgs),
    /// Print the effective settings
    Settings(SettingsArgs),
}

#[derive(ClapArgs, Debug)]
pub struct TextArgs {
    /// Task file (JSON)
    pub task: PathBuf,

    /// Extra site models (JSON) merged over the built-in ones
    #[arg(long)]
    pub models: Option<PathBuf>,

    /// Chapters fetched at the same time (1-64)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: Option<u16>,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Skip chapters whose page lacks the content block instead of aborting
    #[arg(long)]
    pub skip_missing: bool,

    /// Directory the task's `store` path is relative to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// After a complete run, move `lastchap` in the task file past the fetched chapters
    #[arg(long)]
    pub update_task: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ImageArgs {
    /// Seed page URLs
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// 0: page only, 1: probe links, 2: also parse linked pages
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub depth: u8,

    /// Directory to save images into
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Print accepted images without downloading them
    #[arg(long)]
    pub list_only: bool,

    /// Links probed per batch
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=100))]
    pub batch: Option<u16>,

    /// Minimum size in bytes
    #[arg(long)]
    pub min_size: Option<u64>,

    /// Maximum size in bytes (0 for no limit)
    #[arg(long)]
    pub max_size: Option<u64>,

    /// Minimum width in pixels
    #[arg(long)]
    pub min_width: Option<u32>,

    /// Minimum height in pixels
    #[arg(long)]
    pub min_height: Option<u32>,

    /// Only keep these types (jpeg, png, gif, bmp); repeatable
    #[arg(long = "type", value_parser = parse_kind)]
    pub types: Vec<ImageKind>,

    /// Only keep image URLs matching this regex
    #[arg(long)]
    pub pattern: Option<String>,

    /// Only keep images from the seed page's origin
    #[arg(long)]
    pub same_origin: bool,

    /// Drop images whose size or dimensions are unknown
    #[arg(long)]
    pub skip_unknown: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ModelsArgs {
    /// Extra site models (JSON) merged over the built-in ones
    #[arg(long)]
    pub models: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct SettingsArgs {
    /// Write the effective settings to the settings file
    #[arg(long)]
    pub save: bool,
}

fn parse_kind(raw: &str) -> Result<ImageKind, String> {
    match raw.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Ok(ImageKind::Jpeg),
        "png" => Ok(ImageKind::Png),
        "gif" => Ok(ImageKind::Gif),
        "bmp" => Ok(ImageKind::Bmp),
        other => Err(format!("unknown image type `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_command_parses_flags() {
        let args = Args::try_parse_from([
            "harvest", "text", "task.json", "-j", "3", "-y", "--skip-missing", "--update-task",
        ])
        .unwrap();
        let Command::Text(text) = args.command else {
            panic!("expected text command");
        };
        assert_eq!(text.task, PathBuf::from("task.json"));
        assert_eq!(text.concurrency, Some(3));
        assert!(text.yes && text.skip_missing && text.update_task);
    }

    #[test]
    fn concurrency_is_bounded() {
        let result = Args::try_parse_from(["harvest", "text", "task.json", "-j", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn images_command_requires_a_url() {
        let err = Args::try_parse_from(["harvest", "images"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn image_types_and_depth_parse() {
        let args = Args::try_parse_from([
            "harvest", "images", "http://x.com", "-d", "2", "--type", "png", "--type", "JPG",
        ])
        .unwrap();
        let Command::Images(images) = args.command else {
            panic!("expected images command");
        };
        assert_eq!(images.depth, 2);
        assert_eq!(images.types, vec![ImageKind::Png, ImageKind::Jpeg]);
        assert!(Args::try_parse_from(["harvest", "images", "http://x.com", "-d", "3"]).is_err());
        assert!(Args::try_parse_from(["harvest", "images", "http://x.com", "--type", "tiff"]).is_err());
    }

    #[test]
    fn verbose_is_global() {
        let args = Args::try_parse_from(["harvest", "models", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }
}
