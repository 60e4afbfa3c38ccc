//! Subcommand handlers. Each one drives an [`EngineHandle`] and turns its
//! events into terminal output.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use harvest_core::{ImageFilter, ModelRegistry, SearchDepth, TaskConfig, UnknownAction};
use harvest_engine::{
    advance_task, AtomicFileWriter, AutoConfirm, Confirm, ContentMissPolicy, DeliveryReport,
    EngineConfig, EngineEvent, EngineHandle, ImageJob, ImageRunReport, TextRunOutcome,
    TextRunSettings,
};
use harvest_logging::{harvest_debug, harvest_info, harvest_warn};

use crate::cli::{ImageArgs, ModelsArgs, SettingsArgs, TextArgs};
use crate::confirm::StdinConfirm;
use crate::interrupt::{cancel_on_ctrl_c, INTERRUPTED};
use crate::settings::{save_settings, Settings};

/// Returned when a run finished but some requested chapters are missing.
const INCOMPLETE: u8 = 2;

pub fn text(args: TextArgs, settings: &Settings) -> Result<ExitCode> {
    let task = TaskConfig::load(&args.task)
        .with_context(|| format!("loading task file {}", args.task.display()))?;
    let registry = registry(args.models.as_deref())?;

    let engine = EngineHandle::new(EngineConfig {
        registry,
        text_fetch: settings.text_fetch(),
        probe_fetch: settings.probe_fetch(),
        text: TextRunSettings {
            concurrency: args
                .concurrency
                .map(usize::from)
                .unwrap_or(settings.concurrency),
            miss_policy: if args.skip_missing {
                ContentMissPolicy::SkipChapter
            } else {
                ContentMissPolicy::AbortRun
            },
            output_dir: args
                .output_dir
                .clone()
                .unwrap_or_else(|| settings.output_dir.clone()),
        },
        probe_batch_size: settings.probe_batch_size,
    })?;
    cancel_on_ctrl_c(engine.canceller());

    let confirm: Arc<dyn Confirm> = if args.yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(StdinConfirm)
    };
    engine.run_text(task.clone(), confirm);

    match wait_for_text(&engine)? {
        TextRunOutcome::Finished(report) => {
            print_delivery(&report);
            if !report.is_complete() {
                return Ok(ExitCode::from(INCOMPLETE));
            }
            if args.update_task {
                update_task_file(&args.task, &task, &report)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        TextRunOutcome::NothingToFetch { total } => {
            println!("Nothing to fetch: all {total} chapters are already done.");
            Ok(ExitCode::SUCCESS)
        }
        TextRunOutcome::Declined => {
            println!("Cancelled.");
            Ok(ExitCode::SUCCESS)
        }
        TextRunOutcome::Cancelled(report) => {
            println!(
                "Interrupted after {} of {} chapters; nothing was written.",
                report.delivered, report.requested
            );
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

fn wait_for_text(engine: &EngineHandle) -> Result<TextRunOutcome> {
    while let Some(event) = engine.recv() {
        match event {
            EngineEvent::ChaptersResolved { total, range } => {
                println!(
                    "{total} chapters listed; fetching {} starting at chapter {}",
                    range.count,
                    range.start + 1
                );
            }
            EngineEvent::ChapterProgress { completed, total } => {
                print!("\r{completed}/{total}");
                let _ = io::stdout().flush();
                if completed == total {
                    println!();
                }
            }
            EngineEvent::ChapterFailed { index, reason } => {
                harvest_warn!("Chapter {} dropped: {}", index + 1, reason);
            }
            EngineEvent::TextRunFinished(result) => return result.map_err(|err| anyhow!(err)),
            other => harvest_debug!("{:?}", other),
        }
    }
    bail!("engine stopped before the run finished")
}

fn print_delivery(report: &DeliveryReport) {
    println!(
        "Delivered {} of {} chapters.",
        report.delivered, report.requested
    );
    for (index, reason) in &report.failed {
        println!("  missing chapter {}: {}", index + 1, reason);
    }
    if let Some(output) = &report.output {
        println!("Saved to {}", output.display());
    }
}

fn update_task_file(path: &Path, task: &TaskConfig, report: &DeliveryReport) -> Result<()> {
    let Some(next) = advance_task(task, report) else {
        return Ok(());
    };
    let json = next.to_json_pretty().context("serializing task")?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("task path {} has no file name", path.display()))?;
    AtomicFileWriter::new(dir)
        .write(name, json.as_bytes())
        .with_context(|| format!("updating task file {}", path.display()))?;
    harvest_info!("Task file now resumes at chapter {}", next.last_chapter + 1);
    Ok(())
}

pub fn images(args: ImageArgs, settings: &Settings) -> Result<ExitCode> {
    let depth = SearchDepth::try_from(args.depth)?;
    let filter = image_filter(&args, &settings.image_filter);
    let output_dir = if args.list_only {
        None
    } else {
        Some(
            args.output_dir
                .clone()
                .unwrap_or_else(|| settings.output_dir.clone()),
        )
    };

    let engine = EngineHandle::new(EngineConfig {
        registry: ModelRegistry::builtin(),
        text_fetch: settings.text_fetch(),
        probe_fetch: settings.probe_fetch(),
        text: TextRunSettings::default(),
        probe_batch_size: args
            .batch
            .map(usize::from)
            .unwrap_or(settings.probe_batch_size),
    })?;
    cancel_on_ctrl_c(engine.canceller());

    engine.collect_images(ImageJob {
        seeds: args.urls,
        depth,
        filter,
        output_dir,
    });

    let report = wait_for_images(&engine)?;
    print_images(&report, args.list_only);
    if report.cancelled {
        return Ok(ExitCode::from(INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Settings-file filter with command-line overrides applied.
fn image_filter(args: &ImageArgs, base: &ImageFilter) -> ImageFilter {
    let mut filter = base.clone();
    if let Some(size) = args.min_size {
        filter.size_min = size;
    }
    if let Some(size) = args.max_size {
        filter.size_max = size;
    }
    if let Some(width) = args.min_width {
        filter.width_min = width;
    }
    if let Some(height) = args.min_height {
        filter.height_min = height;
    }
    if !args.types.is_empty() {
        filter.allowed_types = args.types.clone();
    }
    if let Some(pattern) = &args.pattern {
        filter.url_pattern = Some(pattern.clone());
    }
    if args.same_origin {
        filter.same_origin_only = true;
    }
    if args.skip_unknown {
        filter.unknown_size = UnknownAction::Skip;
        filter.unknown_dimension = UnknownAction::Skip;
    }
    filter
}

fn wait_for_images(engine: &EngineHandle) -> Result<ImageRunReport> {
    let mut seen = 0;
    while let Some(event) = engine.recv() {
        match event {
            EngineEvent::ImagesFound(images) => {
                seen += images.len();
                harvest_debug!("{} images found so far", seen);
            }
            EngineEvent::LinksRemaining(remaining) => {
                print!("\r{seen} images found, {remaining} links left   ");
                let _ = io::stdout().flush();
                if remaining == 0 {
                    println!();
                }
            }
            EngineEvent::ImageRunFinished(result) => return result.map_err(|err| anyhow!(err)),
            other => harvest_debug!("{:?}", other),
        }
    }
    bail!("engine stopped before the run finished")
}

fn print_images(report: &ImageRunReport, list_only: bool) {
    if list_only {
        for found in &report.accepted {
            println!("{}", found.image.url);
        }
    }
    println!(
        "{} images found, {} accepted ({} pages scanned, {} links probed, {} probes failed).",
        report.found,
        report.accepted.len(),
        report.pages_scanned,
        report.probes,
        report.probe_failures
    );
    if report.measured > 0 {
        println!(
            "Measured {} images of unknown size, {} failed.",
            report.measured, report.measure_failures
        );
    }
    if !list_only {
        println!("Saved {} images.", report.saved.len());
        for (url, reason) in &report.skipped {
            println!("  skipped {url}: {reason}");
        }
        if let Some(manifest) = &report.manifest {
            println!("Manifest: {}", manifest.display());
        }
    }
    if report.cancelled {
        println!("Interrupted; results are partial.");
    }
}

pub fn models(args: ModelsArgs) -> Result<ExitCode> {
    let registry = registry(args.models.as_deref())?;
    for name in registry.names() {
        let model = registry.get(name)?;
        println!("{name}\t{}", model.base_url());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn settings(args: SettingsArgs, settings: &Settings, path: &Path) -> Result<ExitCode> {
    let pretty = ron::ser::PrettyConfig::new();
    println!("{}", ron::ser::to_string_pretty(settings, pretty)?);
    if args.save {
        if !save_settings(path, settings) {
            bail!("could not write {}", path.display());
        }
        println!("Written to {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

/// Built-in models, overridden by those in `extra` when given.
fn registry(extra: Option<&Path>) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::builtin();
    if let Some(path) = extra {
        let loaded = ModelRegistry::load_file(path)
            .with_context(|| format!("loading models from {}", path.display()))?;
        harvest_info!("Loaded {} models from {:?}", loaded.len(), path);
        registry.merge(loaded);
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, Command};
    use clap::Parser;
    use harvest_core::ImageKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn image_args(extra: &[&str]) -> ImageArgs {
        let mut argv = vec!["harvest", "images", "http://x.com"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Command::Images(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_override_the_settings_filter() {
        let args = image_args(&[
            "--min-width",
            "10",
            "--type",
            "gif",
            "--pattern",
            "cdn",
            "--skip-unknown",
        ]);
        let filter = image_filter(&args, &ImageFilter::default());

        assert_eq!(filter.width_min, 10);
        assert_eq!(filter.height_min, ImageFilter::default().height_min);
        assert_eq!(filter.allowed_types, vec![ImageKind::Gif]);
        assert_eq!(filter.url_pattern.as_deref(), Some("cdn"));
        assert_eq!(filter.unknown_size, UnknownAction::Skip);
        assert_eq!(filter.unknown_dimension, UnknownAction::Skip);
    }

    #[test]
    fn no_flags_keep_the_settings_filter() {
        let base = ImageFilter {
            size_min: 1,
            same_origin_only: true,
            ..ImageFilter::default()
        };
        assert_eq!(image_filter(&image_args(&[]), &base), base);
    }

    #[test]
    fn model_file_extends_the_builtins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        fs::write(
            &path,
            r##"{"mine": {"web": "http://m.com", "chapscope": "#list", "chapurl": "\\d+", "content": "#c"}}"##,
        )
        .unwrap();

        let registry = registry(Some(&path)).unwrap();
        assert!(registry.get("mine").is_ok());
        assert!(registry.get("biquge").is_ok());
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = registry(Some(&dir.path().join("none.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("loading models"));
    }

    #[test]
    fn task_file_is_advanced_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("task.json");
        let task = TaskConfig::from_json(
            r#"{"model":"biquge","rootpage":"http://x.com/list.html","store":"b.txt","lastchap":0,"chaperlength":2}"#,
        )
        .unwrap();
        fs::write(&path, task.to_json_pretty().unwrap()).unwrap();
        let report = DeliveryReport {
            total_chapters: 5,
            range: harvest_core::ChapterRange {
                start: 0,
                end: 2,
                count: 2,
            },
            requested: 2,
            delivered: 2,
            failed: Vec::new(),
            output: Some(dir.path().join("b.txt")),
        };

        update_task_file(&path, &task, &report).unwrap();

        let updated = TaskConfig::load(&path).unwrap();
        assert_eq!(updated.last_chapter, 2);
        assert_eq!(updated.store, "b.txt");
    }
}
