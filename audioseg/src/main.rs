mod cli;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use audioseg_core::{plan_segments, run_with_progress, split_fixed, Config, ProgressEvent};
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::cli::build_cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();
    match matches.subcommand() {
        Some(("segment", sub)) => run_segment(sub),
        Some(("chop", sub)) => run_chop(sub),
        _ => unreachable!("subcommand is required"),
    }
}

fn run_segment(matches: &ArgMatches) -> anyhow::Result<()> {
    let input_path = matches
        .get_one::<PathBuf>("file_path")
        .expect("required argument");
    if !input_path.is_file() {
        return Err(anyhow!(
            "input file does not exist: {}",
            input_path.display()
        ));
    }
    let output_dir = matches
        .get_one::<PathBuf>("output")
        .expect("defaulted argument");

    let mut builder = Config::builder(input_path, output_dir);
    if let Some(&seconds) = matches.get_one::<f64>("window-duration") {
        builder = builder.window_duration(seconds);
    }
    if let Some(&seconds) = matches.get_one::<f64>("step-duration") {
        builder = builder.step_duration(seconds);
    }
    if let Some(&threshold) = matches.get_one::<f64>("threshold") {
        builder = builder.silence_threshold(threshold);
    }
    let config = builder.build().with_context(|| {
        format!(
            "failed to create configuration for '{}'",
            input_path.display()
        )
    })?;

    if matches.get_flag("dry-run") {
        let plan = plan_segments(&config)
            .with_context(|| format!("failed to plan clips for '{}'", input_path.display()))?;

        println!(
            "Dry run: would write {} clip(s) and {}:",
            plan.clip_paths.len(),
            plan.manifest_path.display()
        );
        for path in &plan.clip_paths {
            println!("  {}", path.display());
        }
        return Ok(());
    }

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} windows {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let progress_handle = progress.clone();
    let result = run_with_progress(config, move |event| match event {
        ProgressEvent::Start { total_windows } => {
            progress_handle.set_style(bar_style.clone());
            progress_handle.set_length(total_windows);
            progress_handle.enable_steady_tick(Duration::from_millis(100));
        }
        ProgressEvent::Advance { windows } => {
            progress_handle.set_position(windows);
        }
        ProgressEvent::Finish => {
            progress_handle.set_message(String::from("writing clips"));
        }
    })
    .with_context(|| format!("failed to segment '{}'", input_path.display()));

    progress.finish_and_clear();
    let plan = result?;

    println!(
        "Wrote {} clip(s) and {}",
        plan.clip_paths.len(),
        plan.manifest_path.display()
    );
    Ok(())
}

fn run_chop(matches: &ArgMatches) -> anyhow::Result<()> {
    let path = matches
        .get_one::<PathBuf>("path")
        .expect("required argument");
    let length = *matches
        .get_one::<Duration>("length")
        .expect("defaulted argument");

    let sources = wav_sources(path)?;
    if sources.is_empty() {
        return Err(anyhow!("no .wav files found at {}", path.display()));
    }

    for source in sources {
        let chunks = split_fixed(&source, length)
            .with_context(|| format!("failed to chop '{}'", source.display()))?;
        println!(
            "Chopped {} into {} chunk(s); source removed",
            source.display(),
            chunks.len()
        );
    }
    Ok(())
}

/// Snapshot the files a chop run will touch before any chunk is written,
/// since the chunks land in the directory being listed.
fn wav_sources(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(anyhow!("input path does not exist: {}", path.display()));
    }

    let entries = fs::read_dir(path)
        .with_context(|| format!("failed to read directory '{}'", path.display()))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sources: Vec<PathBuf> = entries
        .into_iter()
        .map(|entry| entry.path())
        .filter(|candidate| {
            candidate.is_file()
                && candidate
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    sources.sort();
    Ok(sources)
}
