use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use hound::{SampleFormat, WavSpec, WavWriter};
use predicates::prelude::*;
use tempfile::tempdir;

/// Write a 16-bit mono WAV fixture from raw samples.
///
/// Fixtures are synthesized at runtime so no binary assets live in the
/// repository.
fn write_fixture<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    samples: &[i16],
) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// One second of quiet followed by one second of a loud 440 Hz tone.
fn quiet_then_tone(sample_rate: u32) -> Vec<i16> {
    let mut samples = vec![0i16; sample_rate as usize];
    let amplitude = i16::MAX as f32 * 0.5;
    for n in 0..sample_rate {
        let theta = (n as f32 / sample_rate as f32) * 2.0 * std::f32::consts::PI * 440.0;
        samples.push((theta.sin() * amplitude) as i16);
    }
    samples
}

#[test]
fn segment_writes_clips_and_manifest() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    let input_path = input_dir.path().join("speech.wav");
    write_fixture(&input_path, 8_000, &quiet_then_tone(8_000))?;

    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    cmd.arg("segment")
        .arg(&input_path)
        .arg("--output")
        .arg(output_dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 clip(s)"));

    assert!(output_dir.path().join("speech_000.wav").is_file());
    assert!(output_dir.path().join("speech_001.wav").is_file());

    let manifest = fs::read_to_string(output_dir.path().join("speech.json"))?;
    assert!(manifest.starts_with(r#"{"0":["00:00:00.001","#));
    assert!(manifest.ends_with(r#","00"]}"#));

    output_dir.close()?;
    input_dir.close()?;
    Ok(())
}

#[test]
fn segment_dry_run_prints_plan_without_creating_files() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    let input_path = input_dir.path().join("speech.wav");
    write_fixture(&input_path, 8_000, &quiet_then_tone(8_000))?;

    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    let assert = cmd
        .arg("segment")
        .arg(&input_path)
        .arg("--output")
        .arg(output_dir.path())
        .arg("--dry-run")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("Dry run: would write 2 clip(s)"));
    for name in ["speech_000.wav", "speech_001.wav"] {
        let needle = format!("  {}", output_dir.path().join(name).display());
        assert!(stdout.contains(&needle), "missing dry-run entry {needle}");
    }

    let mut produced = fs::read_dir(output_dir.path())?;
    assert!(produced.next().is_none(), "dry run should not create files");

    output_dir.close()?;
    input_dir.close()?;
    Ok(())
}

#[test]
fn segment_reports_missing_input_file() -> Result<(), Box<dyn Error>> {
    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    cmd.arg("segment")
        .arg("missing.wav")
        .arg("--output")
        .arg(output_dir.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("input file does not exist"));

    output_dir.close()?;
    Ok(())
}

#[test]
fn segment_accepts_custom_tunables() -> Result<(), Box<dyn Error>> {
    let input_dir = tempdir()?;
    let input_path = input_dir.path().join("quiet.wav");
    write_fixture(&input_path, 8_000, &vec![0i16; 16_000])?;

    let output_dir = tempdir()?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    cmd.arg("segment")
        .arg(&input_path)
        .arg("--output")
        .arg(output_dir.path())
        .args(["--window-duration", "0.3"])
        .args(["--step-duration", "0.01"])
        .args(["--threshold", "1e-3"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 clip(s)"));

    output_dir.close()?;
    input_dir.close()?;
    Ok(())
}

#[test]
fn chop_splits_a_file_and_removes_the_source() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("long.wav");
    let samples: Vec<i16> = (0..25).collect();
    write_fixture(&input_path, 1, &samples)?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    cmd.arg("chop").arg(&input_path).args(["--length", "10s"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("into 3 chunk(s)"));

    assert!(!input_path.exists(), "source file should be deleted");
    for index in 1..=3 {
        assert!(work_dir.path().join(format!("long_{index}.wav")).is_file());
    }

    work_dir.close()?;
    Ok(())
}

#[test]
fn chop_processes_every_wav_in_a_directory() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    for name in ["first.wav", "second.wav"] {
        let samples: Vec<i16> = (0..15).collect();
        write_fixture(work_dir.path().join(name), 1, &samples)?;
    }
    fs::write(work_dir.path().join("notes.txt"), "ignored")?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    cmd.arg("chop").arg(work_dir.path()).args(["--length", "10s"]);
    cmd.assert().success();

    for stem in ["first", "second"] {
        assert!(!work_dir.path().join(format!("{stem}.wav")).exists());
        assert!(work_dir.path().join(format!("{stem}_1.wav")).is_file());
        assert!(work_dir.path().join(format!("{stem}_2.wav")).is_file());
    }
    assert!(work_dir.path().join("notes.txt").is_file());

    work_dir.close()?;
    Ok(())
}

#[test]
fn chop_rejects_sub_second_lengths() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("long.wav");
    write_fixture(&input_path, 1, &[0i16; 25])?;

    let mut cmd = Command::cargo_bin("audioseg")?;
    cmd.arg("chop").arg(&input_path).args(["--length", "500ms"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("whole number of seconds"));

    assert!(input_path.exists(), "rejected runs must not delete the source");

    work_dir.close()?;
    Ok(())
}
