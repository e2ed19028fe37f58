use std::path::PathBuf;
use std::time::Duration;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};

/// Parse a positive number of seconds for the analysis tunables.
pub fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number of seconds '{value}'"))?;
    if !(seconds > 0.0 && seconds.is_finite()) {
        return Err("seconds must be greater than zero".into());
    }
    Ok(seconds)
}

/// Parse the normalized-energy cutoff. Any positive finite value is accepted;
/// useful settings are well below 1.
pub fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold '{value}'"))?;
    if !(threshold > 0.0 && threshold.is_finite()) {
        return Err("threshold must be greater than zero".into());
    }
    Ok(threshold)
}

/// Parse a human-friendly duration string into a [`Duration`].
///
/// Supported suffixes are `ms` (milliseconds), `s` (seconds), `m` (minutes),
/// and `h` (hours), and components may be chained, such as `"1m30s"`. Chunk
/// boundaries fall on whole seconds, so the total must be a positive whole
/// number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let input = value.trim();
    if input.is_empty() {
        return Err("duration cannot be empty".into());
    }

    let mut total_ms: u128 = 0;
    let mut index = 0;
    let bytes = input.as_bytes();
    let len = bytes.len();
    let invalid = || format!("invalid duration '{value}'");
    let mut saw_component = false;

    while index < len {
        if bytes[index].is_ascii_whitespace() {
            return Err(invalid());
        }

        let start = index;
        while index < len && bytes[index].is_ascii_digit() {
            index += 1;
        }

        if start == index {
            return Err(invalid());
        }

        let number = input[start..index].parse::<u128>().map_err(|_| invalid())?;

        if index >= len {
            return Err(invalid());
        }

        let remainder = &input[index..];
        let (unit_len, factor) = if remainder.starts_with("ms") {
            (2, 1u128)
        } else if remainder.starts_with('s') {
            (1, 1_000u128)
        } else if remainder.starts_with('m') {
            (1, 60_000u128)
        } else if remainder.starts_with('h') {
            (1, 3_600_000u128)
        } else {
            return Err(invalid());
        };

        index += unit_len;

        let component_ms = number
            .checked_mul(factor)
            .ok_or_else(|| "duration is too large".to_owned())?;
        total_ms = total_ms
            .checked_add(component_ms)
            .ok_or_else(|| "duration is too large".to_owned())?;
        saw_component = true;
    }

    if !saw_component || total_ms == 0 {
        return Err("duration must be greater than zero".into());
    }

    if total_ms % 1_000 != 0 {
        return Err("duration must be a whole number of seconds".into());
    }

    if total_ms > u128::from(u64::MAX) {
        return Err("duration is too large".into());
    }

    Ok(Duration::from_millis(total_ms as u64))
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Split WAV recordings at silences or into fixed-length chunks")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("segment")
                .about("Cut a recording where energy rises after a quiet stretch, with a timestamp manifest")
                .arg(
                    Arg::new("file_path")
                        .value_name("FILE_PATH")
                        .help("Path to the input WAV file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("OUTPUT_DIR")
                        .help("Directory where the clips and manifest will be written")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("window-duration")
                        .long("window-duration")
                        .value_name("SECONDS")
                        .help("Analysis window length in seconds; doubles as the minimum silence length")
                        .value_parser(ValueParser::new(parse_seconds)),
                )
                .arg(
                    Arg::new("step-duration")
                        .long("step-duration")
                        .value_name("SECONDS")
                        .help("Stride between analysis windows in seconds")
                        .value_parser(ValueParser::new(parse_seconds)),
                )
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .value_name("VALUE")
                        .help("Normalized-energy cutoff; windows above it count as loud")
                        .value_parser(ValueParser::new(parse_threshold)),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Preview the generated clips without writing files")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("chop")
                .about(
                    "Chop WAV files into fixed-length chunks. \
                     WARNING: each source file is deleted once its chunks are written",
                )
                .arg(
                    Arg::new("path")
                        .value_name("PATH")
                        .help("A WAV file, or a directory whose .wav files are all chopped")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("length")
                        .short('l')
                        .long("length")
                        .value_name("DURATION")
                        .help("Length of each chunk in whole seconds (e.g. 10s, 1m30s)")
                        .default_value("10s")
                        .value_parser(ValueParser::new(parse_duration)),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_supports_individual_units() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3_600));
    }

    #[test]
    fn parse_duration_supports_chained_units() {
        let expected = Duration::from_secs(3_600 + 120 + 3);
        assert_eq!(parse_duration("1h2m3s").unwrap(), expected);
    }

    #[test]
    fn parse_duration_accepts_millisecond_components_summing_to_seconds() {
        assert_eq!(parse_duration("1500ms500ms").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_rejects_sub_second_totals() {
        assert!(parse_duration("500ms").is_err());
        assert!(parse_duration("1s500ms").is_err());
    }

    #[test]
    fn parse_duration_rejects_missing_units() {
        assert!(parse_duration("100").is_err());
    }

    #[test]
    fn parse_duration_rejects_unknown_units() {
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn parse_duration_rejects_zero() {
        assert!(parse_duration("0s").is_err());
    }

    #[test]
    fn parse_seconds_rejects_non_positive_values() {
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("-0.5").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert_eq!(parse_seconds("0.6").unwrap(), 0.6);
    }

    #[test]
    fn parse_threshold_accepts_scientific_notation() {
        assert_eq!(parse_threshold("1e-4").unwrap(), 1e-4);
        assert!(parse_threshold("0").is_err());
    }
}
