use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Default length of the energy analysis window in seconds. Doubles as the
/// minimum stretch of low energy required before a cut can be placed.
pub const DEFAULT_WINDOW_DURATION: f64 = 0.6;

/// Default stride between consecutive analysis windows in seconds.
pub const DEFAULT_STEP_DURATION: f64 = 0.003;

/// Default normalized-energy cutoff.
pub const DEFAULT_SILENCE_THRESHOLD: f64 = 1e-4;

/// Cut-point sentinel meaning "end of the sample buffer".
pub const END_OF_BUFFER: i64 = -1;

/// How many windows are classified between progress callbacks.
const PROGRESS_STRIDE: usize = 4096;

/// Errors that can occur while segmenting audio files.
#[derive(Debug, Error)]
pub enum AudioSegError {
    /// The analysis window must span at least one sample.
    #[error("window size must be a positive number of samples")]
    InvalidWindowSize,

    /// The stride between windows must advance by at least one sample.
    #[error("step size must be a positive number of samples")]
    InvalidStepSize,

    /// The normalized-energy cutoff must be a positive, finite value.
    #[error("silence threshold must be a positive, finite value")]
    InvalidThreshold,

    /// Fixed-duration chunks must be a positive whole number of seconds.
    #[error("segment length must be a positive whole number of seconds")]
    InvalidSegmentLength,

    /// Error returned when a float WAV is supplied; normalization derives the
    /// reference amplitude from the integer sample width.
    #[error("only integer PCM input is supported")]
    UnsupportedSampleFormat,

    /// Error produced when a file stem cannot be derived from the input path.
    #[error("failed to derive a base name for the input file")]
    InvalidInputName,

    /// Wrapper around errors produced by the WAV decoder/encoder.
    #[error(transparent)]
    Wav(#[from] hound::Error),

    /// Wrapper around manifest serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors encountered while reading or writing files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tunable parameters of the silence-triggered segmentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SilenceParams {
    /// Size of the analysis window in seconds.
    pub window_duration: f64,
    /// Stride between windows in seconds.
    pub step_duration: f64,
    /// Normalized-energy cutoff in (0, 1).
    pub silence_threshold: f64,
}

impl Default for SilenceParams {
    fn default() -> Self {
        Self {
            window_duration: DEFAULT_WINDOW_DURATION,
            step_duration: DEFAULT_STEP_DURATION,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
        }
    }
}

/// Configuration for a silence-triggered segmentation run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Canonicalized path of the source file to segment.
    pub input_path: PathBuf,
    /// Directory into which the clips and manifest are written. Created on
    /// demand, so it does not have to exist when the config is built.
    pub output_dir: PathBuf,
    /// Silence detection tunables.
    pub params: SilenceParams,
}

impl Config {
    /// Construct a [`Config`] with default tunables.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        output: Q,
    ) -> Result<Self, AudioSegError> {
        Self::builder(input, output).build()
    }

    /// Start building a [`Config`], overriding tunables as needed.
    pub fn builder<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> ConfigBuilder {
        ConfigBuilder {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            params: SilenceParams::default(),
        }
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input: PathBuf,
    output: PathBuf,
    params: SilenceParams,
}

impl ConfigBuilder {
    /// Override the analysis window duration in seconds.
    pub fn window_duration(mut self, seconds: f64) -> Self {
        self.params.window_duration = seconds;
        self
    }

    /// Override the stride between windows in seconds.
    pub fn step_duration(mut self, seconds: f64) -> Self {
        self.params.step_duration = seconds;
        self
    }

    /// Override the normalized-energy cutoff.
    pub fn silence_threshold(mut self, threshold: f64) -> Self {
        self.params.silence_threshold = threshold;
        self
    }

    /// Validate the tunables and canonicalize the input path.
    pub fn build(self) -> Result<Config, AudioSegError> {
        if !(self.params.window_duration > 0.0) {
            return Err(AudioSegError::InvalidWindowSize);
        }
        if !(self.params.step_duration > 0.0) {
            return Err(AudioSegError::InvalidStepSize);
        }
        if !(self.params.silence_threshold > 0.0 && self.params.silence_threshold.is_finite()) {
            return Err(AudioSegError::InvalidThreshold);
        }

        let input_path = fs::canonicalize(&self.input)?;

        Ok(Config {
            input_path,
            output_dir: self.output,
            params: self.params,
        })
    }
}

/// An uncompressed PCM recording held fully in memory.
///
/// Samples are kept as a flat interleaved sequence regardless of channel
/// count; the pipeline never weighs channels individually.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    /// Interleaved integer amplitude values.
    pub samples: Vec<i32>,
    /// Format of the source file, reused verbatim for every output clip.
    pub spec: WavSpec,
}

impl SampleBuffer {
    /// Wrap an in-memory sample sequence. Mostly useful for tests and
    /// benchmarks.
    pub fn new(samples: Vec<i32>, spec: WavSpec) -> Self {
        Self { samples, spec }
    }

    /// Load a PCM WAV file into memory. Float WAVs are rejected since the
    /// energy normalization needs an integer sample width.
    pub fn from_wav<P: AsRef<Path>>(path: P) -> Result<Self, AudioSegError> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int {
            return Err(AudioSegError::UnsupportedSampleFormat);
        }

        let samples = reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { samples, spec })
    }

    /// Number of samples in the buffer (summed across channels).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate of the source file in samples per second.
    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Largest representable amplitude for the buffer's sample width.
    pub fn max_amplitude(&self) -> i64 {
        (1i64 << (u32::from(self.spec.bits_per_sample) - 1)) - 1
    }
}

/// Lazy sequence of fixed-size windows over a sample sequence.
///
/// Produced by [`windows`]; never emits a window that would reach or pass the
/// end of the signal, so up to `window_size` trailing samples stay
/// unanalyzed.
#[derive(Clone, Debug)]
pub struct Windows<'a> {
    signal: &'a [i32],
    window_size: usize,
    step_size: usize,
    start: usize,
}

impl<'a> Iterator for Windows<'a> {
    type Item = &'a [i32];

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.start.checked_add(self.window_size)?;
        if end >= self.signal.len() {
            return None;
        }
        let window = &self.signal[self.start..end];
        self.start += self.step_size;
        Some(window)
    }
}

/// Iterate over `signal` in windows of `window_size` samples, advancing by
/// `step_size` samples each time. Windows overlap when `step_size` is smaller
/// than `window_size`.
pub fn windows(
    signal: &[i32],
    window_size: usize,
    step_size: usize,
) -> Result<Windows<'_>, AudioSegError> {
    if window_size == 0 {
        return Err(AudioSegError::InvalidWindowSize);
    }
    if step_size == 0 {
        return Err(AudioSegError::InvalidStepSize);
    }

    Ok(Windows {
        signal,
        window_size,
        step_size,
        start: 0,
    })
}

/// Mean squared amplitude of a sample slice.
///
/// An empty slice yields NaN; [`windows`] guarantees non-empty input within
/// the pipeline.
pub fn energy(samples: &[i32]) -> f64 {
    let sum: f64 = samples.iter().map(|&s| {
        let s = s as f64;
        s * s
    }).sum();
    sum / samples.len() as f64
}

/// Iterator over the indices of `false` to `true` transitions, produced by
/// [`rising_edges`].
#[derive(Clone, Debug)]
pub struct RisingEdges<I> {
    flags: I,
    previous: bool,
    index: usize,
}

impl<I: Iterator<Item = bool>> Iterator for RisingEdges<I> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        for flag in self.flags.by_ref() {
            let rising = flag && !self.previous;
            self.previous = flag;
            self.index += 1;
            if rising {
                return Some(self.index - 1);
            }
        }
        None
    }
}

/// Yield the zero-based index of every rising edge in a boolean sequence.
/// The position before the first element counts as `false`, so a leading
/// `true` produces an edge at index 0. A `true` run yields only its start.
pub fn rising_edges<I>(flags: I) -> RisingEdges<I::IntoIter>
where
    I: IntoIterator<Item = bool>,
{
    RisingEdges {
        flags: flags.into_iter(),
        previous: false,
        index: 0,
    }
}

/// Format a duration in seconds as `"HH:MM:SS.001"`.
///
/// Fields are zero-padded to two digits and hours wrap after a day, matching
/// elapsed-time arithmetic from a fixed epoch. The sub-second part is the
/// constant literal `.001`, not derived from the input. Negative inputs map
/// to the literal `"00"`; the cut-point sentinel relies on this.
pub fn format_timestamp(seconds: f64) -> String {
    if seconds < 0.0 {
        return String::from("00");
    }

    let total = seconds as u64;
    let hours = (total / 3_600) % 24;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}.001")
}

/// One output clip: its ordinal and the sample range it covers. A `stop` of
/// [`END_OF_BUFFER`] means "to the end of the buffer".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentRange {
    /// Zero-based clip ordinal, also used in file names and manifest keys.
    pub index: usize,
    /// First sample of the clip.
    pub start: i64,
    /// One past the last sample of the clip, or [`END_OF_BUFFER`].
    pub stop: i64,
}

/// Convert rising-edge window indices into a cut-sample list.
///
/// Each edge index becomes `trunc(edge * step_duration * sample_rate)`. A
/// leading `0` and the trailing [`END_OF_BUFFER`] sentinel are always added,
/// so consecutive pairs always describe `edges + 1` ranges; with no edges at
/// all the result is a single full-file range.
pub fn resolve_cut_points(edges: &[usize], step_duration: f64, sample_rate: u32) -> Vec<i64> {
    let mut cuts = Vec::with_capacity(edges.len() + 2);
    cuts.push(0);
    for &edge in edges {
        let time = edge as f64 * step_duration;
        cuts.push((time * sample_rate as f64) as i64);
    }
    cuts.push(END_OF_BUFFER);
    cuts
}

/// Pair up consecutive cut points into [`SegmentRange`]s.
pub fn segment_ranges(cuts: &[i64]) -> Vec<SegmentRange> {
    cuts.windows(2)
        .enumerate()
        .map(|(index, pair)| SegmentRange {
            index,
            start: pair[0],
            stop: pair[1],
        })
        .collect()
}

/// Mapping from clip ordinal to `[start, stop]` timestamp strings, kept in
/// ordinal order and serialized as a flat JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimestampManifest {
    entries: Vec<(String, [String; 2])>,
}

impl TimestampManifest {
    /// Build the manifest for a cut-sample list, one entry per range. The
    /// sentinel divides to a small negative time, which formats as `"00"`.
    pub fn from_cut_points(cuts: &[i64], sample_rate: u32) -> Self {
        let entries = cuts
            .windows(2)
            .enumerate()
            .map(|(index, pair)| {
                let start = format_timestamp(pair[0] as f64 / sample_rate as f64);
                let stop = format_timestamp(pair[1] as f64 / sample_rate as f64);
                (index.to_string(), [start, stop])
            })
            .collect();
        Self { entries }
    }

    /// Entries in ordinal order.
    pub fn entries(&self) -> &[(String, [String; 2])] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TimestampManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (ordinal, pair) in &self.entries {
            map.serialize_entry(ordinal, pair)?;
        }
        map.end()
    }
}

/// Progress notifications emitted while classifying windows.
#[derive(Clone, Copy, Debug)]
pub enum ProgressEvent {
    /// Analysis is starting; `total_windows` approximates the window count.
    Start { total_windows: u64 },
    /// `windows` windows have been classified so far.
    Advance { windows: u64 },
    /// Analysis is complete.
    Finish,
}

/// Scan a buffer for cut points using windowed energy analysis.
///
/// Each window's mean squared amplitude is normalized by the energy of a
/// single maximum-amplitude sample and compared against the threshold. Note
/// the polarity: a window is flagged when its energy is *above* the cutoff,
/// and cuts land where the flag rises after a quieter stretch. The flag
/// sequence is materialized in full before cut points are resolved.
pub fn detect_cut_points(
    buffer: &SampleBuffer,
    params: &SilenceParams,
    progress: &mut dyn FnMut(ProgressEvent),
) -> Result<Vec<i64>, AudioSegError> {
    let sample_rate = buffer.sample_rate();
    let window_size = (params.window_duration * sample_rate as f64) as usize;
    let step_size = (params.step_duration * sample_rate as f64) as usize;

    let max_amplitude = buffer.max_amplitude() as f64;
    let max_energy = max_amplitude * max_amplitude;
    debug!(
        "window {window_size} samples, step {step_size} samples, reference energy {max_energy}"
    );

    let signal_windows = windows(&buffer.samples, window_size, step_size)?;
    progress(ProgressEvent::Start {
        total_windows: buffer.len() as u64 / step_size as u64,
    });

    let mut flags = Vec::new();
    for window in signal_windows {
        flags.push(energy(window) / max_energy > params.silence_threshold);
        if flags.len() % PROGRESS_STRIDE == 0 {
            progress(ProgressEvent::Advance {
                windows: flags.len() as u64,
            });
        }
    }
    progress(ProgressEvent::Advance {
        windows: flags.len() as u64,
    });

    let edges: Vec<usize> = rising_edges(flags).collect();
    debug!("found {} rising edge(s)", edges.len());

    let cuts = resolve_cut_points(&edges, params.step_duration, sample_rate);
    progress(ProgressEvent::Finish);
    Ok(cuts)
}

/// Everything a segmentation run produces or, for a dry run, would produce.
#[derive(Clone, Debug)]
pub struct SegmentPlan {
    /// Clip ranges in ordinal order.
    pub ranges: Vec<SegmentRange>,
    /// Timestamp manifest matching the ranges.
    pub manifest: TimestampManifest,
    /// Output path of each clip, in ordinal order.
    pub clip_paths: Vec<PathBuf>,
    /// Output path of the JSON manifest sidecar.
    pub manifest_path: PathBuf,
}

fn file_stem(path: &Path) -> Result<String, AudioSegError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
        .ok_or(AudioSegError::InvalidInputName)
}

fn clip_path(output_dir: &Path, stem: &str, index: usize) -> PathBuf {
    output_dir.join(format!("{stem}_{index:03}.wav"))
}

fn build_plan(
    config: &Config,
    buffer: &SampleBuffer,
    cuts: &[i64],
) -> Result<SegmentPlan, AudioSegError> {
    let stem = file_stem(&config.input_path)?;
    let ranges = segment_ranges(cuts);
    let manifest = TimestampManifest::from_cut_points(cuts, buffer.sample_rate());
    let clip_paths = ranges
        .iter()
        .map(|range| clip_path(&config.output_dir, &stem, range.index))
        .collect();

    Ok(SegmentPlan {
        ranges,
        manifest,
        clip_paths,
        manifest_path: config.output_dir.join(format!("{stem}.json")),
    })
}

/// Compute the ranges, manifest, and output paths of a segmentation run
/// without writing anything.
pub fn plan_segments(config: &Config) -> Result<SegmentPlan, AudioSegError> {
    let buffer = SampleBuffer::from_wav(&config.input_path)?;
    let cuts = detect_cut_points(&buffer, &config.params, &mut |_| {})?;
    build_plan(config, &buffer, &cuts)
}

/// Perform a silence-triggered segmentation run using the supplied
/// [`Config`].
pub fn run(config: Config) -> Result<SegmentPlan, AudioSegError> {
    run_with_progress(config, |_| {})
}

/// Like [`run`], reporting analysis progress through the supplied callback.
///
/// Clips are written one at a time in ordinal order, followed by the
/// manifest. A failure mid-loop leaves the clips written so far on disk; the
/// manifest itself is written to a temporary file and renamed into place so
/// it is never observed truncated.
pub fn run_with_progress(
    config: Config,
    mut progress: impl FnMut(ProgressEvent),
) -> Result<SegmentPlan, AudioSegError> {
    let buffer = SampleBuffer::from_wav(&config.input_path)?;
    info!(
        "segmenting '{}' where normalized energy rises above {:e} (window {}s, step {}s)",
        config.input_path.display(),
        config.params.silence_threshold,
        config.params.window_duration,
        config.params.step_duration,
    );

    let cuts = detect_cut_points(&buffer, &config.params, &mut progress)?;
    let plan = build_plan(&config, &buffer, &cuts)?;

    fs::create_dir_all(&config.output_dir)?;
    for (range, path) in plan.ranges.iter().zip(&plan.clip_paths) {
        write_clip(&buffer, *range, path)?;
        info!("wrote {}", path.display());
    }

    write_manifest(&plan.manifest, &plan.manifest_path)?;
    info!("wrote {}", plan.manifest_path.display());

    Ok(plan)
}

fn write_clip(
    buffer: &SampleBuffer,
    range: SegmentRange,
    path: &Path,
) -> Result<(), AudioSegError> {
    let stop = if range.stop == END_OF_BUFFER {
        buffer.len()
    } else {
        (range.stop as usize).min(buffer.len())
    };
    let start = (range.start.max(0) as usize).min(stop);

    write_wav(path, buffer.spec, &buffer.samples[start..stop])
}

fn write_wav(path: &Path, spec: WavSpec, samples: &[i32]) -> Result<(), AudioSegError> {
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn write_manifest(manifest: &TimestampManifest, path: &Path) -> Result<(), AudioSegError> {
    let json = serde_json::to_vec(manifest)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Split a WAV file into consecutive fixed-length chunks and delete the
/// source.
///
/// Chunks hold `sample_rate * segment_duration` samples each (the final one
/// holds the remainder) and are written next to the source as
/// `{stem}_{i}.wav` with a 1-based unpadded ordinal. **The source file is
/// removed once every chunk has been written**; callers are expected to
/// guard this.
pub fn split_fixed<P: AsRef<Path>>(
    path: P,
    segment_duration: Duration,
) -> Result<Vec<PathBuf>, AudioSegError> {
    let path = path.as_ref();
    if segment_duration.as_secs() == 0 || segment_duration.subsec_nanos() != 0 {
        return Err(AudioSegError::InvalidSegmentLength);
    }

    let buffer = SampleBuffer::from_wav(path)?;
    let samples_per_segment = buffer.sample_rate() as usize * segment_duration.as_secs() as usize;
    if samples_per_segment == 0 {
        return Err(AudioSegError::InvalidSegmentLength);
    }

    let num_segments = buffer.len().div_ceil(samples_per_segment);
    let stem = file_stem(path)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut paths = Vec::with_capacity(num_segments);
    for index in 0..num_segments {
        let start = index * samples_per_segment;
        let stop = ((index + 1) * samples_per_segment).min(buffer.len());
        let out_path = dir.join(format!("{stem}_{}.wav", index + 1));

        write_wav(&out_path, buffer.spec, &buffer.samples[start..stop])?;
        info!(
            "segment {}/{num_segments} saved: {}",
            index + 1,
            out_path.display()
        );
        paths.push(out_path);
    }

    fs::remove_file(path)?;
    Ok(paths)
}
