use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use taraweeh_core::{
    align, assign_reciters_to_markers, enrich_marker_texts, parse_translation_payload,
    AlignConfig, AlignmentRequest, CorpusIndex, DayOverrides, ReciterWindow, TranscriptSegment,
    TranslationLookup,
};

/// Taraweeh CLI - align recited Quran transcripts to the canonical corpus
#[derive(Parser)]
#[command(name = "taraweeh")]
#[command(about = "Ayah marker alignment for taraweeh recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align a day's transcript and write the marker list
    Align {
        /// Quran corpus JSON ({"surahs": [...]})
        #[arg(long)]
        corpus: PathBuf,
        /// Transcript JSON ({"segments": [...]})
        #[arg(long)]
        transcript: PathBuf,
        /// Output path for the marker JSON
        #[arg(short, long)]
        output: PathBuf,
        /// Day number, used to pick the day's overrides
        #[arg(long, default_value_t = 0)]
        day: u32,
        /// Part number for split recordings
        #[arg(long)]
        part: Option<u32>,
        /// Day-overrides JSON file
        #[arg(long)]
        overrides: Option<PathBuf>,
        /// Translation JSON for english_text enrichment
        #[arg(long)]
        translation: Option<PathBuf>,
        /// Labeled reciter windows JSON (array)
        #[arg(long)]
        reciter_windows: Option<PathBuf>,
        /// Engine configuration JSON (partial, merged over defaults)
        #[arg(long)]
        config: Option<PathBuf>,
        /// High-quality composite score floor
        #[arg(long)]
        min_score: Option<f64>,
        /// High-quality token-overlap floor
        #[arg(long)]
        min_overlap: Option<f64>,
        /// High-quality confidence floor
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Minimum forward wall-time between markers, seconds
        #[arg(long)]
        min_gap_seconds: Option<i64>,
        /// Preserve letter identity during normalization
        #[arg(long)]
        strict_normalization: bool,
    },
}

#[derive(Deserialize)]
struct TranscriptFile {
    segments: Vec<TranscriptSegment>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Align {
            corpus,
            transcript,
            output,
            day,
            part,
            overrides,
            translation,
            reciter_windows,
            config,
            min_score,
            min_overlap,
            min_confidence,
            min_gap_seconds,
            strict_normalization,
        } => run_align(AlignArgs {
            corpus,
            transcript,
            output,
            day,
            part,
            overrides,
            translation,
            reciter_windows,
            config,
            min_score,
            min_overlap,
            min_confidence,
            min_gap_seconds,
            strict_normalization,
        }),
    }
}

struct AlignArgs {
    corpus: PathBuf,
    transcript: PathBuf,
    output: PathBuf,
    day: u32,
    part: Option<u32>,
    overrides: Option<PathBuf>,
    translation: Option<PathBuf>,
    reciter_windows: Option<PathBuf>,
    config: Option<PathBuf>,
    min_score: Option<f64>,
    min_overlap: Option<f64>,
    min_confidence: Option<f64>,
    min_gap_seconds: Option<i64>,
    strict_normalization: bool,
}

struct StageLog {
    total: usize,
    index: usize,
}

impl StageLog {
    fn new(total: usize) -> Self {
        Self { total, index: 0 }
    }

    fn run<T>(&mut self, label: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
        self.index += 1;
        let percent = self.index * 100 / self.total;
        println!(
            "[pipeline {}/{} {:>3}%] {}...",
            self.index, self.total, percent, label
        );
        let started = Instant::now();
        let value = work()?;
        println!("[pipeline] {} done in {:.1}s", label, started.elapsed().as_secs_f64());
        Ok(value)
    }
}

fn run_align(args: AlignArgs) -> Result<()> {
    let mut stages = StageLog::new(6);
    let pipeline_start = Instant::now();

    let corpus = stages.run("load Quran corpus", || load_corpus(&args.corpus))?;

    let transcript = stages.run("load transcript", || {
        let payload = fs::read_to_string(&args.transcript)
            .with_context(|| format!("reading transcript {}", args.transcript.display()))?;
        let file: TranscriptFile =
            serde_json::from_str(&payload).context("parsing transcript JSON")?;
        Ok(file.segments)
    })?;

    let (day_overrides, windows, translations, config) =
        stages.run("load overrides and auxiliary inputs", || {
            let day_overrides = match &args.overrides {
                Some(path) => load_day_overrides(path, args.day)?,
                None => None,
            };
            let windows: Vec<ReciterWindow> = match &args.reciter_windows {
                Some(path) => {
                    let payload = fs::read_to_string(path)
                        .with_context(|| format!("reading reciter windows {}", path.display()))?;
                    serde_json::from_str(&payload).context("parsing reciter windows JSON")?
                }
                None => Vec::new(),
            };
            let translations = match &args.translation {
                Some(path) => {
                    let payload = fs::read_to_string(path)
                        .with_context(|| format!("reading translation {}", path.display()))?;
                    let value: serde_json::Value =
                        serde_json::from_str(&payload).context("parsing translation JSON")?;
                    parse_translation_payload(&value)
                }
                None => TranslationLookup::new(),
            };
            let config = build_config(&args)?;
            Ok((day_overrides, windows, translations, config))
        })?;

    let outcome = stages.run("match ayah markers", || {
        let mut request = AlignmentRequest::new(&corpus, &transcript, &config);
        request.overrides = day_overrides.as_ref();
        request.part = args.part;
        if !windows.is_empty() {
            request.reciter_windows = Some(&windows);
        }
        Ok(align(request))
    })?;

    let markers = stages.run("enrich marker texts and reciters", || {
        let mut markers = outcome.markers.clone();
        enrich_marker_texts(&mut markers, &corpus, &translations);
        if !windows.is_empty() {
            assign_reciters_to_markers(&mut markers, &windows);
        }
        Ok(markers)
    })?;

    stages.run("write output JSON", || {
        let payload = serde_json::json!({
            "day": args.day,
            "markers": markers,
            "meta": {
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "part": args.part,
                "engine": outcome.meta,
            },
        });
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        fs::write(&args.output, serde_json::to_string_pretty(&payload)?)
            .with_context(|| format!("writing {}", args.output.display()))?;
        Ok(())
    })?;

    if outcome.meta.counts.markers == 0 {
        tracing::warn!("no markers were detected; see meta.counts for diagnostics");
    }
    println!(
        "[pipeline] complete in {:.1}s ({} markers)",
        pipeline_start.elapsed().as_secs_f64(),
        outcome.meta.counts.markers
    );
    Ok(())
}

fn load_corpus(path: &Path) -> Result<CorpusIndex> {
    let payload =
        fs::read_to_string(path).with_context(|| format!("reading corpus {}", path.display()))?;
    CorpusIndex::from_json_str(&payload)
        .with_context(|| format!("loading corpus {}", path.display()))
}

/// Day overrides live either under `day_overrides.{day}` or directly under
/// `{day}` at the top level.
fn load_day_overrides(path: &Path, day: u32) -> Result<Option<DayOverrides>> {
    let payload =
        fs::read_to_string(path).with_context(|| format!("reading overrides {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&payload).context("parsing overrides JSON")?;
    let root = value.get("day_overrides").unwrap_or(&value);
    let Some(day_config) = root.get(day.to_string()) else {
        return Ok(None);
    };
    let overrides: DayOverrides = serde_json::from_value(day_config.clone())
        .with_context(|| format!("parsing overrides for day {day}"))?;
    Ok(Some(overrides))
}

fn build_config(args: &AlignArgs) -> Result<AlignConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let payload = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&payload).context("parsing config JSON")?
        }
        None => AlignConfig::default(),
    };
    if let Some(min_score) = args.min_score {
        config.min_score = min_score;
    }
    if let Some(min_overlap) = args.min_overlap {
        config.min_overlap = min_overlap;
    }
    if let Some(min_confidence) = args.min_confidence {
        config.min_confidence = min_confidence;
    }
    if let Some(min_gap_seconds) = args.min_gap_seconds {
        config.min_gap_seconds = min_gap_seconds;
    }
    if args.strict_normalization {
        config.strict_normalization = true;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_day_overrides_nested_and_bare() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested.json");
        fs::write(
            &nested,
            r#"{"day_overrides": {"12": {"start_surah_number": 2, "start_ayah": 142}}}"#,
        )
        .unwrap();
        let overrides = load_day_overrides(&nested, 12).unwrap().unwrap();
        assert_eq!(overrides.forced_start(), Some((2, 142)));

        let bare = dir.path().join("bare.json");
        fs::write(&bare, r#"{"3": {"final_ayah": 50}}"#).unwrap();
        let overrides = load_day_overrides(&bare, 3).unwrap().unwrap();
        assert_eq!(overrides.final_ayah, Some(50));

        assert!(load_day_overrides(&bare, 4).unwrap().is_none());
    }
}
