use std::path::{Path, PathBuf};
use std::time::Instant;

use bitext_align::{
    aggregate_chapters, pair_chapter_files, read_paragraphs, write_jsonl_file, BitextAligner,
    BitextAlignerBuilder, ChapterFailure, ChapterPair, ChapterReport, EncoderConfig, Language,
    Meta, Report, RuntimeKind, StageParams, TwoStageConfig, REPORT_SCHEMA_VERSION,
};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[path = "align_corpus/report_writer.rs"]
mod report_writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuntimeChoice {
    Onnx,
    Candle,
}

impl RuntimeChoice {
    fn runtime_kind(self) -> RuntimeKind {
        match self {
            Self::Onnx => RuntimeKind::Onnx,
            Self::Candle => RuntimeKind::Candle,
        }
    }
}

fn default_runtime_choice() -> RuntimeChoice {
    #[cfg(feature = "onnx")]
    {
        RuntimeChoice::Onnx
    }

    #[cfg(not(feature = "onnx"))]
    {
        RuntimeChoice::Candle
    }
}

#[derive(Debug, Parser)]
#[command(name = "align_corpus")]
#[command(about = "Align paired chapter files into a sentence-level parallel corpus")]
struct Args {
    #[arg(long, env = "ALIGN_CORPUS_SOURCE_DIR")]
    source_dir: PathBuf,
    #[arg(long, env = "ALIGN_CORPUS_TARGET_DIR")]
    target_dir: PathBuf,
    #[arg(long, env = "ALIGN_CORPUS_OUT_DIR", default_value = "pairs_sentence")]
    out_dir: PathBuf,
    #[arg(long, env = "ALIGN_CORPUS_MODEL_DIR", default_value = "models/labse")]
    model_dir: PathBuf,
    #[arg(
        long,
        env = "ALIGN_CORPUS_RUNTIME",
        value_enum,
        default_value_t = default_runtime_choice()
    )]
    runtime: RuntimeChoice,
    #[arg(long, env = "ALIGN_CORPUS_DEVICE", default_value = "cpu")]
    device: String,
    #[arg(long, env = "ALIGN_CORPUS_SOURCE_LANG", default_value = "en")]
    source_lang: Language,
    #[arg(long, env = "ALIGN_CORPUS_TARGET_LANG", default_value = "zh")]
    target_lang: Language,
    #[arg(long, env = "ALIGN_CORPUS_PARAGRAPH_THRESHOLD", default_value_t = StageParams::PARAGRAPH.threshold)]
    paragraph_threshold: f32,
    #[arg(long, env = "ALIGN_CORPUS_PARAGRAPH_WINDOW", default_value_t = StageParams::PARAGRAPH.max_window)]
    paragraph_window: usize,
    #[arg(long, env = "ALIGN_CORPUS_SENTENCE_THRESHOLD", default_value_t = StageParams::SENTENCE.threshold)]
    sentence_threshold: f32,
    #[arg(long, env = "ALIGN_CORPUS_SENTENCE_WINDOW", default_value_t = StageParams::SENTENCE.max_window)]
    sentence_window: usize,
    /// Chapter pairs processed concurrently; 0 uses one thread per core.
    #[arg(long, env = "ALIGN_CORPUS_JOBS", default_value_t = 0)]
    jobs: usize,
    /// Used when `RUST_LOG` is unset.
    #[arg(long, env = "ALIGN_CORPUS_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long, env = "ALIGN_CORPUS_REPORT")]
    report: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let stages = TwoStageConfig {
        paragraph: StageParams::new(args.paragraph_threshold, args.paragraph_window),
        sentence: StageParams::new(args.sentence_threshold, args.sentence_window),
    };
    let runtime_kind = args.runtime.runtime_kind();

    let pairing = pair_chapter_files(&args.source_dir, &args.target_dir)
        .map_err(|err| format!("Failed to pair chapter files: {err}"))?;
    if pairing.pairs.is_empty() {
        return Err(format!(
            "No chapter pairs found between '{}' and '{}'.",
            args.source_dir.display(),
            args.target_dir.display()
        ));
    }

    let mut encoder_config =
        EncoderConfig::from_model_dir(&args.model_dir, runtime_kind.model_filename());
    encoder_config.device = args.device.clone();
    let aligner = BitextAlignerBuilder::new(encoder_config)
        .with_runtime_kind(runtime_kind)
        .with_stages(stages)
        .with_languages(args.source_lang, args.target_lang)
        .build()
        .map_err(|err| format!("Failed to build aligner: {err}"))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs)
        .build()
        .map_err(|err| format!("Failed to start worker pool: {err}"))?;

    let progress = ProgressBar::new(pairing.pairs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message("aligning chapters");

    let started = Instant::now();
    let outcomes: Vec<Result<ChapterReport, ChapterFailure>> = pool.install(|| {
        pairing
            .pairs
            .par_iter()
            .enumerate()
            .map(|(index, pair)| {
                let outcome = align_chapter(&aligner, index, pair, &args.out_dir);
                progress.inc(1);
                outcome
            })
            .collect()
    });
    progress.finish_with_message("done");

    let mut chapters = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(chapter) => chapters.push(chapter),
            Err(failure) => {
                tracing::error!(prefix = %failure.prefix, error = %failure.error, "chapter failed");
                failures.push(failure);
            }
        }
    }

    let aggregates = aggregate_chapters(&chapters);
    tracing::info!(
        chapters = chapters.len(),
        failed = failures.len(),
        sentence_pairs = aggregates.sentence_pairs,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "corpus alignment finished"
    );

    let report = Report {
        schema_version: REPORT_SCHEMA_VERSION,
        meta: Meta {
            generated_at: Utc::now().to_rfc3339(),
            model_dir: args.model_dir.display().to_string(),
            runtime: runtime_kind.as_str().to_string(),
            device: aligner
                .device_label()
                .map_or_else(|| args.device.clone(), str::to_string),
            source_language: aligner.source_language().to_string(),
            target_language: aligner.target_language().to_string(),
            paragraph_stage: aligner.stages().paragraph,
            sentence_stage: aligner.stages().sentence,
            unmatched_source_chapters: pairing.unmatched_source.clone(),
            unmatched_target_chapters: pairing.unmatched_target.clone(),
        },
        chapters,
        failures,
        aggregates,
    };
    let report_path = args.report.clone().unwrap_or_else(|| {
        let run_id = Utc::now().format("%Y%m%dT%H%M%SZ");
        args.out_dir
            .join(format!("alignment-report-{run_id}.json"))
    });
    report_writer::write_report(&report_path, &report)?;
    println!("Report written to {}", report_path.display());

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} chapter pairs failed; see {}",
            report.failures.len(),
            pairing.pairs.len(),
            report_path.display()
        ))
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn align_chapter(
    aligner: &BitextAligner,
    index: usize,
    pair: &ChapterPair,
    out_dir: &Path,
) -> Result<ChapterReport, ChapterFailure> {
    let fail = |err: bitext_align::AlignmentError| ChapterFailure {
        prefix: pair.prefix.clone(),
        error: err.to_string(),
    };
    let source = read_paragraphs(&pair.source).map_err(fail)?;
    let target = read_paragraphs(&pair.target).map_err(fail)?;
    let alignment = aligner
        .align_chapter_pair(source.as_slice(), target.as_slice())
        .map_err(fail)?;

    let out_path = out_dir.join(format!("aligned_ch{index}.jsonl"));
    write_jsonl_file(&out_path, &alignment.sentence_pairs).map_err(fail)?;
    tracing::debug!(
        prefix = %pair.prefix,
        pairs = alignment.sentence_pairs.len(),
        path = %out_path.display(),
        "chapter written"
    );

    Ok(ChapterReport::from_alignment(
        &pair.prefix,
        source.len(),
        target.len(),
        &alignment,
    ))
}
