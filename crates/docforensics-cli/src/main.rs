use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docforensics_core::{
	CandidateFingerprint, CorpusEntry, DiffResult, DocumentNode, EngineConfig, Fingerprint,
	ForensicEngine, ForensicEvent, MiningReport, SimilarityResult,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docforensics", version, about = "Forensic analysis for loan documents")]
struct Cli {
	/// Rule configuration (JSON); defaults to <config dir>/docforensics/rules.json when present
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// Log analysis details to stderr
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Compare two document snapshots
	Diff {
		old: PathBuf,
		new: PathBuf,
		#[arg(long, value_enum)]
		format: Option<Format>,
	},
	/// Fingerprint a document
	Fingerprint {
		document: PathBuf,
		#[arg(long, value_enum)]
		format: Option<Format>,
	},
	/// Rank candidate documents by similarity to a target
	Similar {
		target: PathBuf,
		#[arg(required = true)]
		candidates: Vec<PathBuf>,
		/// Minimum overall similarity (0.0-1.0)
		#[arg(long, default_value = "0.0")]
		threshold: f64,
		#[arg(long, value_enum)]
		format: Option<Format>,
	},
	/// Reconstruct a document timeline from an event log
	Timeline {
		events: PathBuf,
		/// Defaults to the event file name
		#[arg(long)]
		document_id: Option<String>,
		#[arg(long, value_enum)]
		format: Option<TimelineFormat>,
	},
	/// Scan a corpus for cross-document fraud patterns
	Scan {
		corpus: PathBuf,
		#[arg(long, value_enum)]
		format: Option<Format>,
	},
	/// Print the effective configuration
	Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
	Text,
	Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TimelineFormat {
	Text,
	Csv,
	Json,
}

fn is_terminal() -> bool {
	atty::is(atty::Stream::Stdout)
}

/// Text on a terminal, JSON when piped
fn resolve_format(format: Option<Format>) -> Format {
	format.unwrap_or(if is_terminal() { Format::Text } else { Format::Json })
}

fn init_tracing(verbose: bool) {
	let filter = if verbose {
		EnvFilter::new("debug")
	} else {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
	};
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
	if let Some(path) = explicit {
		return EngineConfig::from_json_file(path)
			.with_context(|| format!("Failed to load config {}", path.display()));
	}
	if let Some(default_path) = dirs::config_dir().map(|d| d.join("docforensics").join("rules.json")) {
		if default_path.exists() {
			tracing::debug!("Using rules from {}", default_path.display());
			return EngineConfig::from_json_file(&default_path)
				.with_context(|| format!("Failed to load config {}", default_path.display()));
		}
	}
	Ok(EngineConfig::default())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
	let text = std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read {}", path.display()))?;
	serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_document(path: &Path) -> Result<DocumentNode> {
	let value: serde_json::Value = read_json(path)?;
	Ok(DocumentNode::from(value))
}

fn document_id(path: &Path) -> String {
	path.file_stem()
		.map(|s| s.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.display().to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	let config = load_config(cli.config.as_deref())?;
	if let Commands::Config = cli.command {
		return print_json(&config);
	}
	let engine = ForensicEngine::new(config).context("Invalid rule configuration")?;

	match cli.command {
		Commands::Diff { old, new, format } => {
			let result = engine
				.compare(&read_document(&old)?, &read_document(&new)?)
				.with_context(|| format!("Failed to compare {} and {}", old.display(), new.display()))?;
			match resolve_format(format) {
				Format::Json => print_json(&result)?,
				Format::Text => print_diff(&result),
			}
		}
		Commands::Fingerprint { document, format } => {
			let fingerprint = engine
				.fingerprint(&read_document(&document)?)
				.with_context(|| format!("Failed to fingerprint {}", document.display()))?;
			match resolve_format(format) {
				Format::Json => print_json(&fingerprint)?,
				Format::Text => print_fingerprint(&document_id(&document), &fingerprint),
			}
		}
		Commands::Similar { target, candidates, threshold, format } => {
			let target_fp = engine.fingerprint(&read_document(&target)?)?;
			let trees = candidates
				.iter()
				.map(|path| read_document(path))
				.collect::<Result<Vec<_>>>()?;
			let fingerprints = engine.fingerprint_batch(&trees)?;
			let pool: Vec<CandidateFingerprint> = candidates
				.iter()
				.zip(fingerprints)
				.map(|(path, fingerprint)| CandidateFingerprint {
					document_id: document_id(path),
					fingerprint,
				})
				.collect();
			let matches = engine.find_similar(&target_fp, &pool, threshold)?;
			match resolve_format(format) {
				Format::Json => print_json(&matches)?,
				Format::Text => print_similar(&document_id(&target), &matches),
			}
		}
		Commands::Timeline { events, document_id: id, format } => {
			let log: Vec<ForensicEvent> = read_json(&events)?;
			let id = id.unwrap_or_else(|| document_id(&events));
			let timeline = engine.build_timeline(&id, &log)?;
			let format = format.unwrap_or(if is_terminal() { TimelineFormat::Text } else { TimelineFormat::Json });
			match format {
				TimelineFormat::Text => print!("{}", timeline.to_text_report()),
				TimelineFormat::Csv => print!("{}", timeline.to_csv()),
				TimelineFormat::Json => println!("{}", timeline.to_json()?),
			}
		}
		Commands::Scan { corpus, format } => {
			let entries: Vec<CorpusEntry> = read_json(&corpus)?;
			let spinner = is_terminal().then(|| {
				let pb = ProgressBar::new_spinner();
				pb.set_style(
					ProgressStyle::default_spinner()
						.template("{spinner} {msg} [{elapsed}]")
						.unwrap_or_else(|_| ProgressStyle::default_spinner()),
				);
				pb.set_message(format!("Scanning {} documents", entries.len()));
				pb.enable_steady_tick(Duration::from_millis(100));
				pb
			});
			let report = engine.mine(&entries);
			if let Some(pb) = spinner {
				pb.finish_and_clear();
			}
			let report = report.with_context(|| format!("Failed to scan {}", corpus.display()))?;
			match resolve_format(format) {
				Format::Json => println!("{}", report.to_json()?),
				Format::Text => print_report(&report),
			}
		}
		Commands::Config => {}
	}
	Ok(())
}

fn print_diff(result: &DiffResult) {
	if result.is_identical() {
		println!("✅ Documents are identical");
		return;
	}
	println!("📊 Similarity: {:.1}%", result.overall_similarity * 100.0);
	println!("🔄 Changes: {}", result.total_changes);
	println!("🎯 Risk: {} ({:.2})", result.risk_level, result.risk_score);
	println!();
	for change in &result.changes {
		let delta = change
			.percent_delta
			.map(|p| format!(" ({:+.1}%)", p))
			.unwrap_or_default();
		println!(
			"  {:?} {} [{}] risk {:.2}{}",
			change.change_type, change.path, change.category, change.risk_score, delta
		);
	}
	if !result.suspicious_patterns.is_empty() {
		println!();
		println!("⚠️  Suspicious patterns:");
		for pattern in &result.suspicious_patterns {
			println!("  - {}", pattern);
		}
	}
	println!();
	println!("➡️  {}", result.recommendation);
}

fn print_fingerprint(id: &str, fingerprint: &Fingerprint) {
	println!("🔍 Fingerprint of {} ({})", id, fingerprint.algorithm.name());
	println!("  structural: {}", fingerprint.structural_hash);
	println!("  content:    {}", fingerprint.content_hash);
	println!("  style:      {}", fingerprint.style_hash);
	println!("  semantic:   {}", fingerprint.semantic_hash);
	println!("  combined:   {}", fingerprint.combined_hash);
	println!("📁 Fields: {} (depth {})", fingerprint.field_count, fingerprint.nested_depth);
	if !fingerprint.keywords.is_empty() {
		println!("🏷️  Keywords: {}", fingerprint.keywords.join(", "));
	}
}

fn print_similar(target: &str, matches: &[SimilarityResult]) {
	if matches.is_empty() {
		println!("❌ No documents similar to {}", target);
		return;
	}
	println!("🔍 Documents similar to {}:", target);
	for result in matches {
		let tag = if result.is_duplicate {
			" DUPLICATE"
		} else if result.is_derivative {
			" derivative"
		} else {
			""
		};
		println!(
			"  {:>5.1}%  {}{} (confidence {:.0}%)",
			result.overall_similarity * 100.0,
			result.document_id,
			tag,
			result.confidence * 100.0
		);
		println!(
			"          structure {:.2} · content {:.2} · style {:.2} · semantic {:.2}",
			result.structural_similarity,
			result.content_similarity,
			result.style_similarity,
			result.semantic_similarity
		);
	}
}

fn print_report(report: &MiningReport) {
	let summary = &report.summary;
	println!("✅ Scanned {} documents", summary.documents_scanned);
	println!("📈 Patterns found: {}", summary.total_patterns);
	if let Some(severity) = summary.highest_severity {
		println!("🎯 Highest severity: {} (risk {:.2})", severity, summary.highest_risk);
	}
	for (i, pattern) in report.patterns.iter().enumerate() {
		println!();
		println!(
			"{}. [{}] {} (confidence {:.0}%)",
			i + 1,
			pattern.severity,
			pattern.pattern_type,
			pattern.confidence * 100.0
		);
		println!("   {}", pattern.description);
		println!("   Documents: {}", pattern.affected_documents.join(", "));
		println!("   {}", pattern.recommendation);
	}
	if summary.requires_escalation {
		println!();
		println!("⚠️  Findings require escalation");
	}
}
