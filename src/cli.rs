//! CLI interface for RSE
//!
//! Provides command-line interface for:
//! - Generating a shared reference set
//! - Building q-gram frequency profiles from record files
//! - Rebalancing a reference set against a profile
//! - Encoding record files into bit vectors

use crate::alphabet::Alphabet;
use crate::config::{RseConfig, TargetKind};
use crate::encoder::{Encoder, Measure, Threshold};
use crate::error::{Result, RseError};
use crate::frequency::FrequencyProfile;
use crate::generator::ReferenceSetGenerator;
use crate::processor::{DivergenceMetric, ReferenceSetProcessor};
use crate::qgram::QGramMode;
use crate::storage::{self, IdEncoding, LoadedRecords, RecordLayout};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reference set based encoding for privacy-preserving record linkage")]
#[command(
    long_about = "RSE - Reference Set based Encoding for privacy-preserving record linkage\n\n\
    Records are encoded as bit vectors by comparing their q-grams with a shared set of\n\
    synthetic reference values. Parties that agree on the reference set, measure and\n\
    threshold produce comparable encodings without exchanging plaintext.\n\n\
    Workflow:\n\
    • generate a reference set from a shared seed\n\
    • profile the q-gram frequencies of the datasets\n\
    • rebalance the reference set against the profile\n\
    • encode every dataset with the rebalanced set\n\n\
    Examples:\n\
      rse generate -k 4 -m 200 --seed-phrase 'shared secret' -o ref.txt -v\n\
      rse profile -i a.csv -i b.csv --columns 1,2 -o profile.csv\n\
      rse rebalance -r ref.txt -p profile.csv -o ref.balanced.txt\n\
      rse encode -r ref.balanced.txt -i a.csv -i b.csv --columns 1,2 --calibrate -o a.enc -o b.enc"
)]
#[command(author = "RSE Contributors")]
pub struct Cli {
    /// Enable verbose output and debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Parameters shared by every subcommand; flags override the config file.
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Q-gram length
    #[arg(short, long = "qgram-len")]
    pub q: Option<usize>,

    /// Numeric random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Secret phrase hashed into the random seed (takes precedence over --seed)
    #[arg(long, value_name = "PHRASE")]
    pub seed_phrase: Option<String>,

    /// Keep repeated q-grams within a record
    #[arg(long)]
    pub multiset: bool,

    /// Explicit alphabet symbols (overrides the class flags)
    #[arg(long, value_name = "SYMBOLS")]
    pub alphabet: Option<String>,

    /// Include a-z
    #[arg(long)]
    pub letters: bool,

    /// Include 0-9
    #[arg(long)]
    pub digits: bool,

    /// Include ASCII punctuation
    #[arg(long)]
    pub punctuation: bool,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<RseConfig> {
        let mut config = match &self.config {
            Some(path) => RseConfig::load_json(path)?,
            None => RseConfig::default(),
        };
        if let Some(q) = self.q {
            config.q = q;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.seed_phrase.is_some() {
            config.seed_phrase = self.seed_phrase.clone();
        }
        if self.multiset {
            config.qgram_mode = QGramMode::Multiset;
        }
        if let Some(symbols) = &self.alphabet {
            config.alphabet = Alphabet::new(symbols)?;
        } else if self.letters || self.digits || self.punctuation {
            config.alphabet = Alphabet::from_classes(self.letters, self.digits, self.punctuation)?;
        }
        Ok(config)
    }
}

/// Where records come from.
#[derive(Args, Clone, Debug)]
pub struct RecordArgs {
    /// Delimited record files with a header row
    #[arg(short, long = "input", value_name = "FILE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Zero-based sensitive attribute columns, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub columns: Vec<usize>,

    /// Zero-based record id column
    #[arg(long, default_value_t = 0)]
    pub id_column: usize,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
}

impl RecordArgs {
    fn load(&self, config: &RseConfig, verbose: bool) -> Result<Vec<LoadedRecords>> {
        let layout = RecordLayout {
            id_column: self.id_column,
            columns: self.columns.clone(),
            delimiter: self.delimiter,
            q: config.q,
            mode: config.qgram_mode,
        };
        let mut all = Vec::with_capacity(self.inputs.len());
        for path in &self.inputs {
            let loaded = storage::read_records(path, &layout)?;
            if verbose {
                println!(
                    "  {}: {} records ({} skipped, {} duplicate ids)",
                    path.display(),
                    loaded.records.len(),
                    loaded.skipped,
                    loaded.duplicates
                );
            }
            all.push(loaded);
        }
        if let Some((first, rest)) = all.split_first() {
            if rest.iter().any(|l| l.headers != first.headers) {
                return Err(RseError::config("sensitive attribute headers differ between input files"));
            }
            if verbose {
                for (i, other) in rest.iter().enumerate() {
                    println!("  ids shared by inputs 1 and {}: {}", i + 2, first.common_ids(other));
                }
            }
        }
        Ok(all)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MeasureArg {
    Shared,
    Jaccard,
    Dice,
    Edit,
}

impl From<MeasureArg> for Measure {
    fn from(m: MeasureArg) -> Self {
        match m {
            MeasureArg::Shared => Measure::SharedQGrams,
            MeasureArg::Jaccard => Measure::Jaccard,
            MeasureArg::Dice => Measure::Dice,
            MeasureArg::Edit => Measure::NearestEdit,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MetricArg {
    TotalVariation,
    ChiSquared,
    WeightSpread,
}

impl From<MetricArg> for DivergenceMetric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::TotalVariation => DivergenceMetric::TotalVariation,
            MetricArg::ChiSquared => DivergenceMetric::ChiSquared,
            MetricArg::WeightSpread => DivergenceMetric::WeightSpread,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TargetArg {
    Uniform,
    InverseData,
    Profile,
}

impl From<TargetArg> for TargetKind {
    fn from(t: TargetArg) -> Self {
        match t {
            TargetArg::Uniform => TargetKind::Uniform,
            TargetArg::InverseData => TargetKind::InverseData,
            TargetArg::Profile => TargetKind::Profile,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Bincode,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a random reference set
    #[command(
        long_about = "Generate a random reference set\n\n\
        Draws m distinct strings of length k over the configured alphabet. The set is\n\
        independent of any data, so every party can regenerate it from the same seed\n\
        or seed phrase. The SHA-256 fingerprint printed at the end lets parties confirm\n\
        they hold identical sets.\n\n\
        With --coverage c the set is built so that every q-gram over the alphabet\n\
        occurs in at least c values; m then only sets a minimum size.\n\n\
        Example:\n\
          rse generate -k 4 -m 200 --seed 42 -o ref.txt\n\
          rse generate --letters --digits -k 6 -m 500 --seed-phrase 'shared' -o ref.txt\n\
          rse generate -k 4 -q 2 --coverage 3 --seed 42 -o ref.txt"
    )]
    Generate {
        #[command(flatten)]
        config: ConfigArgs,

        /// Reference value length
        #[arg(short)]
        k: Option<usize>,

        /// Number of reference values
        #[arg(short)]
        m: Option<usize>,

        /// Minimum number of values every q-gram must occur in
        #[arg(long)]
        coverage: Option<usize>,

        /// Output reference set file
        #[arg(short, long, default_value = "reference.txt", value_name = "FILE")]
        output: PathBuf,

        /// Also write the effective configuration as JSON
        #[arg(long, value_name = "FILE")]
        save_config: Option<PathBuf>,
    },

    /// Build a q-gram frequency profile from record files
    #[command(
        long_about = "Build a q-gram frequency profile from record files\n\n\
        Reads every input file, extracts the q-grams of the sensitive columns and counts\n\
        their occurrences across all records. The profile drives rebalancing.\n\n\
        Example:\n\
          rse profile -i a.csv -i b.csv --columns 1,2 -o profile.csv"
    )]
    Profile {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        records: RecordArgs,

        /// Output profile file (qgram,count)
        #[arg(short, long, default_value = "profile.csv", value_name = "FILE")]
        output: PathBuf,

        /// Also write each input's q-gram sets (id<TAB>q-grams) next to it
        #[arg(long)]
        dump_qgrams: bool,
    },

    /// Rebalance a reference set against a frequency profile
    #[command(
        long_about = "Rebalance a reference set against a frequency profile\n\n\
        Swaps reference values that carry over-represented q-grams for values built\n\
        from under-represented ones. A swap is kept only if it strictly lowers the\n\
        divergence from the target distribution, so the result is never worse than\n\
        the input. Slots that run out of improving candidates are reported as\n\
        degraded.\n\n\
        Example:\n\
          rse rebalance -r ref.txt -p profile.csv -o ref.balanced.txt --seed 7\n\
          rse rebalance -r ref.txt -p profile.csv --target inverse-data --metric chi-squared\n\
          rse rebalance -r ref.txt -p profile.csv --letters --digits -o ref.balanced.txt"
    )]
    Rebalance {
        #[command(flatten)]
        config: ConfigArgs,

        /// Reference set to rebalance
        #[arg(short, long, value_name = "FILE")]
        reference: PathBuf,

        /// Data frequency profile
        #[arg(short, long, value_name = "FILE")]
        profile: PathBuf,

        /// Target distribution
        #[arg(long, value_enum)]
        target: Option<TargetArg>,

        /// Target profile file, for --target profile
        #[arg(long, value_name = "FILE")]
        target_profile: Option<PathBuf>,

        /// Divergence metric
        #[arg(long, value_enum)]
        metric: Option<MetricArg>,

        /// Upper bound on swap attempts
        #[arg(long)]
        max_swaps: Option<usize>,

        /// Output reference set file
        #[arg(short, long, default_value = "reference.balanced.txt", value_name = "FILE")]
        output: PathBuf,

        /// Write the rebalancing summary as JSON
        #[arg(long, value_name = "FILE")]
        summary: Option<PathBuf>,
    },

    /// Encode record files against a reference set
    #[command(
        long_about = "Encode record files against a reference set\n\n\
        Each record becomes a bit vector of length m: bit i is set when the record's\n\
        q-grams pass the threshold against reference value i. With --calibrate the\n\
        top-n count is derived from all inputs together so every encoding carries the\n\
        same number of set bits.\n\n\
        Example:\n\
          rse encode -r ref.txt -i a.csv --columns 1,2 --cutoff 0.3 -o a.enc\n\
          rse encode -r ref.txt -i a.csv -i b.csv --columns 1,2 --calibrate -o a.enc -o b.enc"
    )]
    Encode {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        records: RecordArgs,

        /// Reference set file
        #[arg(short, long, value_name = "FILE")]
        reference: PathBuf,

        /// Measure
        #[arg(long, value_enum)]
        measure: Option<MeasureArg>,

        /// Similarity (or distance) cutoff
        #[arg(long, conflicts_with_all = ["top_n", "calibrate"])]
        cutoff: Option<f64>,

        /// Set bits for the n best reference values
        #[arg(long, conflicts_with = "calibrate")]
        top_n: Option<usize>,

        /// Derive the top-n count from the inputs
        #[arg(long)]
        calibrate: bool,

        /// Upper bound for the calibrated top-n count
        #[arg(long)]
        top_n_cap: Option<usize>,

        /// Output files, one per input
        #[arg(short, long = "output", value_name = "FILE", required = true)]
        outputs: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Install the tracing subscriber; `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "rse=debug" } else { "rse=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn banner(verbose: bool, title: &str) {
    if verbose {
        println!("RSE v{} - {title}", env!("CARGO_PKG_VERSION"));
        println!("{}", "=".repeat(title.len() + 9 + env!("CARGO_PKG_VERSION").len()));
    }
}

fn qgram_dump_path(input: &Path) -> PathBuf {
    let mut name = input.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".qgrams");
    input.with_file_name(name)
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli.command, cli.verbose)
}

/// Run one parsed subcommand.
pub fn execute(command: Commands, verbose: bool) -> Result<()> {
    match command {
        Commands::Generate {
            config,
            k,
            m,
            coverage,
            output,
            save_config,
        } => {
            banner(verbose, "Reference Set Generation");

            let mut config = config.resolve()?;
            if let Some(k) = k {
                config.k = k;
            }
            if let Some(m) = m {
                config.m = m;
            }
            if coverage.is_some() {
                config.coverage = coverage;
            }
            config.validate()?;
            if !config.is_reproducible() {
                tracing::warn!("no seed given, the reference set cannot be regenerated by other parties");
            }

            let generator = ReferenceSetGenerator::new(config.alphabet.clone(), config.k);
            let set = match config.coverage {
                Some(c) => generator.generate_covering(config.q, c, config.m, &mut config.rng())?,
                None => generator.generate(config.m, &mut config.rng())?,
            };
            storage::write_reference_set(&set, &output)?;
            config.m = set.len();
            if let Some(path) = save_config {
                config.save_json(path)?;
            }
            info!(m = set.len(), k = set.value_len(), "reference set written");

            if verbose {
                println!("\nGeneration complete!");
                println!("  Output: {}", output.display());
                println!("  Alphabet: {} symbols", config.alphabet.len());
                println!("  Values: {} of length {}", set.len(), set.value_len());
            }
            println!("Fingerprint: {}", set.fingerprint());
            Ok(())
        }

        Commands::Profile {
            config,
            records,
            output,
            dump_qgrams,
        } => {
            banner(verbose, "Frequency Profile");

            let config = config.resolve()?;
            let loaded = records.load(&config, verbose)?;
            let mut profile = FrequencyProfile::new();
            for (input, l) in records.inputs.iter().zip(&loaded) {
                profile.merge(&FrequencyProfile::from_qgram_sets(l.records.iter().map(|(_, qs)| qs)));
                if dump_qgrams {
                    storage::write_qgram_sets(&l.records, qgram_dump_path(input))?;
                }
            }
            storage::write_profile(&profile, &output)?;

            if verbose {
                println!("\nProfile complete!");
                println!("  Output: {}", output.display());
                println!("  Distinct q-grams: {}", profile.len());
                for (g, c) in profile.top(5) {
                    println!("    {g:>6} {c}");
                }
            }
            Ok(())
        }

        Commands::Rebalance {
            config,
            reference,
            profile,
            target,
            target_profile,
            metric,
            max_swaps,
            output,
            summary,
        } => {
            banner(verbose, "Reference Set Rebalancing");

            let mut config = config.resolve()?;
            if let Some(t) = target {
                config.target = t.into();
            }
            if let Some(m) = metric {
                config.divergence = m.into();
            }
            if let Some(n) = max_swaps {
                config.max_swaps = n;
            }

            let set = storage::read_reference_set(&reference)?;
            config.k = set.value_len();
            config.m = set.len();
            config.validate()?;
            set.check_alphabet(&config.alphabet)?;

            let data = storage::read_profile(&profile)?;
            let target_profile = target_profile.map(storage::read_profile).transpose()?;
            let options = config.rebalance_options(target_profile)?;
            let processor = ReferenceSetProcessor::new(config.alphabet.clone(), config.q, options);
            let rebalanced = processor.rebalance(set, &data, &mut config.rng())?;
            storage::write_reference_set(&rebalanced.reference_set, &output)?;
            if let Some(path) = summary {
                fs::write(path, serde_json::to_string_pretty(&rebalanced.summary)?)?;
            }

            let s = &rebalanced.summary;
            if verbose {
                println!("\nRebalancing complete!");
                println!("  Output: {}", output.display());
                println!("  Divergence: {:.6} -> {:.6}", s.initial_divergence, s.final_divergence);
                println!(
                    "  Swaps: {} accepted, {} rejected of {} attempts ({:?})",
                    s.accepted, s.rejected, s.attempts, s.stop_reason
                );
                println!("  Slots modified: {}", s.slots_modified);
            }
            if s.is_degraded() {
                println!("Warning: {} slots could not be improved", s.degraded_slots);
            }
            println!("Fingerprint: {}", rebalanced.reference_set.fingerprint());
            Ok(())
        }

        Commands::Encode {
            config,
            records,
            reference,
            measure,
            cutoff,
            top_n,
            calibrate,
            top_n_cap,
            outputs,
            format,
        } => {
            banner(verbose, "Encoding");

            let mut config = config.resolve()?;
            if let Some(m) = measure {
                config.measure = m.into();
            }
            if let Some(x) = cutoff {
                config.threshold = Threshold::Cutoff(x);
                config.calibrate_top_n = false;
            }
            if let Some(n) = top_n {
                config.threshold = Threshold::TopN(n);
                config.calibrate_top_n = false;
            }
            if calibrate {
                config.calibrate_top_n = true;
            }
            if top_n_cap.is_some() {
                config.top_n_cap = top_n_cap;
            }
            if outputs.len() != records.inputs.len() {
                return Err(RseError::config(format!(
                    "{} inputs but {} outputs",
                    records.inputs.len(),
                    outputs.len()
                )));
            }

            let set = storage::read_reference_set(&reference)?;
            config.validate_encoding()?;
            if config.q > set.value_len() {
                return Err(RseError::config(format!(
                    "q ({}) exceeds the reference value length {}",
                    config.q,
                    set.value_len()
                )));
            }

            let loaded = records.load(&config, verbose)?;
            let datasets: Vec<_> = loaded.iter().map(LoadedRecords::qgram_sets).collect();

            let mut encoder = Encoder::new(&set, config.q, config.measure, config.threshold)?;
            if config.calibrate_top_n {
                let slices: Vec<&[_]> = datasets.iter().map(Vec::as_slice).collect();
                let n = encoder.calibrate_top_n(&slices, config.top_n_cap)?;
                if n == 0 {
                    return Err(RseError::config(
                        "some record shares nothing with the reference set, cannot calibrate top-n",
                    ));
                }
                if verbose {
                    println!("  Calibrated top-n: {n}");
                }
                encoder = Encoder::new(&set, config.q, config.measure, Threshold::TopN(n))?;
            }

            for ((l, qsets), out) in loaded.iter().zip(&datasets).zip(&outputs) {
                let vectors = encoder.encode_batch(qsets)?;
                let encoded: Vec<IdEncoding> = l.records.iter().map(|(id, _)| id.clone()).zip(vectors).collect();
                match format {
                    OutputFormat::Text => storage::write_encodings_text(&encoded, out)?,
                    OutputFormat::Bincode => storage::write_encodings_bincode(&encoded, out)?,
                }
                if verbose {
                    let ones: usize = encoded.iter().map(|(_, v)| v.count_ones()).sum();
                    println!(
                        "  {}: {} encodings, {:.2} bits set on average",
                        out.display(),
                        encoded.len(),
                        ones as f64 / encoded.len().max(1) as f64
                    );
                }
            }

            if verbose {
                println!("\nEncoding complete!");
                println!("  Reference set: {}", set.fingerprint());
            }
            Ok(())
        }
    }
}
