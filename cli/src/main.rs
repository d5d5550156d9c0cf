mod bitgen;
mod config;
mod diagnostics;
mod wav;

use bitgen::BitPattern;
use clap::{Parser, Subcommand};
use config::{CliError, PhyArgs};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use sonicframe_core::{
    correlation_trace, format_bits, parse_bit_string, Decoder, Encoder, FrameReport,
    PhyConfig, PreambleTemplate, Receiver,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wav::WavSource;

#[derive(Parser)]
#[command(name = "sonicframe")]
#[command(about = "Acoustic frame modem: chirp-synchronized FSK/OFDM bit frames over audio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a test payload as a '0'/'1' text file
    GenBits {
        /// Output text file
        #[arg(value_name = "OUTPUT.TXT")]
        output: PathBuf,

        /// Number of bits
        #[arg(short = 'n', long, default_value_t = 1000)]
        count: usize,

        /// random, alternating, pattern:<bits> or blocks:<run>
        #[arg(short, long, default_value = "random")]
        pattern: BitPattern,

        /// Seed for the random pattern
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },

    /// Encode a '0'/'1' text payload into a WAV file
    Encode {
        /// Input text file of '0'/'1' characters
        #[arg(value_name = "INPUT.TXT")]
        input: PathBuf,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        #[command(flatten)]
        phy: PhyArgs,
    },

    /// Find and decode every frame in a WAV capture
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Output text file, one accepted payload per line (stdout if omitted)
        #[arg(value_name = "OUTPUT.TXT")]
        output: Option<PathBuf>,

        #[command(flatten)]
        phy: PhyArgs,

        /// Samples fed to the receiver per block
        #[arg(long, default_value_t = 4096)]
        block_size: usize,

        /// Write the per-window correlation scores as CSV
        #[arg(long, value_name = "FILE.CSV")]
        ncc_trace: Option<PathBuf>,

        /// Write per-bit responses and confidences as CSV
        #[arg(long, value_name = "FILE.CSV")]
        bit_table: Option<PathBuf>,

        /// Write the capture with a click at every bit boundary
        #[arg(long, value_name = "FILE.WAV")]
        beep_track: Option<PathBuf>,
    },

    /// Encode and decode in memory, optionally through a noisy channel
    Loopback {
        /// Payload file; a random payload is generated if omitted
        #[arg(long, value_name = "INPUT.TXT")]
        input: Option<PathBuf>,

        #[command(flatten)]
        phy: PhyArgs,

        /// Standard deviation of additive Gaussian noise
        #[arg(long, default_value_t = 0.0)]
        noise: f32,

        /// Channel gain applied before the noise
        #[arg(long, default_value_t = 1.0)]
        gain: f32,

        /// Seed for the generated payload and the noise
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },

    /// Write the preamble correlation trace of a WAV capture as CSV, scored like the receiver
    Trace {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Output CSV file
        #[arg(value_name = "OUTPUT.CSV")]
        output: PathBuf,

        #[command(flatten)]
        phy: PhyArgs,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::GenBits {
            output,
            count,
            pattern,
            seed,
        } => gen_bits_command(&output, count, &pattern, seed)?,
        Commands::Encode { input, output, phy } => encode_command(&input, &output, &phy)?,
        Commands::Decode {
            input,
            output,
            phy,
            block_size,
            ncc_trace,
            bit_table,
            beep_track,
        } => decode_command(
            &input,
            output.as_deref(),
            &phy,
            block_size,
            &DecodeExports {
                ncc_trace,
                bit_table,
                beep_track,
            },
        )?,
        Commands::Loopback {
            input,
            phy,
            noise,
            gain,
            seed,
        } => loopback_command(input.as_deref(), &phy, noise, gain, seed)?,
        Commands::Trace { input, output, phy } => trace_command(&input, &output, &phy)?,
    }

    Ok(())
}

struct DecodeExports {
    ncc_trace: Option<PathBuf>,
    bit_table: Option<PathBuf>,
    beep_track: Option<PathBuf>,
}

fn read_bits(path: &Path) -> Result<Vec<bool>, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    Ok(parse_bit_string(&text))
}

fn write_text(path: &Path, text: &str) -> Result<(), CliError> {
    std::fs::write(path, text).map_err(|e| CliError::io(path, e))
}

fn open_capture(path: &Path, config: &PhyConfig) -> Result<WavSource, CliError> {
    let source = WavSource::open(path)?;
    let spec = source.spec();
    info!(
        "Read WAV: {} Hz, {} channels, {} bits, {} frames",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        source.duration()
    );
    if spec.sample_rate != config.sample_rate {
        return Err(CliError::SampleRateMismatch {
            expected: config.sample_rate,
            actual: spec.sample_rate,
        });
    }
    Ok(source)
}

fn gen_bits_command(
    output: &Path,
    count: usize,
    pattern: &BitPattern,
    seed: u64,
) -> Result<(), CliError> {
    let bits = pattern.generate(count, seed);
    write_text(output, &format!("{}\n", format_bits(&bits)))?;
    info!("Wrote {} bits ({}) to {}", bits.len(), pattern, output.display());
    Ok(())
}

fn encode_command(input: &Path, output: &Path, phy: &PhyArgs) -> Result<(), CliError> {
    let bits = read_bits(input)?;
    info!("Read {} bits from {}", bits.len(), input.display());

    let mut config = phy.resolve()?;
    if phy.payload_bits.is_none() {
        config.payload_bits = bits.len();
    }

    let encoder = Encoder::new(config)?;
    let samples = encoder.encode(&bits)?;
    let config = encoder.config();

    wav::write_wav(output, &samples, config.sample_rate)?;
    info!(
        "Wrote {} samples ({:.3} s, {}) to {}",
        samples.len(),
        samples.len() as f32 / config.sample_rate as f32,
        config.modulation,
        output.display()
    );
    Ok(())
}

fn log_report(index: usize, report: &FrameReport) {
    let quality = report.demodulated.as_ref().map(|frame| frame.quality);
    match (&report.outcome, quality) {
        (Ok(frame), Some(quality)) => info!(
            "Frame {}: accepted at sample {} (score {:.3}, offset {}), CRC {:#04x}, mean confidence {:.2}, {} weak bits, {} repaired groups",
            index,
            report.sync.sample_index,
            report.sync.score,
            report.alignment_offset,
            frame.crc,
            quality.mean_confidence,
            quality.weak_bits,
            frame.repaired_groups
        ),
        (Ok(frame), None) => info!("Frame {}: accepted, CRC {:#04x}", index, frame.crc),
        (Err(e), _) => warn!(
            "Frame {}: rejected at sample {} (score {:.3}): {}",
            index, report.sync.sample_index, report.sync.score, e
        ),
    }
}

fn accepted_payloads(reports: &[FrameReport]) -> String {
    reports
        .iter()
        .filter_map(FrameReport::payload)
        .map(|payload| format_bits(payload) + "\n")
        .collect()
}

fn decode_command(
    input: &Path,
    output: Option<&Path>,
    phy: &PhyArgs,
    block_size: usize,
    exports: &DecodeExports,
) -> Result<(), CliError> {
    let config = phy.resolve()?;
    let mut source = open_capture(input, &config)?;
    let mut receiver = Receiver::new(config.clone())?;

    let mut trace = match &exports.ncc_trace {
        Some(path) => Some(diagnostics::TraceWriter::create(path)?),
        None => None,
    };
    let mut capture = Vec::new();

    let mut block = vec![0.0f32; block_size.max(1)];
    let mut reports = Vec::new();
    loop {
        let read = source.read_block(&mut block)?;
        if read == 0 {
            break;
        }
        let samples = &block[..read];
        if exports.beep_track.is_some() {
            capture.extend_from_slice(samples);
        }
        let new_reports = match trace.as_mut() {
            Some(writer) => receiver.push_with(samples, |index, score| writer.record(index, score)),
            None => receiver.push(samples),
        };
        for report in new_reports {
            log_report(reports.len(), &report);
            reports.push(report);
        }
    }
    for report in receiver.finish() {
        log_report(reports.len(), &report);
        reports.push(report);
    }
    info!(
        "Processed {} samples, {} preamble(s) confirmed",
        receiver.samples_processed(),
        reports.len()
    );

    if let (Some(writer), Some(path)) = (trace, &exports.ncc_trace) {
        let rows = writer.finish()?;
        info!("Wrote {} correlation scores to {}", rows, path.display());
    }
    if let Some(path) = &exports.bit_table {
        let rows = diagnostics::write_bit_table(path, &reports)?;
        info!("Wrote {} bit decisions to {}", rows, path.display());
    }
    if let Some(path) = &exports.beep_track {
        let track = diagnostics::beep_track(&capture, &reports, &config);
        wav::write_wav(path, &track, config.sample_rate)?;
        info!("Wrote beep track to {}", path.display());
    }

    let accepted = reports.iter().filter(|report| report.is_accepted()).count();
    if accepted == 0 {
        return Err(CliError::NoFrameAccepted(reports.len()));
    }

    let text = accepted_payloads(&reports);
    match output {
        Some(path) => {
            write_text(path, &text)?;
            info!("Wrote {} payload(s) to {}", accepted, path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn loopback_command(
    input: Option<&Path>,
    phy: &PhyArgs,
    noise: f32,
    gain: f32,
    seed: u64,
) -> Result<(), CliError> {
    let mut config = phy.resolve()?;
    let payload = match input {
        Some(path) => {
            let bits = read_bits(path)?;
            if phy.payload_bits.is_none() {
                config.payload_bits = bits.len();
            }
            bits
        }
        None => BitPattern::Random.generate(config.payload_bits, seed),
    };

    let mut samples = Encoder::new(config.clone())?.encode(&payload)?;
    samples.iter_mut().for_each(|s| *s *= gain);
    if noise > 0.0 {
        let normal = Normal::new(0.0f32, noise)
            .map_err(|e| CliError::InvalidArgument(format!("noise level {}: {}", noise, e)))?;
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        samples.iter_mut().for_each(|s| *s += normal.sample(&mut rng));
    }

    let reports = Decoder::new(config)?.decode_all(&samples)?;
    for (index, report) in reports.iter().enumerate() {
        log_report(index, report);
    }

    let Some(decoded) = reports.iter().find_map(FrameReport::payload) else {
        return Err(CliError::NoFrameAccepted(reports.len()));
    };
    let errors = decoded
        .iter()
        .zip(&payload)
        .filter(|(a, b)| a != b)
        .count();
    println!(
        "loopback: {} bits sent, {} received, {} bit errors, {} frame(s) detected",
        payload.len(),
        decoded.len(),
        errors,
        reports.len()
    );
    Ok(())
}

fn trace_command(input: &Path, output: &Path, phy: &PhyArgs) -> Result<(), CliError> {
    let config = phy.resolve()?;
    let samples = open_capture(input, &config)?.read_all()?;
    let template = PreambleTemplate::new(&config);

    let scores = correlation_trace(&samples, &template, config.scoring)?;
    let rows = diagnostics::write_trace(output, &scores, 0)?;

    if let Some((index, peak)) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        info!("Peak {} score {:.4} at sample {}", config.scoring, peak, index);
    }
    info!("Wrote {} correlation scores to {}", rows, output.display());
    Ok(())
}
