//! Reference command-line surface (SPEC_FULL §6), structured the way the
//! teacher's own CLI binaries (`src/bin/bbt-diag.rs`) use `clap`'s derive
//! API — minus the `diagnostics_fixtures`/telemetry machinery this crate
//! has no equivalent of.
//!
//! Wires a file-based Source/Sink pipeline: a `WavReader<Complex<i16>>` feeds
//! an `IqBaseBand`, which feeds the configured demodulator (and, for FM, an
//! optional de-emphasis stage), which feeds a `WavWriter<i16>`. Device I/O
//! (`original_source/src/rtlsource.hh`'s contract) is documented but out of
//! scope, per spec.md.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use sdrkit::blocking::DriveMode;
use sdrkit::complex::Complex;
use sdrkit::config_file::{DemodKind, PipelineConfig};
use sdrkit::dsp::{AmDemod, FmDeemph, FmDemod, IqBaseBand, UsbDemod};
use sdrkit::io::{WavReader, WavWriter};
use sdrkit::queue::Queue;

#[derive(Parser, Debug)]
#[command(name = "sdrkit-cli", about = "Reference CLI for the sdrkit pipeline runtime")]
struct Cli {
    /// Input WAV file, complex 16-bit I/Q samples.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output WAV file, 16-bit mono demodulated audio.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Center frequency to shift to baseband, in Hz.
    #[arg(short = 'F', long, default_value_t = 0.0)]
    frequency: f64,

    /// FIR band-pass filter width, in Hz.
    #[arg(long, default_value_t = 12_500.0)]
    filter_width: f64,

    /// Integer decimation factor applied after filtering.
    #[arg(long, default_value_t = 1)]
    subsample: usize,

    /// Optional pipeline config JSON; CLI flags above override its
    /// baseband section.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print per-buffer progress to stderr while running.
    #[arg(short = 'M', long)]
    monitor: bool,
}

fn main() -> ExitCode {
    sdrkit::init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sdrkit-cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline_cfg = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path),
        None => PipelineConfig::default(),
    };
    pipeline_cfg.baseband.center_frequency_hz = cli.frequency;
    pipeline_cfg.baseband.shift_frequency_hz = cli.frequency;
    pipeline_cfg.baseband.filter_width_hz = cli.filter_width;
    pipeline_cfg.baseband.sub_sample = cli.subsample;

    let queue = Queue::new();

    let writer = Arc::new(WavWriter::<i16>::create(&cli.output)?);

    let baseband = Arc::new(IqBaseBand::new(
        Arc::clone(&queue),
        pipeline_cfg.baseband.center_frequency_hz,
        pipeline_cfg.baseband.shift_frequency_hz,
        pipeline_cfg.baseband.filter_width_hz,
        pipeline_cfg.baseband.filter_order,
        pipeline_cfg.baseband.sub_sample,
        pipeline_cfg.baseband.output_rate_hz,
    ));

    // Wire downstream-of-baseband first so the upstream reader's Config
    // cascades through the whole chain in one propagation once connected.
    match pipeline_cfg.demod.kind {
        DemodKind::Am => {
            let demod = Arc::new(AmDemod::new(Arc::clone(&queue)));
            baseband.source().connect(demod.clone(), true)?;
            demod.source().connect(writer.clone(), true)?;
        }
        DemodKind::Usb => {
            let demod = Arc::new(UsbDemod::new(Arc::clone(&queue)));
            baseband.source().connect(demod.clone(), true)?;
            demod.source().connect(writer.clone(), true)?;
        }
        DemodKind::Fm => {
            let demod = Arc::new(FmDemod::new(Arc::clone(&queue)));
            baseband.source().connect(demod.clone(), true)?;
            if pipeline_cfg.demod.fm_deemphasis {
                let deemph = Arc::new(FmDeemph::new(Arc::clone(&queue), true));
                demod.source().connect(deemph.clone(), true)?;
                deemph.source().connect(writer.clone(), true)?;
            } else {
                demod.source().connect(writer.clone(), true)?;
            }
        }
    }

    let reader = WavReader::<Complex<i16>>::open(
        &cli.input,
        pipeline_cfg.buffers.buffer_size,
        Arc::clone(&queue),
        DriveMode::Parallel,
    )?;
    reader.source().connect(baseband.clone(), true)?;

    if cli.monitor {
        eprintln!(
            "sdrkit-cli: {} -> {} (frequency={} Hz, filter_width={} Hz, subsample={})",
            cli.input.display(),
            cli.output.display(),
            cli.frequency,
            cli.filter_width,
            cli.subsample,
        );
    }

    reader.start();
    reader.wait();
    writer.close()?;

    if cli.monitor {
        eprintln!("sdrkit-cli: done");
    }

    Ok(())
}
