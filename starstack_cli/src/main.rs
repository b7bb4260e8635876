//! Command line for stacking channel batches, merging them into an RGB
//! composite, and composing single exposures.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use common::log_setup::setup_logging;
use starstack::{
    BatchInput, Channel, ChannelReport, PipelineConfig, PipelineError, Strategy, run_compose,
    run_pipeline, run_stack,
};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log filter, e.g. "debug" or "starstack=trace". RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// YAML or JSON pipeline configuration. Flags below override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Registration strategy for frames within a batch, or between the
    /// exposures of `compose`.
    #[arg(long, global = true, value_enum)]
    strategy: Option<StrategyArg>,

    /// Rescale every stack so its maximum is 1.
    #[arg(long, global = true)]
    normalize_after_stack: bool,

    /// Wildcard selecting frames in source directories (default "*.fits").
    #[arg(long, global = true, value_name = "GLOB")]
    pattern: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Enhanced correlation coefficient maximization.
    Correlation,
    /// Star triangle matching with RANSAC.
    PointPattern,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Correlation => Strategy::CorrelationOptimization,
            StrategyArg::PointPattern => Strategy::PointPatternMatching,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ChannelArg {
    Red,
    Green,
    Blue,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Red => Channel::Red,
            ChannelArg::Green => Channel::Green,
            ChannelArg::Blue => Channel::Blue,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Stack one directory of frames into a FITS file.
    Stack {
        /// Alignment target; defaults to the brightest frame.
        #[arg(long)]
        reference: Option<PathBuf>,
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Channel name used in logs.
        #[arg(long, value_enum, default_value = "red")]
        channel: ChannelArg,
    },
    /// Stack red, green and blue batches and merge them into an 8-bit image.
    Merge(MergeArgs),
    /// Align three single exposures and write them as an 8-bit image.
    Compose {
        #[arg(long)]
        red: PathBuf,
        #[arg(long)]
        green: PathBuf,
        #[arg(long)]
        blue: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct MergeArgs {
    /// Source directory for every channel without its own.
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    red_source: Option<PathBuf>,
    #[arg(long)]
    green_source: Option<PathBuf>,
    #[arg(long)]
    blue_source: Option<PathBuf>,

    /// Reference frame for every channel without its own.
    #[arg(long)]
    reference: Option<PathBuf>,
    #[arg(long)]
    red_reference: Option<PathBuf>,
    #[arg(long)]
    green_reference: Option<PathBuf>,
    #[arg(long)]
    blue_reference: Option<PathBuf>,

    #[arg(long)]
    output: PathBuf,
}

impl MergeArgs {
    fn inputs(&self) -> Result<[BatchInput; 3]> {
        let per_channel = [
            (Channel::Red, &self.red_source, &self.red_reference),
            (Channel::Green, &self.green_source, &self.green_reference),
            (Channel::Blue, &self.blue_source, &self.blue_reference),
        ];
        let [red, green, blue] = per_channel.map(|(channel, source, reference)| {
            let Some(source) = source.as_ref().or(self.source.as_ref()) else {
                bail!("no source directory for {channel}, use --source or --{channel}-source");
            };
            Ok(BatchInput {
                source: source.clone(),
                reference: reference.as_ref().or(self.reference.as_ref()).cloned(),
            })
        });
        Ok([red?, green?, blue?])
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level).context("failed to set up logging")?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(pattern) = &cli.pattern {
        config.pattern = pattern.clone();
    }
    if cli.normalize_after_stack {
        config.normalize_after_stack = true;
    }
    if let Some(strategy) = cli.strategy {
        if matches!(cli.command, Command::Compose { .. }) {
            config.compose_strategy = strategy.into();
        } else {
            config.strategy = strategy.into();
        }
    }
    config.validate()?;

    match &cli.command {
        Command::Stack {
            reference,
            source,
            output,
            channel,
        } => {
            let input = BatchInput {
                source: source.clone(),
                reference: reference.clone(),
            };
            let report = run_stack((*channel).into(), &input, output, &config)
                .inspect_err(print_failed_channels)
                .context("stacking failed")?;
            println!("{}", report.output.display());
            print_channel(&report.channel);
        }
        Command::Merge(args) => {
            let inputs = args.inputs()?;
            let report = run_pipeline(&inputs, &args.output, &config)
                .inspect_err(print_failed_channels)
                .context("merge failed")?;
            println!("{}", report.output.display());
            for channel in &report.channels {
                print_channel(channel);
            }
            for channel in &report.fallbacks {
                println!("{channel}: kept unaligned");
            }
        }
        Command::Compose {
            red,
            green,
            blue,
            output,
        } => {
            let frames = [red.clone(), green.clone(), blue.clone()];
            let report = run_compose(&frames, output, &config).context("compose failed")?;
            println!("{}", report.output.display());
            println!("reference: {}", report.reference);
            for channel in &report.fallbacks {
                println!("{channel}: kept unaligned");
            }
        }
    }
    Ok(())
}

fn print_channel(report: &ChannelReport) {
    println!("{report}");
    for skip in &report.skipped {
        println!("  skipped {skip}");
    }
}

fn print_failed_channels(error: &PipelineError) {
    if let PipelineError::Stacking { channels } = error {
        for channel in channels {
            eprintln!("{channel}");
        }
    }
}
