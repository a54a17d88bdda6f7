use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use zenb_vitals::{
    ChannelKind, PipelineEvent, ProcessingConfig, Sample, Session, SignalSource, SourceCursor,
    SyntheticBreath, SyntheticMotion, SyntheticPulse,
};

const SEC: i64 = 1_000_000;

#[derive(Parser)]
#[command(name = "zenb-cli", version, about = "Simulate and inspect zenb-vitals sessions")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deterministic synthetic session and print JSON-line events
    Simulate(SimulateArgs),
    /// Print the default (or loaded) configuration as TOML
    ConfigDump {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate a TOML configuration
    ConfigCheck { path: PathBuf },
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// Session length in seconds
    #[arg(long, default_value_t = 60)]
    duration: u32,
    #[arg(long, default_value_t = 72.0)]
    heart_bpm: f32,
    #[arg(long, default_value_t = 14.0)]
    breath_bpm: f32,
    /// Pulse intensity noise (camera units)
    #[arg(long, default_value_t = 0.2)]
    pulse_noise: f32,
    /// Breath envelope noise
    #[arg(long, default_value_t = 0.02)]
    breath_noise: f32,
    /// Respiratory sinus arrhythmia depth in bpm
    #[arg(long, default_value_t = 4.0)]
    rsa_depth: f32,
    /// Emit RGB frames encoding this SpO2
    #[arg(long)]
    spo2: Option<f32>,
    /// Motion burst as START:END[:PEAK] seconds, repeatable
    #[arg(long = "motion-burst", value_parser = parse_burst)]
    motion_bursts: Vec<(f32, f32, f32)>,
    /// Leave out the microphone channel
    #[arg(long)]
    no_audio: bool,
    /// Leave out the accelerometer channel
    #[arg(long)]
    no_motion: bool,
    /// Only print the final aggregate
    #[arg(long)]
    summary_only: bool,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// TOML configuration; ZENB_VITALS_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_burst(s: &str) -> Result<(f32, f32, f32), String> {
    let parts: Vec<&str> = s.split(':').collect();
    let num = |p: &str| p.trim().parse::<f32>().map_err(|e| format!("invalid number {p:?}: {e}"));
    match parts.as_slice() {
        [start, end] => Ok((num(start)?, num(end)?, 4.0)),
        [start, end, peak] => Ok((num(start)?, num(end)?, num(peak)?)),
        _ => Err("expected START:END or START:END:PEAK".to_string()),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ProcessingConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ProcessingConfig::from_file_with_env(path)?,
        None => ProcessingConfig::load_layered(None, None)?,
    };
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match cli.cmd {
        Commands::Simulate(args) => simulate(args)?,
        Commands::ConfigDump { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.to_toml_string()?);
        }
        Commands::ConfigCheck { path } => {
            ProcessingConfig::from_file_with_env(&path)?;
            println!("{}: ok", path.display());
        }
    }
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_ref())?;
    let tick_us = config.session.tick_interval_ms as i64 * 1_000;

    let mut pulse = SyntheticPulse::new(args.heart_bpm, config.pulse.nominal_rate_hz, args.seed)
        .with_noise(args.pulse_noise)
        .with_rsa(args.breath_bpm / 60.0, args.rsa_depth);
    if let Some(spo2) = args.spo2 {
        pulse = pulse.with_rgb(spo2);
    }
    let mut sources: Vec<SourceCursor<Box<dyn SignalSource>>> =
        vec![SourceCursor::new(Box::new(pulse))];
    if !args.no_audio {
        let breath_rate_hz = config.breathing.nominal_rate_hz;
        let breath = SyntheticBreath::new(args.breath_bpm, breath_rate_hz, args.seed + 1)
            .with_noise(args.breath_noise);
        sources.push(SourceCursor::new(Box::new(breath)));
    }
    if !args.no_motion {
        let still = SyntheticMotion::new(config.motion.nominal_rate_hz, args.seed + 2);
        let motion = args
            .motion_bursts
            .iter()
            .fold(still, |m, &(s, e, p)| m.with_burst(s, e, p));
        sources.push(SourceCursor::new(Box::new(motion)));
    }

    let mut session = Session::new(config)?;
    for cursor in sources.iter_mut() {
        cursor.open()?;
        session.enable_channel(cursor.kind())?;
    }
    session.start(0)?;
    log::info!(
        "simulating {} s: heart {} bpm, breathing {} brpm",
        args.duration,
        args.heart_bpm,
        args.breath_bpm
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let end_us = args.duration as i64 * SEC;
    let mut now = tick_us;
    while now <= end_us {
        for cursor in sources.iter_mut() {
            let kind: ChannelKind = cursor.kind();
            let samples: Vec<Sample> = cursor.take_until(now);
            for s in samples {
                session.push(kind, s);
            }
        }
        for event in session.tick(now) {
            if !args.summary_only {
                writeln!(out, "{}", event.to_json_line()?)?;
            }
        }
        now += tick_us;
    }

    if let Some(aggregate) = session.stop(end_us) {
        writeln!(out, "{}", PipelineEvent::SessionEnded(aggregate).to_json_line()?)?;
    }
    out.flush()?;
    Ok(())
}
