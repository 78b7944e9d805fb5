//! Ratchet simulation binary.
//!
//! # Usage
//!
//! ```bash
//! # Twenty alternating messages over the Double Ratchet
//! ratchet-sim --protocol dr --messages 20
//!
//! # BARK with lite layers, bursts, verbose logs
//! ratchet-sim --protocol bark --uni-variant lite --pattern burst --log-level debug
//! ```

use clap::{Parser, ValueEnum};
use ratchet_core::{
    Bark, Brke, DoubleRatchet, Hybrid, Jmm, Ratchet, RatchetConfig, Sch, UniVariant,
    config::{DEFAULT_MAX_PENDING, DEFAULT_MAX_SKIP},
};
use ratchet_harness::{HarnessError, Pattern, Report, run};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Protocol {
    /// Double Ratchet
    Dr,
    /// Bidirectional ratcheted key exchange
    Brke,
    /// Onion ratchet
    Bark,
    /// BARK with forward-secure light messages
    Hybrid,
    /// Healable channel
    Jmm,
    /// Synchronized channel
    Sch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PatternArg {
    Alternating,
    Burst,
    Crossing,
    Shuffled,
}

impl From<PatternArg> for Pattern {
    fn from(arg: PatternArg) -> Self {
        match arg {
            PatternArg::Alternating => Pattern::Alternating,
            PatternArg::Burst => Pattern::Burst,
            PatternArg::Crossing => Pattern::Crossing,
            PatternArg::Shuffled => Pattern::Shuffled,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Full,
    Lite,
}

/// Ratchet protocol simulator
#[derive(Parser, Debug)]
#[command(name = "ratchet-sim")]
#[command(about = "Run a ratchet protocol through a simulated two-party conversation")]
#[command(version)]
struct Args {
    /// Protocol to run
    #[arg(short, long, value_enum, default_value = "dr")]
    protocol: Protocol,

    /// Messages to exchange
    #[arg(short, long, default_value = "16")]
    messages: usize,

    /// Conversation shape
    #[arg(long, value_enum, default_value = "alternating")]
    pattern: PatternArg,

    /// Seed for protocol entropy and delivery order
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// BARK layer type
    #[arg(long, value_enum, default_value = "full")]
    uni_variant: VariantArg,

    /// Largest gap between received message indices
    #[arg(long, default_value_t = DEFAULT_MAX_SKIP)]
    max_skip: u64,

    /// Unacknowledged entries tolerated before sends are refused
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING)]
    max_pending: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn simulate<R: Ratchet>(args: &Args, config: &RatchetConfig) -> Result<Report, HarnessError> {
    tracing::info!(
        protocol = R::NAME,
        messages = args.messages,
        pattern = ?args.pattern,
        seed = args.seed,
        "starting simulation"
    );
    run::<R>(args.pattern.into(), args.messages, args.seed, config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let variant = match args.uni_variant {
        VariantArg::Full => UniVariant::Full,
        VariantArg::Lite => UniVariant::Lite,
    };
    let config = RatchetConfig {
        max_skip: args.max_skip,
        max_pending: args.max_pending,
        ..RatchetConfig::default()
    }
    .with_uni_variant(variant);

    let result = match args.protocol {
        Protocol::Dr => simulate::<DoubleRatchet>(&args, &config),
        Protocol::Brke => simulate::<Brke>(&args, &config),
        Protocol::Bark => simulate::<Bark>(&args, &config),
        Protocol::Hybrid => simulate::<Hybrid>(&args, &config),
        Protocol::Jmm => simulate::<Jmm>(&args, &config),
        Protocol::Sch => simulate::<Sch>(&args, &config),
    };

    match result {
        Ok(report) => {
            tracing::info!(
                protocol = report.protocol,
                sent = report.sent,
                accepted = report.accepted,
                operations = report.operations,
                "all messages delivered"
            );
            Ok(())
        },
        Err(HarnessError::Violations { step, violations }) => {
            for violation in &violations {
                tracing::error!(step, %violation, "invariant violated");
            }
            Err(HarnessError::Violations { step, violations }.into())
        },
        Err(err) => {
            tracing::error!(%err, "simulation failed");
            Err(err.into())
        },
    }
}
