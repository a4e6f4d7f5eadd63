use std::time::Duration;

use clap::Parser;
use savedstate_sample::RunOptions;
use tracing_subscriber::EnvFilter;

/// Counter sample - state that outlives its view model
#[derive(Parser, Debug)]
#[command(name = "savedstate-sample")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// How long the background defaults take to load, in milliseconds
    #[arg(long, default_value_t = 200)]
    delay_ms: u64,

    /// Number of simulated process restarts after the first session
    #[arg(long, default_value_t = 2)]
    restarts: usize,

    /// Count-up presses per session
    #[arg(long, default_value_t = 3)]
    count_ups: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = RunOptions {
        delay: Duration::from_millis(args.delay_ms),
        restarts: args.restarts,
        count_ups: args.count_ups,
    };

    if let Err(e) = savedstate_sample::run(options).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
