mod cli;

use price_scan::config;
use price_scan::engine;
use price_scan::point;
use price_scan::utils;

/// Main entry point of the application.
///
/// This function orchestrates the workflow:
/// 1. Parses command-line arguments.
/// 2. Builds the engine configuration from the environment and flags.
/// 3. Opens the price file.
/// 4. Runs the requested query, on a bounded thread pool if `--threads` is given.
///
/// # Returns
///
/// * `anyhow::Result<()>` - Success or an error if any step fails.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse()?;

    let mut config = config::EngineConfig::from_env();
    if let Some(path) = &args.index_file {
        config.index_path = Some(path.clone());
    }
    if let Some(stride) = args.index_stride {
        config.index_stride = stride;
    }
    if let Some(days) = args.max_span_days {
        config.max_span_days = days;
    }
    if let Some(funds) = args.max_funds {
        config.max_funds = funds;
    }

    let engine = engine::PriceEngine::open(&args.data, config)?;

    if let Some(n) = args.threads {
        eprintln!("🚀 Using {} thread(s)", n);
        let local_pool = utils::configure_thread_pool(n)?;
        local_pool.install(|| run(&engine, &args.command))
    } else {
        run(&engine, &args.command)
    }
}

/// Runs one query and prints its result as JSON on stdout.
fn run(engine: &engine::PriceEngine, command: &cli::Command) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    match command {
        cli::Command::MinMax => {
            print_json(&engine.get_min_max()?)?;
        }
        cli::Command::Stats => {
            let ready = engine.warm_up().recv().unwrap_or(false);
            if !ready {
                return Err(anyhow::anyhow!("Stats warm-up failed, see log for details"));
            }
            print_json(&engine.get_stats()?)?;
        }
        cli::Command::Profit { start: s, end: e, funds } => {
            let (s, e) = (point::parse_timestamp(s)?, point::parse_timestamp(e)?);
            let report = engine.compute_profit(s, e, *funds)?;
            eprintln!(
                "📈 Buy {} @ {:.2}, sell {} @ {:.2}",
                utils::format_timestamp(&report.buy_time),
                report.buy_price,
                utils::format_timestamp(&report.sell_time),
                report.sell_price,
            );
            print_json(&report)?;
        }
        cli::Command::Chart { start: s, end: e, buckets } => {
            let (s, e) = (point::parse_timestamp(s)?, point::parse_timestamp(e)?);
            print_json(&engine.get_chart_data(s, e, *buckets)?)?;
        }
        cli::Command::Index => {
            if engine.config().index_path.is_none() {
                return Err(anyhow::anyhow!("The index command needs --index-file or INDEX_PATH"));
            }
            let index = engine.index()?;
            eprintln!("📄 Indexed {} entries every {} records", index.len(), index.stride);
        }
    }

    eprintln!(
        "✅ Completed in {:?} seconds",
        start.elapsed().as_secs_f64()
    );
    anyhow::Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    anyhow::Ok(())
}
