/// Query to run against the price file.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// First and last timestamps of the series.
    MinMax,
    /// Whole-series stats, computed by the background warm-up.
    Stats,
    /// Best single trade for `funds` over a range.
    Profit { start: String, end: String, funds: f64 },
    /// Downsampled chart series over a range.
    Chart { start: String, end: String, buckets: usize },
    /// Build the sparse index and write it to the index file.
    Index,
}

/// Structure representing command-line arguments.
#[derive(Debug)]
pub struct Args {
    pub data: std::path::PathBuf,
    pub threads: Option<usize>,
    pub index_file: Option<std::path::PathBuf>,
    pub index_stride: Option<usize>,
    pub max_span_days: Option<i64>,
    pub max_funds: Option<f64>,
    pub command: Command,
}

fn range_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        clap::Arg::new("start")
            .short('s')
            .long("start")
            .help("Range start, ISO-8601 (e.g. 2025-01-01T09:00:00Z)")
            .required(true)
            .num_args(1),
    )
    .arg(
        clap::Arg::new("end")
            .short('e')
            .long("end")
            .help("Range end, ISO-8601")
            .required(true)
            .num_args(1),
    )
}

/// Builds the clap command tree.
fn command() -> clap::Command {
    clap::Command::new("price-scan")
        .version("0.2.0")
        .about("Best-trade and chart queries over an append-only price file")
        .subcommand_required(true)
        .arg(
            clap::Arg::new("data")
                .short('d')
                .long("data")
                .help("Path to the NDJSON or JSON-array price file (default: $DATA_PATH)")
                .global(true)
                .num_args(1),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("Number of threads for background work (default: all available)")
                .global(true)
                .num_args(1)
                .value_parser(clap::builder::ValueParser::new(parse_usize_positive)),
        )
        .arg(
            clap::Arg::new("index-file")
                .long("index-file")
                .help("Companion .idx file to load the sparse index from and save it to")
                .global(true)
                .num_args(1),
        )
        .arg(
            clap::Arg::new("index-stride")
                .long("index-stride")
                .help("Records between sparse index entries")
                .global(true)
                .num_args(1)
                .value_parser(clap::builder::ValueParser::new(parse_usize_positive)),
        )
        .arg(
            clap::Arg::new("max-span-days")
                .long("max-span-days")
                .help("Longest range a query may span, in days")
                .global(true)
                .num_args(1)
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            clap::Arg::new("max-funds")
                .long("max-funds")
                .help("Largest amount a profit query may invest")
                .global(true)
                .num_args(1)
                .value_parser(clap::builder::ValueParser::new(parse_f64_positive)),
        )
        .subcommand(clap::Command::new("minmax").about("Print the first and last timestamps"))
        .subcommand(clap::Command::new("stats").about("Compute and print whole-series stats"))
        .subcommand(
            range_args(clap::Command::new("profit").about("Find the best buy-then-sell trade")).arg(
                clap::Arg::new("funds")
                    .short('f')
                    .long("funds")
                    .help("Amount to invest")
                    .required(true)
                    .num_args(1)
                    .value_parser(clap::builder::ValueParser::new(parse_f64_positive)),
            ),
        )
        .subcommand(
            range_args(clap::Command::new("chart").about("Print a downsampled chart series")).arg(
                clap::Arg::new("buckets")
                    .short('b')
                    .long("buckets")
                    .help("Maximum number of chart points")
                    .default_value("1000")
                    .num_args(1)
                    .value_parser(clap::builder::ValueParser::new(parse_usize_positive)),
            ),
        )
        .subcommand(clap::Command::new("index").about("Build the sparse index and save it to --index-file"))
}

impl Args {
    /// Parses command-line arguments using `clap`.
    ///
    /// Falls back to `$DATA_PATH` when `--data` is absent.
    ///
    /// # Returns
    /// * `anyhow::Result<Args>`
    pub fn parse() -> anyhow::Result<Self> {
        Self::parse_from(std::env::args_os())
    }

    /// Parses an explicit argument list, as `parse` does for the process arguments.
    pub fn parse_from<I, T>(itr: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::from_matches(&command().try_get_matches_from(itr)?)
    }

    fn from_matches(matches: &clap::ArgMatches) -> anyhow::Result<Self> {
        let data = matches
            .get_one::<String>("data")
            .cloned()
            .or_else(|| std::env::var("DATA_PATH").ok())
            .ok_or_else(|| anyhow::anyhow!("No data file given: use --data or set DATA_PATH"))?;

        let command = match matches.subcommand() {
            Some(("minmax", _)) => Command::MinMax,
            Some(("stats", _)) => Command::Stats,
            Some(("profit", sub)) => Command::Profit {
                start: required(sub, "start")?,
                end: required(sub, "end")?,
                funds: sub
                    .get_one::<f64>("funds")
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("Missing --funds"))?,
            },
            Some(("chart", sub)) => Command::Chart {
                start: required(sub, "start")?,
                end: required(sub, "end")?,
                buckets: sub.get_one::<usize>("buckets").copied().unwrap_or(1000),
            },
            Some(("index", _)) => Command::Index,
            _ => return Err(anyhow::anyhow!("Unknown command")),
        };

        Ok(Args {
            data: std::path::PathBuf::from(data),
            threads: matches.get_one::<usize>("threads").cloned(),
            index_file: matches.get_one::<String>("index-file").map(std::path::PathBuf::from),
            index_stride: matches.get_one::<usize>("index-stride").cloned(),
            max_span_days: matches.get_one::<i64>("max-span-days").cloned(),
            max_funds: matches.get_one::<f64>("max-funds").cloned(),
            command,
        })
    }
}

fn required(matches: &clap::ArgMatches, name: &str) -> anyhow::Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing --{}", name))
}

/// Validates that a count is a positive integer.
///
/// # Arguments
/// * `s` - String representation of the count.
///
/// # Returns
/// * `Result<usize>` - Validated count.
fn parse_usize_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("Must be a positive integer".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("Not a valid number: {}", e)),
    }
}

/// Validates that an amount is a positive, finite number.
fn parse_f64_positive(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(_) => Err("Must be a positive number".to_string()),
        Err(e) => Err(format!("Not a valid number: {}", e)),
    }
}
