use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use listwarden::workflow::{Request, Workflow};
use listwarden::{ActionLog, Config, ListDirectory, Reporter, RunOptions};

#[derive(Parser, Debug)]
#[command(
    name = "listwarden",
    about = "Administer mailing list rosters through their web admin interface",
    disable_version_flag = true
)]
struct Args {
    /// Subscribe addresses, or the addresses in FILE (first column).
    #[arg(short, long, value_delimiter = ',', value_name = "ADDRESSES|FILE")]
    add: Vec<String>,

    /// Unsubscribe addresses, or the addresses in FILE (first column).
    #[arg(short = 'D', long, value_delimiter = ',', value_name = "ADDRESSES|FILE")]
    delete: Vec<String>,

    /// Select lists by alias.
    #[arg(short, long, value_delimiter = ',', value_name = "ALIASES")]
    list: Vec<String>,

    /// Configuration file.
    #[arg(short = 'F', long, default_value = "listwarden.toml")]
    configuration: PathBuf,

    /// Output more information.
    #[arg(short, long)]
    debug: bool,

    /// Log in and read, but change nothing.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Do not verify changes against a fresh roster.
    #[arg(short = 'v', long)]
    no_verify: bool,

    /// Verbose output for debugging.
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Message to be logged with the changes.
    #[arg(short, long)]
    message: Option<String>,

    /// Unsubscribe every external subscriber of the selected lists.
    #[arg(long)]
    delete_external: bool,

    /// Edit the goodbye message of the selected lists.
    #[arg(long)]
    edit_goodbye_msg: bool,

    /// Edit the welcome message of the selected lists.
    #[arg(long)]
    edit_welcome_msg: bool,

    /// Print the goodbye message of the selected lists.
    #[arg(long)]
    get_goodbye_msg: bool,

    /// Print the welcome message of the selected lists.
    #[arg(long)]
    get_welcome_msg: bool,

    /// Show every subscriber.
    #[arg(short, long)]
    show: bool,

    /// Print statistics.
    #[arg(short = 'x', long)]
    stats: bool,

    /// Print sender statistics from the list archives.
    #[arg(short = 'X', long)]
    xstats: bool,

    /// Print reports as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            verbose: self.verbose,
            no_verify: self.no_verify,
            message: self.message.clone().filter(|m| !m.is_empty()),
        }
    }

    fn request(&self) -> Request {
        Request {
            lists: self.list.clone(),
            add: self.add.clone(),
            delete: self.delete.clone(),
            delete_external: self.delete_external,
            edit_goodbye: self.edit_goodbye_msg,
            edit_welcome: self.edit_welcome_msg,
            get_goodbye: self.get_goodbye_msg,
            get_welcome: self.get_welcome_msg,
            stats: self.stats,
            show: self.show,
            xstats: self.xstats,
            json: self.json,
        }
    }

    fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if self.verbose {
                EnvFilter::new("listwarden=debug,info")
            } else if self.debug {
                EnvFilter::new("listwarden=info,warn")
            } else {
                EnvFilter::new("warn")
            }
        })
    }
}

async fn run(args: &Args) -> listwarden::Result<()> {
    let config = Config::from_file(&args.configuration)?;

    let log = ActionLog::open(&config.log_file)?;
    let invocation: Vec<String> = std::env::args().collect();
    log.note(&format!("Program started: {}", invocation.join(" ")));
    tracing::info!(configuration = %args.configuration.display(), "Using configuration");

    let directory = ListDirectory::from_config(&config, args.options())?;
    let mut workflow = Workflow::new(directory, Reporter::stdout(log))
        .with_concurrency(config.max_concurrent_lists);
    workflow.run(&args.request()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Console diagnostics go to stderr so reports on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(args.log_filter())
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
