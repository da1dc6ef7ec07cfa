use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use time_keeper_e2e::config::{DEFAULT_PORT, DEFAULT_SERVER_COMMAND};
use time_keeper_e2e::suite::scenarios;
use time_keeper_e2e::{
    start_server, BrowserOptions, RunOptions, ServerConfig, Suite, SuiteConfig, SuiteReport,
};

/// Run the Time Keeper end-to-end scenarios against a freshly started dev server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First port to probe for the development server
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port_start: u16,

    /// Shell command that starts the application
    #[arg(long, default_value = DEFAULT_SERVER_COMMAND)]
    server_command: String,

    /// Working directory for the server command
    #[arg(long, default_value = ".")]
    cwd: PathBuf,

    /// Seconds to wait for the application to serve its root page
    #[arg(long, default_value_t = 30)]
    ready_timeout: u64,

    /// Use an application that is already running on TEST_SERVER_PORT
    #[arg(long)]
    no_server: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Launch Chrome with --no-sandbox
    #[arg(long)]
    no_sandbox: bool,

    /// Chrome executable to use instead of the downloaded one
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// Attach to a Chrome already running with --remote-debugging-port
    #[arg(long)]
    debug_port: Option<u16>,

    /// Only run scenarios whose name contains this text
    #[arg(short, long)]
    filter: Option<String>,

    /// Skip scenarios that encode known, unfixed defects
    #[arg(long)]
    skip_known_defects: bool,

    /// Write a JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            chrome_path: self.chrome_path.clone(),
            headless: !self.headed,
            no_sandbox: self.no_sandbox,
            debug_port: self.debug_port,
        }
        .detect_ci()
    }

    fn server_config(&self, browser: BrowserOptions) -> ServerConfig {
        ServerConfig {
            port_start: self.port_start,
            command: self.server_command.clone(),
            cwd: self.cwd.clone(),
            ready_timeout: Duration::from_secs(self.ready_timeout),
            // Readiness probing always gets its own headless browser
            browser: BrowserOptions {
                headless: true,
                debug_port: None,
                ..browser
            },
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            filter: self.filter.clone(),
            skip_known_defects: self.skip_known_defects,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // Dropping the run future on interrupt drops the server handle, which stops the server
    let outcome = tokio::select! {
        outcome = run(&args) => outcome,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("Interrupted")),
    };

    match outcome {
        Ok(report) => {
            println!("\n{}", report.summary());
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<SuiteReport> {
    let browser = args.browser_options();

    let server = if args.no_server {
        None
    } else {
        let server = start_server(&args.server_config(browser.clone()))
            .await
            .map_err(|e| {
                let phase = e.phase();
                anyhow::Error::new(e).context(format!("Setup failed during {}", phase))
            })?;
        Some(server)
    };

    let config = match &server {
        Some(server) => SuiteConfig::new(server.url(), browser),
        None => SuiteConfig::from_env(browser),
    };
    log::info!("Running scenarios against {}", config.base_url);

    let suite = Suite::open(&config)
        .await
        .context("Failed to launch the scenario browser")?;
    let report = suite.run(&scenarios::all(), &args.run_options()).await;
    if let Err(e) = suite.close().await {
        log::warn!("Failed to close the scenario browser: {}", e);
    }

    if let Some(path) = &args.report {
        report
            .to_file(path)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }

    if let Some(server) = server {
        tokio::task::spawn_blocking(move || server.terminate())
            .await
            .context("Teardown task panicked")?
            .context("Teardown failed")?;
    }

    Ok(report)
}
