// `pbwrap` -- Run pbench data collection around a benchmark
//
// Run with --help for brief help.
//
// The host/tool mapping is a json file naming, for each host, the pbench tools to register there:
//
//   { "localhost": ["sar", "iostat"], "worker1.example.com": ["mpstat"] }
//
// With --create-local the tool meister and tool data sink are created on this host and every host in
// the mapping must be this host or "localhost".  Otherwise an existing tool meister is used, and its
// redis server must be given with --coordinator-host and --coordinator-port.
//
// Quirks
//
// The session directory is named by the time the session starts, to the second.  Two sessions
// started within the same second with the same --script and --config will collide, and the second
// one will fail.

mod format;
mod samples;

use anyhow::{bail, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{debug, info};
use pbsession::{
    CoordinatorEndpoint, HostToolMap, Layout, ProcessRunner, Session, SessionConfig,
    SessionContext,
};
use std::env;
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print debug output to stderr
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register the tools and collect iterations x samples of data
    Run(RunArgs),

    /// Register the tools and collect samples into a single collected-samples directory
    Collect(RunArgs),

    /// Move the results of finished sessions to the pbench web server
    Upload(UploadArgs),

    /// Clear all registered tools
    Clear,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    session_args: SessionArgs,

    #[command(flatten)]
    print_args: PrintArgs,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Json file containing the host/tool mapping for data collection
    #[arg(long, short = 'T')]
    tool_dict: PathBuf,

    /// Number of benchmark iterations
    #[arg(long, short, default_value_t = 1)]
    iterations: usize,

    /// Number of benchmark samples (per iteration)
    #[arg(long, short, default_value_t = 1)]
    samples: usize,

    /// Length in seconds of collection for each sample
    #[arg(long, short = 'l', default_value_t = pbsession::DEFAULT_SAMPLE_LENGTH)]
    sample_length: u64,

    /// Create the tool meister and tool data sink locally [-C alone means true]
    #[arg(
        long,
        short = 'C',
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    create_local: bool,

    /// Host of the redis server of an existing tool meister
    #[arg(long, short = 'R')]
    coordinator_host: Option<String>,

    /// Port of the redis server of an existing tool meister
    #[arg(long)]
    coordinator_port: Option<u16>,

    /// Host of the tool data sink [default: the coordinator host]
    #[arg(long, short = 'D')]
    tool_data_sink: Option<String>,

    /// Upload the results to this pbench web server when the session is done
    #[arg(long, short = 'W')]
    web_server: Option<String>,

    /// Root of the pbench run directories [default: $pbench_run, else /var/lib/pbench-agent]
    #[arg(long)]
    pbench_run: Option<PathBuf>,

    /// The pbench agent installation [default: $pbench_install_dir, else /opt/pbench-agent]
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Script name used in the session directory name
    #[arg(long, default_value = pbsession::DEFAULT_SCRIPT)]
    script: String,

    /// Configuration name used in the session directory name
    #[arg(long, default_value = pbsession::DEFAULT_CONFIG)]
    config: String,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields for the output: iter,sample,dir,start,stop,duration
    #[arg(long)]
    fmt: Option<String>,

    /// Print CSV instead of fixed-width columns
    #[arg(long, default_value_t = false)]
    csv: bool,

    /// Do not print a header line
    #[arg(long, default_value_t = false)]
    no_header: bool,

    /// Print the samples as json
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// The pbench web server to receive the results
    #[arg(long, short = 'W')]
    web_server: Option<String>,
}

fn main() {
    match pbwrap() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn pbwrap() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("PBWRAP_LOG", default_level))
        .init();
    debug!("{:?}", cli);

    match cli.command {
        Commands::Run(ref run_args) => run(run_args, Layout::Iterations),
        Commands::Collect(ref run_args) => run(run_args, Layout::Collected),
        Commands::Upload(ref upload_args) => {
            let server = upload_args
                .web_server
                .clone()
                .or_else(|| env::var("pbench_web_server").ok());
            pbsession::upload_results(&mut ProcessRunner, server.as_deref())?;
            Ok(())
        }
        Commands::Clear => {
            pbsession::clear_tools(&mut ProcessRunner)?;
            Ok(())
        }
    }
}

fn run(run_args: &RunArgs, layout: Layout) -> Result<()> {
    let args = &run_args.session_args;

    // The mapping must exist before anything is registered.

    if !args.tool_dict.is_file() {
        bail!(
            "Tool mapping file '{}' not found or unreadable",
            args.tool_dict.display()
        );
    }
    let tools: HostToolMap = pbsession::read_from_json(&args.tool_dict)?;

    let config = session_config(args, layout)?;
    let context = session_context(args);
    info!(
        "Running {} iteration(s) of {} sample(s) on {}",
        config.iterations, config.samples_per_iteration, context.hostname
    );

    let mut session = Session::new(config, context, tools, ProcessRunner);
    let results = session.run()?;
    samples::print_samples(&mut io::stdout(), &run_args.print_args, &results)?;
    if session.config().web_server.is_some() {
        session.upload()?;
    }
    Ok(())
}

fn session_config(args: &SessionArgs, layout: Layout) -> Result<SessionConfig> {
    let coordinator = match (&args.coordinator_host, args.coordinator_port) {
        (Some(host), Some(port)) => Some(CoordinatorEndpoint {
            host: host.clone(),
            port,
        }),
        (None, None) => None,
        _ => bail!("--coordinator-host and --coordinator-port must be given together"),
    };
    let config = SessionConfig {
        iterations: args.iterations,
        samples_per_iteration: args.samples,
        sample_length_seconds: args.sample_length,
        local_mode: args.create_local,
        coordinator,
        tool_data_sink: args.tool_data_sink.clone(),
        web_server: args.web_server.clone(),
        layout,
    };
    config.validate()?;
    Ok(config)
}

// Directories fall back on the pbench agent's own environment variables, then on its defaults.

fn session_context(args: &SessionArgs) -> SessionContext {
    let pbench_run = if let Some(ref p) = args.pbench_run {
        p.clone()
    } else if let Ok(val) = env::var("pbench_run") {
        PathBuf::from(val)
    } else {
        PathBuf::from(pbsession::DEFAULT_PBENCH_RUN)
    };
    let install_dir = if let Some(ref p) = args.install_dir {
        p.clone()
    } else if let Ok(val) = env::var("pbench_install_dir") {
        PathBuf::from(val)
    } else {
        PathBuf::from(pbsession::DEFAULT_INSTALL_DIR)
    };
    let mut ctx = SessionContext::new(pbench_run, &pbsession::local_hostname());
    ctx.install_dir = install_dir;
    ctx.script = args.script.clone();
    ctx.config = args.config.clone();
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn session_args(cli: &Cli) -> &SessionArgs {
        match cli.command {
            Commands::Run(ref a) | Commands::Collect(ref a) => &a.session_args,
            _ => panic!("not a session command"),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["pbwrap", "run", "-T", "tools.json", "--create-local"]);
        let args = session_args(&cli);
        let c = session_config(args, Layout::Iterations).unwrap();
        assert_eq!(c.iterations, 1);
        assert_eq!(c.samples_per_iteration, 1);
        assert_eq!(c.sample_length_seconds, 20);
        assert!(c.local_mode);
        assert!(c.coordinator.is_none());
        assert_eq!(args.script, "pbench");
        assert_eq!(args.config, "wrapper-run");
    }

    #[test]
    fn test_create_local_value() {
        let cli = parse(&["pbwrap", "run", "-T", "t.json", "-C", "-i", "2"]);
        assert!(session_args(&cli).create_local);
        assert_eq!(session_args(&cli).iterations, 2);

        let cli = parse(&["pbwrap", "run", "-T", "t.json", "-C", "false"]);
        assert!(!session_args(&cli).create_local);

        let cli = parse(&["pbwrap", "run", "-T", "t.json", "--create-local", "yes"]);
        assert!(session_args(&cli).create_local);

        let cli = parse(&["pbwrap", "run", "-T", "t.json"]);
        assert!(!session_args(&cli).create_local);

        assert!(Cli::try_parse_from(["pbwrap", "run", "-T", "t.json", "-C", "maybe"]).is_err());
    }

    #[test]
    fn test_coordinator_required() {
        let cli = parse(&["pbwrap", "run", "-T", "tools.json"]);
        assert!(session_config(session_args(&cli), Layout::Iterations).is_err());

        let cli = parse(&["pbwrap", "run", "-T", "t.json", "--coordinator-host", "redis1"]);
        assert!(session_config(session_args(&cli), Layout::Iterations).is_err());

        let cli = parse(&[
            "pbwrap",
            "collect",
            "-T",
            "t.json",
            "--coordinator-host",
            "redis1",
            "--coordinator-port",
            "17001",
            "-s",
            "3",
        ]);
        let c = session_config(session_args(&cli), Layout::Collected).unwrap();
        assert_eq!(c.coordinator.unwrap().to_string(), "redis1:17001");
        assert_eq!(c.samples_per_iteration, 3);
        assert_eq!(c.layout, Layout::Collected);
    }

    #[test]
    fn test_zero_iterations() {
        let cli = parse(&["pbwrap", "run", "-T", "t.json", "-C", "-i", "0"]);
        assert!(session_config(session_args(&cli), Layout::Iterations).is_err());
    }

    #[test]
    fn test_context_from_args() {
        let cli = parse(&[
            "pbwrap",
            "run",
            "-T",
            "t.json",
            "-C",
            "--pbench-run",
            "/tmp/pbrun",
            "--script",
            "fio",
        ]);
        let ctx = session_context(session_args(&cli));
        assert_eq!(ctx.pbench_run, PathBuf::from("/tmp/pbrun"));
        assert!(ctx
            .benchmark_run_dir()
            .to_string_lossy()
            .starts_with("/tmp/pbrun/fio_wrapper-run_"));
    }
}
