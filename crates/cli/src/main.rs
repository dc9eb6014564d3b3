//! chainload CLI
//!
//! Drive workload runs against a test network and watch its event streams.
//!
//! # Example
//!
//! ```bash
//! # Native transfer workload against the nodes of lrt1
//! chainload --network-file lrt1.json wg-100 lrt1 --users 20
//!
//! # Three passes, one minute apart, dispatching to node 2 only
//! chainload --network-file lrt1.json wg-210 lrt1 --node 2 --loop-count 3 --loop-interval 60
//!
//! # Everything in-process, no network needed
//! chainload --simulate wg-200 loc1
//!
//! # Correlate events without running a workload
//! chainload --network-file lrt1.json monitor lrt1
//!
//! # Drop everything cached for lrt1 by earlier invocations
//! chainload --cache-path .chainload/cache.db flush lrt1
//!
//! # Drop one finished run and its event claims
//! chainload flush lrt1 --run-type WG-100 --run 3
//! ```

mod app;
mod config;

use app::{App, Backend, CliError};
use chainload_cache::Cache;
use chainload_generators::{WG_100, WG_200, WG_210};
use chainload_orchestration::EngineConfig;
use chainload_types::factory::{create_execution_context, create_run_id};
use chainload_types::WorkloadArgs;
use clap::{Args, Parser, Subcommand};
use config::NetworkFile;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,chainload=info";

/// Cache file used against real nodes when no `--cache-path` is given.
const DEFAULT_CACHE_PATH: &str = ".chainload/cache.db";

/// chainload
///
/// Generates workloads against a blockchain test network, tracks every
/// deploy it dispatches and verifies the resulting chain state.
#[derive(Parser, Debug)]
#[command(name = "chainload")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON network definition (network name, faucet key, nodes)
    #[arg(long, global = true, env = "CHAINLOAD_NETWORK_FILE")]
    network_file: Option<PathBuf>,

    /// SQLite cache file shared by every invocation against the network
    #[arg(long, global = true, env = "CHAINLOAD_CACHE")]
    cache_path: Option<PathBuf>,

    /// Run against an in-process simulated chain
    #[arg(long, global = true)]
    simulate: bool,

    /// Nodes of the simulated network when no network file is given
    #[arg(long, global = true, default_value = "3")]
    sim_nodes: u32,

    /// Block interval of the simulated chain in milliseconds
    #[arg(long, global = true, default_value = "250")]
    sim_block_interval: u64,

    /// Initial network faucet balance on the simulated chain
    #[arg(long, global = true, default_value = "1000000000000000")]
    sim_faucet_balance: u64,

    /// Node RPC request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    rpc_timeout: u64,

    /// Log filter directives
    #[arg(long, global = true, env = "CHAINLOAD_LOG", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fund users with native transfers, then refund
    #[command(name = "wg-100")]
    Wg100(WorkloadCommand),

    /// Install a counter contract and user stored-transfer contracts
    #[command(name = "wg-200")]
    Wg200(WorkloadCommand),

    /// Delegate from user accounts to a validator
    #[command(name = "wg-210")]
    Wg210(WorkloadCommand),

    /// Correlate node events until interrupted
    Monitor {
        /// Network name, e.g. lrt1
        network: String,
    },

    /// Remove every cached item of a network, or of one run
    Flush {
        /// Network name, e.g. lrt1
        network: String,

        /// Generator of the run to remove, e.g. WG-100
        #[arg(long, requires = "run")]
        run_type: Option<String>,

        /// Index of the run to remove
        #[arg(long, requires = "run_type")]
        run: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct WorkloadCommand {
    /// Network name, e.g. lrt1
    network: String,

    /// Node to dispatch to; 0 picks a random operational node per deploy
    #[arg(long, default_value = "0")]
    node: u32,

    /// Run index
    #[arg(long, default_value = "1")]
    run: u32,

    /// Seconds between passes
    #[arg(long, default_value = "0")]
    loop_interval: u64,

    /// Number of passes; 0 runs once
    #[arg(long, default_value = "0")]
    loop_count: u32,

    /// Worker tasks dispatching deploys
    #[arg(long, default_value = "8")]
    workers: usize,

    /// Fee reserved on every refund
    #[arg(long, default_value = "10")]
    tx_fee: u64,

    /// Print collected Prometheus metrics when the run ends
    #[arg(long)]
    metrics: bool,

    #[command(flatten)]
    workload: WorkloadFlags,
}

#[derive(Args, Debug)]
struct WorkloadFlags {
    /// Number of user accounts
    #[arg(long)]
    users: Option<u32>,

    /// Amount moved from the network faucet into the run faucet
    #[arg(long)]
    faucet_balance: Option<u64>,

    /// Amount moved into the contract account
    #[arg(long)]
    contract_balance: Option<u64>,

    /// Amount moved into each user account
    #[arg(long)]
    user_balance: Option<u64>,

    /// Amount each user delegates
    #[arg(long)]
    delegate_amount: Option<u64>,

    /// Node index of the validator receiving delegations
    #[arg(long)]
    validator: Option<u32>,
}

impl WorkloadFlags {
    fn to_args(&self) -> WorkloadArgs {
        let defaults = WorkloadArgs::default();
        WorkloadArgs {
            user_accounts: self.users.unwrap_or(defaults.user_accounts),
            faucet_initial_balance: self
                .faucet_balance
                .unwrap_or(defaults.faucet_initial_balance),
            contract_initial_balance: self
                .contract_balance
                .unwrap_or(defaults.contract_initial_balance),
            user_initial_balance: self.user_balance.unwrap_or(defaults.user_initial_balance),
            delegate_amount: self.delegate_amount.unwrap_or(defaults.delegate_amount),
            validator_index: self.validator.unwrap_or(defaults.validator_index),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to create tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "chainload failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Wg100(cmd) => run_workload(&cli, WG_100, cmd).await,
        Command::Wg200(cmd) => run_workload(&cli, WG_200, cmd).await,
        Command::Wg210(cmd) => run_workload(&cli, WG_210, cmd).await,
        Command::Monitor { network } => bootstrap(&cli, network)?.monitor().await,
        Command::Flush {
            network,
            run_type: Some(run_type),
            run: Some(index),
        } => {
            let run_id =
                create_run_id(network, run_type, *index).map_err(config::ConfigError::from)?;
            let removed = bootstrap(&cli, network)?.flush_run(&run_id)?;
            println!("{}: {removed}", run_id.label());
            Ok(())
        }
        Command::Flush { network, .. } => {
            let app = bootstrap(&cli, network)?;
            for (partition, removed) in app.flush()? {
                println!("{partition}: {removed}");
            }
            Ok(())
        }
    }
}

async fn run_workload(cli: &Cli, run_type: &str, cmd: &WorkloadCommand) -> Result<(), CliError> {
    let app = bootstrap(cli, &cmd.network)?;
    let run = create_run_id(&cmd.network, run_type, cmd.run).map_err(config::ConfigError::from)?;
    let ctx = create_execution_context(
        run,
        cmd.node,
        cmd.loop_count,
        cmd.loop_interval,
        cmd.workload.to_args(),
    );
    let config = EngineConfig::new()
        .with_workers(cmd.workers)
        .with_tx_fee(cmd.tx_fee);

    info!(
        run = %ctx.run,
        node = ctx.node_index,
        passes = ctx.total_passes(),
        users = ctx.args.user_accounts,
        "Starting run"
    );
    let result = app.run_workload(ctx, config).await;
    if cmd.metrics {
        print!("{}", app.render_metrics()?);
    }
    let outcomes = result?;
    info!(passes = outcomes.len(), "Run finished");
    Ok(())
}

fn bootstrap(cli: &Cli, network: &str) -> Result<App, CliError> {
    let definition = cli
        .network_file
        .as_ref()
        .map(NetworkFile::load)
        .transpose()?;
    let backend = if cli.simulate {
        Backend::Simulated {
            nodes: cli.sim_nodes,
            block_interval: Duration::from_millis(cli.sim_block_interval),
            faucet_balance: cli.sim_faucet_balance,
            deploy_fee: tx_fee(&cli.command),
        }
    } else {
        Backend::Rpc {
            timeout: Duration::from_secs(cli.rpc_timeout),
        }
    };
    App::bootstrap(network, definition, backend, open_cache(cli)?)
}

/// The shared SQLite cache, or a private in-memory one for simulated runs
/// without an explicit path.
fn open_cache(cli: &Cli) -> Result<Cache, CliError> {
    match (&cli.cache_path, cli.simulate) {
        (Some(path), _) => {
            info!(path = %path.display(), "Opening cache");
            Ok(Cache::open(path)?)
        }
        (None, true) => {
            if matches!(cli.command, Command::Flush { .. } | Command::Monitor { .. }) {
                warn!("In-memory cache is private to this process; pass --cache-path to share it");
            }
            Ok(Cache::in_memory())
        }
        (None, false) => Ok(Cache::open(DEFAULT_CACHE_PATH)?),
    }
}

/// Simulated deploys cost exactly the fee refunds reserve.
fn tx_fee(command: &Command) -> u64 {
    match command {
        Command::Wg100(cmd) | Command::Wg200(cmd) | Command::Wg210(cmd) => cmd.tx_fee,
        Command::Monitor { .. } | Command::Flush { .. } => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_workload_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "chainload",
            "--simulate",
            "wg-210",
            "loc1",
            "--node",
            "2",
            "--loop-count",
            "3",
            "--users",
            "7",
            "--validator",
            "2",
        ])
        .unwrap();
        let Command::Wg210(cmd) = &cli.command else {
            panic!("expected wg-210");
        };
        assert!(cli.simulate);
        assert_eq!(cmd.node, 2);
        assert_eq!(cmd.loop_count, 3);

        let args = cmd.workload.to_args();
        let defaults = WorkloadArgs::default();
        assert_eq!(args.user_accounts, 7);
        assert_eq!(args.validator_index, 2);
        assert_eq!(args.user_initial_balance, defaults.user_initial_balance);
    }

    #[test]
    fn test_flush_and_monitor_take_a_network() {
        let cli = Cli::try_parse_from(["chainload", "flush", "lrt1"]).unwrap();
        assert!(matches!(cli.command, Command::Flush { ref network, run: None, .. } if network == "lrt1"));
        assert_eq!(tx_fee(&cli.command), 0);

        let one_run = Cli::try_parse_from([
            "chainload", "flush", "lrt1", "--run-type", "WG-200", "--run", "4",
        ])
        .unwrap();
        assert!(matches!(
            one_run.command,
            Command::Flush { run_type: Some(ref t), run: Some(4), .. } if t == "WG-200"
        ));
        assert!(Cli::try_parse_from(["chainload", "flush", "lrt1", "--run", "4"]).is_err());

        assert!(Cli::try_parse_from(["chainload", "monitor"]).is_err());
    }

    #[test]
    fn test_invocations_sharing_a_cache_path_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let path = path.to_str().unwrap();

        let first = Cli::try_parse_from(["chainload", "--cache-path", path, "flush", "loc1"]).unwrap();
        let cache = open_cache(&first).unwrap();
        let def = NetworkFile::simulated("loc1", 2, &mut rand::thread_rng());
        def.register(&cache).unwrap();
        drop(cache);

        // A later flush from another invocation removes what the first registered.
        let second = Cli::try_parse_from(["chainload", "--cache-path", path, "flush", "loc1"]).unwrap();
        let cache = open_cache(&second).unwrap();
        assert_eq!(cache.get_nodes("loc1").unwrap().len(), 2);
        let removed: usize = cache.flush_by_network("loc1").unwrap().iter().map(|(_, n)| n).sum();
        assert_eq!(removed, 3);
        assert!(open_cache(&second).unwrap().get_nodes("loc1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_wg_100_completes() {
        let cli = Cli::try_parse_from([
            "chainload",
            "--simulate",
            "--sim-block-interval",
            "20",
            "wg-100",
            "loc1",
            "--users",
            "2",
            "--faucet-balance",
            "100000",
            "--user-balance",
            "1000",
        ])
        .unwrap();
        let Command::Wg100(cmd) = &cli.command else {
            panic!("expected wg-100");
        };
        let app = bootstrap(&cli, "loc1").unwrap();
        let run = create_run_id("loc1", WG_100, 1).unwrap();
        let ctx = create_execution_context(run, 0, 0, 0, cmd.workload.to_args());

        let outcomes = tokio::time::timeout(
            Duration::from_secs(20),
            app.run_workload(ctx, EngineConfig::new().with_workers(2)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, chainload_types::RunStatus::Complete);
        assert!(app.render_metrics().unwrap().contains("chainload_deploys_dispatched_total"));
    }
}
