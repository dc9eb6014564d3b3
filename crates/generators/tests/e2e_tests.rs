//! End-to-end runs: engine, workers, simulated chain and monitoring together.

use chainload_cache::Cache;
use chainload_client::{SimulatedChain, SimulationConfig};
use chainload_generators::{
    registry, AccountSet, Fund, Refund, ACC_RUN_CONTRACT, ACC_RUN_FAUCET, ACC_RUN_USERS, WG_100,
    WG_200, WG_210,
};
use chainload_monitoring::{EventCorrelator, ListenerConfig, Monitor, MonitorContext};
use chainload_orchestration::{
    EngineConfig, EngineHandle, Generator, GeneratorRegistry, OrchestrationContext, Phase,
    RunOutcome, StartOutcome, Step, VerificationError, WorkflowEngine,
};
use chainload_types::factory::{
    create_execution_context, create_network, create_network_faucet, create_node, create_run_id,
    create_run_lock,
};
use chainload_types::{
    Account, ContractType, DeployStatus, ExecutionContext, KeyPair, NodeStatus, NodeType,
    RunStatus, RunStepStatus, WorkloadArgs,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const NETWORK: &str = "loc1";
const NODES: u32 = 3;

struct Harness {
    chain: Arc<SimulatedChain>,
    cache: Cache,
    engine: EngineHandle,
    outcomes: broadcast::Receiver<RunOutcome>,
    monitor: Monitor,
    faucet: Account,
}

impl Harness {
    async fn start(registry: GeneratorRegistry, faucet_balance: u64) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let chain = SimulatedChain::new(
            SimulationConfig::default()
                .with_network(NETWORK)
                .with_block_interval(Duration::from_millis(20)),
        );
        let cache = Cache::in_memory();

        let key_pair = KeyPair::generate(&mut ChaCha8Rng::seed_from_u64(7));
        let faucet = create_network_faucet(NETWORK, key_pair).unwrap();
        chain.credit(&faucet.account_id, faucet_balance);
        cache
            .set_network(&create_network(NETWORK, Some(faucet.clone())).unwrap())
            .unwrap();
        for index in 1..=NODES {
            let node = create_node(
                NETWORK,
                index,
                "sim",
                0,
                0,
                NodeStatus::Healthy,
                NodeType::Full,
                100,
            )
            .unwrap();
            cache.set_node(&node).unwrap();
        }

        let context = OrchestrationContext::new(
            cache.clone(),
            chain.clone(),
            EngineConfig::default().with_workers(4),
        );
        let (engine, _task) = WorkflowEngine::spawn(context, registry);
        let outcomes = engine.subscribe();

        let correlator = Arc::new(EventCorrelator::with_default_handlers(
            MonitorContext::new(cache.clone(), chain.clone()).with_engine(engine.clone()),
        ));
        let monitor = Monitor::spawn(correlator, NETWORK, ListenerConfig::default()).unwrap();
        for index in 1..=NODES {
            while !cache.is_node_monitored(NETWORK, index).unwrap() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        // Streams subscribe right after the lock is taken.
        tokio::time::sleep(Duration::from_millis(50)).await;
        chain.spawn();

        Self {
            chain,
            cache,
            engine,
            outcomes,
            monitor,
            faucet,
        }
    }

    async fn run(&mut self, ctx: ExecutionContext) -> RunOutcome {
        assert_eq!(
            self.engine.start_run(ctx).await.unwrap(),
            StartOutcome::Started
        );
        self.next_outcome().await
    }

    async fn next_outcome(&mut self) -> RunOutcome {
        tokio::time::timeout(Duration::from_secs(20), self.outcomes.recv())
            .await
            .expect("run did not finish")
            .expect("outcome channel closed")
    }

    fn balance(&self, run_ctx: &ExecutionContext, index: u32) -> u64 {
        self.cache.get_account(&run_ctx.run, index).unwrap().balance
    }

    async fn stop(self) {
        self.engine.shutdown();
        self.monitor.shutdown().await;
    }
}

fn context(run_type: &str, run_index: u32, args: WorkloadArgs) -> ExecutionContext {
    let run = create_run_id(NETWORK, run_type, run_index).unwrap();
    create_execution_context(run, 0, 0, 0, args)
}

fn small_args(users: u32) -> WorkloadArgs {
    WorkloadArgs {
        user_accounts: users,
        faucet_initial_balance: 1_000_000,
        contract_initial_balance: 50_000,
        user_initial_balance: 10_000,
        delegate_amount: 2_500,
        validator_index: 1,
    }
}

#[tokio::test]
#[serial]
async fn test_fund_then_refund_balances() {
    let generator = Generator::new("WG-T", "fund then refund")
        .with_phase(
            Phase::new("phase-01")
                .with_step(chainload_generators::CreateAccounts)
                .with_step(Fund::run_faucet())
                .with_step(Fund::users()),
        )
        .with_phase(Phase::new("phase-02").with_step(Refund::users()));
    let mut h = Harness::start(GeneratorRegistry::new().with(generator), 10_000).await;

    let args = WorkloadArgs {
        user_accounts: 1,
        faucet_initial_balance: 1_000,
        user_initial_balance: 100,
        ..small_args(1)
    };
    let ctx = context("WG-T", 1, args);
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.reason);

    // Refund moves balance(A) - fee back: 100 - 10 = 90.
    assert_eq!(h.balance(&ctx, ACC_RUN_USERS), 10);
    assert_eq!(h.balance(&ctx, ACC_RUN_FAUCET), 990);

    let user = h.cache.get_account(&ctx.run, ACC_RUN_USERS).unwrap();
    assert_eq!(h.chain.balance(&user.account_id), 10);
    let transfers = h.cache.get_transfers(&ctx.run).unwrap();
    assert_eq!(transfers.len(), 3);
    assert!(transfers.iter().any(|t| t.cp1_index == ACC_RUN_USERS && t.amount == 90));
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_refund_verification_rejects_unreturned_balance() {
    let generator = Generator::new("WG-T", "fund only").with_phase(
        Phase::new("phase-01")
            .with_step(chainload_generators::CreateAccounts)
            .with_step(Fund::run_faucet())
            .with_step(Fund::users()),
    );
    let mut h = Harness::start(GeneratorRegistry::new().with(generator), 10_000_000).await;
    let ctx = context("WG-T", 1, small_args(1));
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.reason);

    // The user still holds its funding, so a refund step claiming success is wrong.
    let context =
        OrchestrationContext::new(h.cache.clone(), h.chain.clone(), EngineConfig::default());
    let err = Refund::users()
        .verify(&ctx, &context, "phase-02.refund-users")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerificationError::Unreturned { balance: 10_000, allowed: 10, .. }
    ));
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_wg_100_completes() {
    let mut h = Harness::start(registry(), 100_000_000).await;
    let ctx = context(WG_100, 1, small_args(4));
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.reason);

    let steps = h.cache.get_run_steps(&ctx.run, 1).unwrap();
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.status == RunStepStatus::Complete));

    let deploys = h.cache.get_deploys_by_run(&ctx.run).unwrap();
    // One faucet funding, four user fundings, four user refunds, one faucet refund.
    assert_eq!(deploys.len(), 10);
    assert!(deploys.iter().all(|d| d.status == DeployStatus::Finalized));
    assert!(deploys.iter().all(|d| d.finalization_duration_ms.is_some()));

    // Everything but the fee dust made it back to the network faucet.
    let run_faucet = h.cache.get_account(&ctx.run, ACC_RUN_FAUCET).unwrap();
    assert_eq!(h.chain.balance(&run_faucet.account_id), 10);
    assert_eq!(h.chain.balance(&h.faucet.account_id), 100_000_000 - 5 * 10);
    assert!(!h.cache.is_run_locked(&ctx.run).unwrap());
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_wg_200_installs_contracts() {
    let mut h = Harness::start(registry(), 100_000_000).await;
    let ctx = context(WG_200, 1, small_args(2));
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.reason);

    let counter = h
        .cache
        .get_named_key(NETWORK, ACC_RUN_CONTRACT, ContractType::CounterDefine, "counter_define")
        .unwrap();
    assert_eq!(counter.contract_type, ContractType::CounterDefine);
    let deploys = h.cache.get_deploys_by_run(&ctx.run).unwrap();
    for index in AccountSet::Users.indices(&ctx.args) {
        let named_keys = h.cache.get_named_keys(NETWORK, index).unwrap();
        assert_eq!(named_keys.len(), 1);

        // Users refund through the stored-transfer contract they installed.
        let refund = deploys
            .iter()
            .find(|d| d.step_label == "phase-03.refund-users" && d.account_index == index)
            .unwrap();
        assert_eq!(refund.status, DeployStatus::Finalized);
        assert_eq!(refund.contract_hash.as_deref(), Some(named_keys[0].hash.as_str()));
        let user = h.cache.get_account(&ctx.run, index).unwrap();
        assert!(h.chain.balance(&user.account_id) <= 10);
    }
    assert!(deploys
        .iter()
        .filter(|d| d.step_label != "phase-03.refund-users")
        .all(|d| d.contract_hash.is_none()));
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_wg_210_delegates() {
    let mut h = Harness::start(registry(), 100_000_000).await;
    let args = small_args(3);
    let ctx = context(WG_210, 1, args.clone());
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.reason);

    let step = h.cache.get_run_step(&ctx.run, 1, "phase-02.delegate").unwrap();
    assert_eq!(step.status, RunStepStatus::Complete);
    let delegations = h
        .cache
        .get_deploys_by_run(&ctx.run)
        .unwrap()
        .into_iter()
        .filter(|d| d.step_label == "phase-02.delegate")
        .count();
    assert_eq!(delegations, 3);
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_run_without_users_skips_user_steps() {
    let mut h = Harness::start(registry(), 100_000_000).await;
    let ctx = context(WG_100, 1, small_args(0));
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.reason);

    let fund_users = h.cache.get_run_step(&ctx.run, 1, "phase-01.fund-users").unwrap();
    assert_eq!(fund_users.status, RunStepStatus::Complete);
    // Funding and refund of the run faucet only.
    assert_eq!(h.cache.get_deploys_by_run(&ctx.run).unwrap().len(), 2);
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_underfunded_faucet_fails_run() {
    // The network faucet cannot cover the run faucet funding, so the chain discards it.
    let mut h = Harness::start(registry(), 10).await;
    let ctx = context(WG_100, 1, small_args(2));
    let outcome = h.run(ctx.clone()).await;
    assert_eq!(outcome.status, RunStatus::Failed);

    let info = h.cache.get_run_info(&ctx.run).unwrap();
    assert_eq!(info.status, RunStatus::Failed);
    assert!(info.reason.is_some());
    let step = h
        .cache
        .get_run_step(&ctx.run, 1, "phase-01.fund-run-faucet")
        .unwrap();
    assert_eq!(step.status, RunStepStatus::Failed);
    assert!(h.cache.get_run_step(&ctx.run, 1, "phase-01.fund-users").is_err());
    assert!(!h.cache.is_run_locked(&ctx.run).unwrap());
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_locked_run_is_skipped() {
    let h = Harness::start(registry(), 100_000_000).await;
    let ctx = context(WG_100, 1, small_args(1));
    assert!(h.cache.acquire_run_lock(&create_run_lock(&ctx)).unwrap());

    assert_eq!(
        h.engine.start_run(ctx.clone()).await.unwrap(),
        StartOutcome::Locked
    );
    assert!(h.cache.get_run_info(&ctx.run).is_err());
    assert!(h.cache.get_deploys_by_run(&ctx.run).unwrap().is_empty());
    h.stop().await;
}

#[tokio::test]
#[serial]
async fn test_looped_run_repeats_passes() {
    let mut h = Harness::start(registry(), 100_000_000).await;
    let run = create_run_id(NETWORK, WG_100, 2).unwrap();
    let ctx = create_execution_context(run, 2, 2, 0, small_args(1));

    let first = h.run(ctx.clone()).await;
    assert_eq!((first.loop_index, first.status), (1, RunStatus::Complete));
    assert!(first.continues);
    let second = h.next_outcome().await;
    assert_eq!((second.loop_index, second.status), (2, RunStatus::Complete));
    assert!(!second.continues);

    for loop_index in [1, 2] {
        let steps = h.cache.get_run_steps(&ctx.run, loop_index).unwrap();
        assert!(steps.iter().all(|s| s.status == RunStepStatus::Complete));
    }
    // Node 2 was requested explicitly.
    assert!(h
        .cache
        .get_deploys_by_run(&ctx.run)
        .unwrap()
        .iter()
        .all(|d| d.dispatch_node == 2));
    h.stop().await;
}
