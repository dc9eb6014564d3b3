//! Typed entity construction from raw inputs.
//!
//! All identity rules (network name pattern, positive indices, run ownership
//! of accounts and deploys) are enforced here.

use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};

use crate::{
    Account, AccountType, Block, BlockStatus, ContractType, Deploy, DeployStatus, DeployType,
    ExecutionContext, FactoryError, KeyPair, Motes, NamedKey, Network, NetworkIdentifier,
    NetworkStatus, NetworkType, Node, NodeIdentifier, NodeStatus, NodeType, RunIdentifier, RunInfo,
    RunLock, RunStatus, RunStep, RunStepStatus, Transfer, WorkloadArgs,
};

/// Asset symbol recorded on transfers.
pub const DEFAULT_ASSET: &str = "CSPR";

/// Split a network name into its type and index.
pub fn parse_network_name(name: &str) -> Result<(NetworkType, u32), FactoryError> {
    let invalid = || FactoryError::InvalidNetworkName(name.to_string());
    if name.len() < 4 || !name.is_char_boundary(3) {
        return Err(invalid());
    }
    let (prefix, suffix) = name.split_at(3);
    let network_type = NetworkType::from_prefix(prefix).ok_or_else(invalid)?;
    if !suffix.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let index: u32 = suffix.parse().map_err(|_| invalid())?;
    if index == 0 {
        return Err(invalid());
    }
    Ok((network_type, index))
}

pub fn create_network_id(name: &str) -> Result<NetworkIdentifier, FactoryError> {
    parse_network_name(name)?;
    Ok(NetworkIdentifier::new(name))
}

pub fn create_network(name: &str, faucet: Option<Account>) -> Result<Network, FactoryError> {
    let (network_type, index) = parse_network_name(name)?;
    Ok(Network {
        name: name.to_string(),
        index,
        network_type,
        status: NetworkStatus::Healthy,
        faucet,
    })
}

pub fn create_node_id(network: &str, index: u32) -> Result<NodeIdentifier, FactoryError> {
    let network = create_network_id(network)?;
    positive("node index", index)?;
    Ok(NodeIdentifier { network, index })
}

#[allow(clippy::too_many_arguments)]
pub fn create_node(
    network: &str,
    index: u32,
    host: impl Into<String>,
    port_rpc: u16,
    port_event: u16,
    status: NodeStatus,
    node_type: NodeType,
    weight: u32,
) -> Result<Node, FactoryError> {
    let id = create_node_id(network, index)?;
    Ok(Node {
        network: id.network.name,
        index,
        host: host.into(),
        port_rpc,
        port_event,
        status,
        node_type,
        weight,
        account: None,
    })
}

pub fn create_run_id(
    network: &str,
    run_type: &str,
    run_index: u32,
) -> Result<RunIdentifier, FactoryError> {
    create_network_id(network)?;
    positive("run index", run_index)?;
    Ok(RunIdentifier::new(network, run_type, run_index))
}

/// Build the context of the first pass of a run.
pub fn create_execution_context(
    run: RunIdentifier,
    node_index: u32,
    loop_count: u32,
    loop_interval: u64,
    args: WorkloadArgs,
) -> ExecutionContext {
    ExecutionContext {
        run,
        node_index,
        loop_count,
        loop_interval,
        loop_index: 1,
        args,
    }
}

pub fn create_run_info(ctx: &ExecutionContext) -> RunInfo {
    RunInfo {
        run: ctx.run.clone(),
        status: RunStatus::Pending,
        node_index: ctx.node_index,
        loop_index: ctx.loop_index,
        loop_count: ctx.loop_count,
        args: ctx.args.clone(),
        started_at: None,
        ended_at: None,
        reason: None,
    }
}

pub fn create_run_step(ctx: &ExecutionContext, label: impl Into<String>) -> RunStep {
    RunStep {
        run: ctx.run.clone(),
        loop_index: ctx.loop_index,
        label: label.into(),
        status: RunStepStatus::Running,
        started_at: Utc::now(),
        ended_at: None,
        reason: None,
    }
}

pub fn create_run_lock(ctx: &ExecutionContext) -> RunLock {
    RunLock::new(ctx.run.clone())
}

/// Network faucet account from existing key material.
pub fn create_network_faucet(network: &str, key_pair: KeyPair) -> Result<Account, FactoryError> {
    create_network_id(network)?;
    let account_id = key_pair.account_id()?;
    Ok(Account {
        network: network.to_string(),
        run: None,
        index: 0,
        account_type: AccountType::NetworkFaucet,
        key_pair,
        account_id,
        balance: 0,
    })
}

/// Fresh run-owned account with a generated key pair.
pub fn create_account_for_run<R: RngCore + CryptoRng>(
    rng: &mut R,
    ctx: &ExecutionContext,
    index: u32,
    account_type: AccountType,
) -> Result<Account, FactoryError> {
    positive("account index", index)?;
    let key_pair = KeyPair::generate(rng);
    let account_id = key_pair.account_id()?;
    Ok(Account {
        network: ctx.network().to_string(),
        run: Some(ctx.run.clone()),
        index,
        account_type,
        key_pair,
        account_id,
        balance: 0,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create_deploy_for_run(
    ctx: &ExecutionContext,
    account_index: u32,
    deploy_hash: impl Into<String>,
    dispatch_node: u32,
    deploy_type: DeployType,
    step_label: impl Into<String>,
    tolerance_ms: i64,
) -> Deploy {
    Deploy {
        network: ctx.network().to_string(),
        run: ctx.run.clone(),
        account_index,
        deploy_hash: deploy_hash.into(),
        deploy_type,
        contract_hash: None,
        dispatch_node,
        dispatch_timestamp: Utc::now(),
        status: DeployStatus::Dispatched,
        step_label: step_label.into(),
        loop_index: ctx.loop_index,
        block_hash: None,
        block_rank: None,
        finalization_timestamp: None,
        finalization_node: None,
        finalization_duration_ms: None,
        finalization_tolerance_ms: tolerance_ms,
        finalization_is_acceptable: None,
    }
}

pub fn create_transfer(
    ctx: &ExecutionContext,
    deploy_hash: impl Into<String>,
    cp1_index: u32,
    cp2_index: u32,
    amount: Motes,
    is_refundable: bool,
) -> Transfer {
    Transfer {
        network: ctx.network().to_string(),
        run: ctx.run.clone(),
        deploy_hash: deploy_hash.into(),
        cp1_index,
        cp2_index,
        amount,
        asset: DEFAULT_ASSET.to_string(),
        is_refundable,
    }
}

pub fn create_block(
    network: &str,
    block_hash: impl Into<String>,
    rank: u64,
    timestamp: DateTime<Utc>,
    deploy_count: u32,
    validator_id: impl Into<String>,
    status: BlockStatus,
) -> Block {
    Block {
        network: network.to_string(),
        block_hash: block_hash.into(),
        rank,
        timestamp,
        deploy_count,
        validator_id: validator_id.into(),
        status,
    }
}

pub fn create_named_key(
    network: &str,
    account_index: u32,
    contract_type: ContractType,
    name: impl Into<String>,
    hash: impl Into<String>,
) -> NamedKey {
    NamedKey {
        network: network.to_string(),
        account_index,
        contract_type,
        name: name.into(),
        hash: hash.into(),
    }
}

fn positive(what: &'static str, value: u32) -> Result<(), FactoryError> {
    if value == 0 {
        return Err(FactoryError::InvalidIndex { what, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_parse_network_name() {
        assert_eq!(parse_network_name("lrt1").unwrap(), (NetworkType::Lrt, 1));
        assert_eq!(parse_network_name("stg12").unwrap(), (NetworkType::Stg, 12));
        for bad in ["", "lrt", "lrt0", "xyz1", "LRT1", "lrt-1", "lrt1a"] {
            assert!(parse_network_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_run_id_requires_positive_index() {
        assert!(create_run_id("lrt1", "WG-100", 1).is_ok());
        assert_eq!(
            create_run_id("lrt1", "WG-100", 0),
            Err(FactoryError::InvalidIndex {
                what: "run index",
                value: 0
            })
        );
    }

    #[test]
    fn test_run_accounts_have_distinct_ids() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let run = create_run_id("lrt1", "WG-100", 1).unwrap();
        let ctx = create_execution_context(run, 0, 0, 0, WorkloadArgs::default());
        let a = create_account_for_run(&mut rng, &ctx, 1, AccountType::Faucet).unwrap();
        let b = create_account_for_run(&mut rng, &ctx, 2, AccountType::User).unwrap();
        assert_ne!(a.account_id, b.account_id);
        assert_eq!(a.run.as_ref(), Some(&ctx.run));
        assert_eq!(b.label(), "A-000002");
    }

    #[test]
    fn test_deploy_carries_pass_context() {
        let run = create_run_id("dev3", "WG-200", 2).unwrap();
        let ctx = create_execution_context(run, 0, 2, 0, WorkloadArgs::default()).next_pass();
        let d = create_deploy_for_run(&ctx, 1, "h", 3, DeployType::Transfer, "phase-01.fund", 500);
        assert_eq!(d.loop_index, 2);
        assert_eq!(d.status, DeployStatus::Dispatched);
        assert_eq!(d.network, "dev3");
    }
}
