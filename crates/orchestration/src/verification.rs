//! Checks used by steps to judge deploys and run state.

use chainload_cache::Cache;
use chainload_types::{Deploy, DeployStatus, ExecutionContext, Motes, RunIdentifier, Transfer};

use crate::{OrchestrationContext, VerificationError};

/// A deploy is acceptable once finalized; optionally within tolerance.
pub fn verify_deploy(deploy: &Deploy, enforce_tolerance: bool) -> Result<(), VerificationError> {
    match deploy.status {
        DeployStatus::Finalized => {}
        DeployStatus::Discarded => {
            return Err(VerificationError::Discarded(deploy.deploy_hash.clone()))
        }
        _ => return Err(VerificationError::NotFinalized(deploy.deploy_hash.clone())),
    }
    if enforce_tolerance && deploy.finalization_is_acceptable == Some(false) {
        return Err(VerificationError::TooSlow {
            deploy_hash: deploy.deploy_hash.clone(),
            latency_ms: deploy.finalization_duration_ms.unwrap_or_default(),
            tolerance_ms: deploy.finalization_tolerance_ms,
        });
    }
    Ok(())
}

/// The deploy carries a recorded transfer.
pub fn verify_transfer(
    cache: &Cache,
    run: &RunIdentifier,
    deploy_hash: &str,
) -> Result<Transfer, VerificationError> {
    cache
        .get_transfer(run, deploy_hash)
        .map_err(|_| VerificationError::MissingTransfer(deploy_hash.to_string()))
}

/// The step finalized exactly `expected` deploys in the current pass.
pub fn verify_deploy_count(
    cache: &Cache,
    ctx: &ExecutionContext,
    step_label: &str,
    expected: usize,
) -> Result<(), VerificationError> {
    let actual = cache
        .get_deploys_by_run(&ctx.run)?
        .iter()
        .filter(|d| {
            d.step_label == step_label
                && d.loop_index == ctx.loop_index
                && d.status == DeployStatus::Finalized
        })
        .count();
    if actual != expected {
        return Err(VerificationError::DeployCount {
            step: step_label.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// The run holds exactly `expected` accounts.
pub fn verify_account_count(
    cache: &Cache,
    run: &RunIdentifier,
    expected: usize,
) -> Result<(), VerificationError> {
    let actual = cache.get_accounts(run)?.len();
    if actual != expected {
        return Err(VerificationError::AccountCount { expected, actual });
    }
    Ok(())
}

/// A run account's tracked balance equals `expected`.
pub fn verify_account_balance(
    cache: &Cache,
    run: &RunIdentifier,
    index: u32,
    expected: Motes,
) -> Result<(), VerificationError> {
    let account = cache.get_account(run, index)?;
    if account.balance != expected {
        return Err(VerificationError::Balance {
            account: account.label(),
            expected,
            actual: account.balance,
        });
    }
    Ok(())
}

/// A run account's tracked balance is at least `minimum`.
pub fn verify_account_balance_at_least(
    cache: &Cache,
    run: &RunIdentifier,
    index: u32,
    minimum: Motes,
) -> Result<(), VerificationError> {
    let account = cache.get_account(run, index)?;
    if account.balance < minimum {
        return Err(VerificationError::Shortfall {
            account: account.label(),
            minimum,
            actual: account.balance,
        });
    }
    Ok(())
}

/// A run account holds no more than `allowed` on chain.
pub async fn verify_chain_balance_at_most(
    context: &OrchestrationContext,
    ctx: &ExecutionContext,
    index: u32,
    allowed: Motes,
) -> Result<Motes, VerificationError> {
    let account = context.cache.get_account(&ctx.run, index)?;
    let node = context
        .cache
        .get_node_by_network_nodeset(ctx.network(), ctx.node_index, &mut rand::thread_rng())?
        .ok_or_else(|| VerificationError::Lookup(format!("no node on {}", ctx.network())))?;
    let balance = context
        .client
        .get_balance(&node, &account.account_id)
        .await
        .map_err(|e| VerificationError::Lookup(e.to_string()))?;
    if balance > allowed {
        return Err(VerificationError::Unreturned {
            account: account.label(),
            balance,
            allowed,
        });
    }
    Ok(balance)
}
