//! Execution of individual work items.
//!
//! Chain operations follow the same sequence: select a dispatch node, record
//! the deploy (and transfer) before submission so that a finalization
//! reported early can always be correlated, submit with backoff, then apply
//! balance bookkeeping to run accounts.

use backon::Retryable;
use chainload_core::{ClientError, DeployPayload, DeployRequest};
use chainload_types::factory::{
    create_account_for_run, create_deploy_for_run, create_named_key, create_transfer,
};
use chainload_types::{
    Account, ContractType, Deploy, DeployType, ExecutionContext, KeyPair, Motes, NamedKey, Node,
};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

use crate::work::NETWORK_FAUCET_INDEX;
use crate::{OrchestrationContext, OrchestrationError, WorkItem, WorkOutcome};

/// A work item bound to the step that dispatched it.
#[derive(Debug, Clone)]
pub struct Job {
    pub ctx: ExecutionContext,
    pub step_label: String,
    pub item: WorkItem,
}

/// Execute one job, converting every error into a reported outcome.
pub async fn execute(context: &OrchestrationContext, job: &Job) -> WorkOutcome {
    let result = match &job.item {
        WorkItem::CreateAccount {
            index,
            account_type,
        } => create_account(context, job, *index, *account_type),
        WorkItem::Transfer {
            from,
            to,
            amount,
            deploy_type,
            is_refundable,
            contract,
        } => {
            let spec = TransferSpec {
                from: *from,
                to: *to,
                amount: *amount,
                deploy_type: *deploy_type,
                is_refundable: *is_refundable,
                contract: *contract,
            };
            transfer(context, job, spec).await.map(Some)
        }
        WorkItem::Refund { from, to, contract } => {
            refund(context, job, *from, *to, *contract).await
        }
        WorkItem::InstallContract {
            account_index,
            contract_type,
        } => install_contract(context, job, *account_index, *contract_type)
            .await
            .map(Some),
        WorkItem::Delegate {
            account_index,
            validator_index,
            amount,
        } => delegate(context, job, *account_index, *validator_index, *amount)
            .await
            .map(Some),
    };

    match result {
        Ok(Some(outcome)) => outcome,
        Ok(None) => WorkOutcome::Done { deploy_hash: None },
        Err(e) => {
            warn!(
                run = %job.ctx.run,
                step = %job.step_label,
                item = job.item.type_name(),
                error = %e,
                "Work item failed"
            );
            WorkOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

fn create_account(
    context: &OrchestrationContext,
    job: &Job,
    index: u32,
    account_type: chainload_types::AccountType,
) -> Result<Option<WorkOutcome>, OrchestrationError> {
    let account = create_account_for_run(&mut rand::thread_rng(), &job.ctx, index, account_type)?;
    context.cache.set_account(&account)?;
    debug!(
        run = %job.ctx.run,
        account = %account.label(),
        account_type = ?account_type,
        "Account created"
    );
    Ok(None)
}

/// Pick the dispatch node for the job's context.
fn select_node(
    context: &OrchestrationContext,
    ctx: &ExecutionContext,
) -> Result<Node, OrchestrationError> {
    context
        .cache
        .get_node_by_network_nodeset(ctx.network(), ctx.node_index, &mut rand::thread_rng())?
        .ok_or_else(|| OrchestrationError::EmptyNodeSet(ctx.network().to_string()))
}

/// Submit with exponential backoff on retryable errors.
async fn submit_with_retry(
    context: &OrchestrationContext,
    node: &Node,
    key_pair: &KeyPair,
    request: &DeployRequest,
) -> Result<String, OrchestrationError> {
    let attempts = AtomicU32::new(0);
    let submission = || async {
        attempts.fetch_add(1, Ordering::Relaxed);
        context.client.submit_deploy(node, key_pair, request).await
    };

    submission
        .retry(context.config.retry.to_backoff_builder())
        .when(ClientError::is_retryable)
        .notify(|err, wait| {
            debug!(
                node = %node.label(),
                error = %err,
                wait = ?wait,
                "Submission failed, retrying"
            );
        })
        .await
        .map_err(|e| {
            if e.is_retryable() {
                OrchestrationError::SubmissionExhausted {
                    attempts: attempts.load(Ordering::Relaxed),
                    last: e,
                }
            } else {
                OrchestrationError::Client(e)
            }
        })
}

/// Record the deploy, submit it, and reconcile the record with the hash the node returned.
async fn dispatch(
    context: &OrchestrationContext,
    job: &Job,
    node: &Node,
    sender: &Account,
    request: &DeployRequest,
    deploy_type: DeployType,
) -> Result<Deploy, OrchestrationError> {
    let mut deploy = create_deploy_for_run(
        &job.ctx,
        sender.index,
        request.hash(),
        node.index,
        deploy_type,
        job.step_label.clone(),
        context.config.tolerance_ms(),
    );
    deploy.contract_hash = request.payload.contract_hash().map(str::to_string);
    context.cache.set_deploy(&deploy)?;

    let hash = match submit_with_retry(context, node, &sender.key_pair, request).await {
        Ok(hash) => hash,
        Err(e) => {
            context.cache.delete_deploy(&deploy)?;
            return Err(e);
        }
    };
    if hash != deploy.deploy_hash {
        warn!(local = %deploy.deploy_hash, remote = %hash, "Node returned a different deploy hash");
        context.cache.delete_deploy(&deploy)?;
        deploy.deploy_hash = hash;
        context.cache.set_deploy(&deploy)?;
    }

    context.record(|m| m.deploys_dispatched.inc());
    debug!(
        run = %job.ctx.run,
        step = %job.step_label,
        node = %node.label(),
        deploy_hash = %deploy.deploy_hash,
        "Deploy dispatched"
    );
    Ok(deploy)
}

struct TransferSpec {
    from: u32,
    to: u32,
    amount: Motes,
    deploy_type: DeployType,
    is_refundable: bool,
    contract: Option<ContractType>,
}

/// Named key of the contract of `contract_type` installed by `account_index`.
fn installed_contract(
    context: &OrchestrationContext,
    ctx: &ExecutionContext,
    account_index: u32,
    contract_type: ContractType,
) -> Result<NamedKey, OrchestrationError> {
    let name = contract_type.name().to_lowercase();
    Ok(context
        .cache
        .get_named_key(ctx.network(), account_index, contract_type, &name)?)
}

async fn transfer(
    context: &OrchestrationContext,
    job: &Job,
    spec: TransferSpec,
) -> Result<WorkOutcome, OrchestrationError> {
    let TransferSpec {
        from,
        to,
        amount,
        deploy_type,
        is_refundable,
        contract,
    } = spec;
    let run = &job.ctx.run;
    let sender = context.cache.get_account_by_index(run, from)?;
    let receiver = context.cache.get_account_by_index(run, to)?;
    let contract = contract
        .map(|contract_type| installed_contract(context, &job.ctx, from, contract_type))
        .transpose()?;
    let node = select_node(context, &job.ctx)?;

    let request = DeployRequest::transfer(&sender, &receiver, amount, contract.as_ref());
    let transfer = create_transfer(&job.ctx, request.hash(), from, to, amount, is_refundable);
    context.cache.set_transfer(&transfer)?;

    let deploy = match dispatch(context, job, &node, &sender, &request, deploy_type).await {
        Ok(deploy) => deploy,
        Err(e) => {
            context.cache.delete_transfer(&transfer)?;
            return Err(e);
        }
    };
    if deploy.deploy_hash != transfer.deploy_hash {
        context.cache.delete_transfer(&transfer)?;
        context.cache.set_transfer(&create_transfer(
            &job.ctx,
            deploy.deploy_hash.clone(),
            from,
            to,
            amount,
            is_refundable,
        ))?;
    }

    if from != NETWORK_FAUCET_INDEX {
        context.cache.decrement_account_balance(run, from, amount)?;
    }
    if to != NETWORK_FAUCET_INDEX {
        context.cache.increment_account_balance(run, to, amount)?;
    }
    Ok(WorkOutcome::Done {
        deploy_hash: Some(deploy.deploy_hash),
    })
}

/// Refund the sender's chain balance less the fee; skipped when nothing remains.
async fn refund(
    context: &OrchestrationContext,
    job: &Job,
    from: u32,
    to: u32,
    contract: Option<ContractType>,
) -> Result<Option<WorkOutcome>, OrchestrationError> {
    let sender = context.cache.get_account_by_index(&job.ctx.run, from)?;
    let node = select_node(context, &job.ctx)?;
    let balance = context.client.get_balance(&node, &sender.account_id).await?;

    let fee = context.config.tx_fee;
    if balance <= fee {
        info!(
            run = %job.ctx.run,
            account = %sender.label(),
            balance,
            fee,
            "Refund skipped, balance does not cover fee"
        );
        return Ok(Some(WorkOutcome::Skipped {
            reason: format!("{} balance {balance} <= fee {fee}", sender.label()),
        }));
    }

    let spec = TransferSpec {
        from,
        to,
        amount: balance - fee,
        deploy_type: DeployType::Refund,
        is_refundable: false,
        contract,
    };
    Ok(Some(transfer(context, job, spec).await?))
}

async fn install_contract(
    context: &OrchestrationContext,
    job: &Job,
    account_index: u32,
    contract_type: ContractType,
) -> Result<WorkOutcome, OrchestrationError> {
    let sender = context.cache.get_account_by_index(&job.ctx.run, account_index)?;
    let node = select_node(context, &job.ctx)?;
    let request = DeployRequest::new(&sender, DeployPayload::InstallContract { contract_type });
    let deploy =
        dispatch(context, job, &node, &sender, &request, DeployType::ContractInstall).await?;

    let named_key = create_named_key(
        job.ctx.network(),
        account_index,
        contract_type,
        contract_type.name().to_lowercase(),
        deploy.deploy_hash.clone(),
    );
    context.cache.set_named_key(&named_key)?;
    Ok(WorkOutcome::Done {
        deploy_hash: Some(deploy.deploy_hash),
    })
}

async fn delegate(
    context: &OrchestrationContext,
    job: &Job,
    account_index: u32,
    validator_index: u32,
    amount: Motes,
) -> Result<WorkOutcome, OrchestrationError> {
    let run = &job.ctx.run;
    let sender = context.cache.get_account_by_index(run, account_index)?;
    let validator = context.cache.get_node(job.ctx.network(), validator_index)?;
    let validator_key = validator
        .account
        .as_ref()
        .map(|a| a.key_pair.public_key.clone())
        .unwrap_or_else(|| validator.label());
    let node = select_node(context, &job.ctx)?;

    let request = DeployRequest::new(
        &sender,
        DeployPayload::Delegate {
            validator: validator_key,
            amount,
        },
    );
    let deploy = dispatch(context, job, &node, &sender, &request, DeployType::Delegate).await?;
    if account_index != NETWORK_FAUCET_INDEX {
        context.cache.decrement_account_balance(run, account_index, amount)?;
    }
    Ok(WorkOutcome::Done {
        deploy_hash: Some(deploy.deploy_hash),
    })
}
