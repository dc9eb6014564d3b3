//! Steps shared by the workload generators.

use async_trait::async_trait;
use chainload_orchestration::{
    verification, Completion, OrchestrationContext, Step, VerificationError, WorkDescriptor,
    WorkItem,
};
use chainload_types::{
    AccountType, ContractType, DeployStatus, DeployType, ExecutionContext, Motes, WorkloadArgs,
};
use std::ops::Range;
use tracing::debug;

/// Run faucet, funded from the network faucet.
pub const ACC_RUN_FAUCET: u32 = 1;
/// Account owning the run's installed contracts.
pub const ACC_RUN_CONTRACT: u32 = 2;
/// First user account.
pub const ACC_RUN_USERS: u32 = 3;

/// A group of run accounts addressed by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSet {
    NetworkFaucet,
    RunFaucet,
    Contract,
    Users,
}

impl AccountSet {
    pub fn indices(&self, args: &WorkloadArgs) -> Range<u32> {
        match self {
            AccountSet::NetworkFaucet => 0..1,
            AccountSet::RunFaucet => ACC_RUN_FAUCET..ACC_RUN_FAUCET + 1,
            AccountSet::Contract => ACC_RUN_CONTRACT..ACC_RUN_CONTRACT + 1,
            AccountSet::Users => ACC_RUN_USERS..ACC_RUN_USERS + args.user_accounts,
        }
    }

    fn len(&self, args: &WorkloadArgs) -> usize {
        self.indices(args).len()
    }
}

/// Create the run faucet, the contract account and every user account.
#[derive(Debug, Default)]
pub struct CreateAccounts;

#[async_trait]
impl Step for CreateAccounts {
    fn action(&self) -> &str {
        "create-accounts"
    }

    fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor {
        let users = AccountSet::Users.indices(&ctx.args);
        WorkDescriptor::new(Completion::OnDispatch, users.len() + 2, move || {
            [
                (ACC_RUN_FAUCET, AccountType::Faucet),
                (ACC_RUN_CONTRACT, AccountType::Contract),
            ]
            .into_iter()
            .chain(users.clone().map(|i| (i, AccountType::User)))
            .map(|(index, account_type)| WorkItem::CreateAccount {
                index,
                account_type,
            })
        })
    }

    async fn verify(
        &self,
        ctx: &ExecutionContext,
        context: &OrchestrationContext,
        _label: &str,
    ) -> Result<(), VerificationError> {
        let expected = AccountSet::Users.len(&ctx.args) + 2;
        verification::verify_account_count(&context.cache, &ctx.run, expected)
    }
}

/// Transfer a fixed amount from one account to each account of a set.
#[derive(Debug)]
pub struct Fund {
    pub action: &'static str,
    pub from: u32,
    pub to: AccountSet,
    pub amount: fn(&WorkloadArgs) -> Motes,
}

impl Fund {
    pub fn run_faucet() -> Self {
        Self {
            action: "fund-run-faucet",
            from: 0,
            to: AccountSet::RunFaucet,
            amount: |args| args.faucet_initial_balance,
        }
    }

    pub fn contract() -> Self {
        Self {
            action: "fund-contract",
            from: ACC_RUN_FAUCET,
            to: AccountSet::Contract,
            amount: |args| args.contract_initial_balance,
        }
    }

    pub fn users() -> Self {
        Self {
            action: "fund-users",
            from: ACC_RUN_FAUCET,
            to: AccountSet::Users,
            amount: |args| args.user_initial_balance,
        }
    }
}

#[async_trait]
impl Step for Fund {
    fn action(&self) -> &str {
        self.action
    }

    fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor {
        let targets = self.to.indices(&ctx.args);
        let from = self.from;
        let amount = (self.amount)(&ctx.args);
        WorkDescriptor::new(Completion::OnFinalization, targets.len(), move || {
            targets.clone().map(move |to| WorkItem::Transfer {
                from,
                to,
                amount,
                deploy_type: DeployType::Transfer,
                is_refundable: true,
                contract: None,
            })
        })
    }

    async fn verify(
        &self,
        ctx: &ExecutionContext,
        context: &OrchestrationContext,
        label: &str,
    ) -> Result<(), VerificationError> {
        verification::verify_deploy_count(&context.cache, ctx, label, self.to.len(&ctx.args))?;
        let amount = (self.amount)(&ctx.args);
        for index in self.to.indices(&ctx.args).filter(|i| *i != 0) {
            verification::verify_account_balance(&context.cache, &ctx.run, index, amount)?;
        }
        Ok(())
    }
}

/// Return what each account of a set holds on chain, less the fee.
#[derive(Debug)]
pub struct Refund {
    pub action: &'static str,
    pub from: AccountSet,
    pub to: u32,
    /// Contract each source calls instead of a native transfer.
    pub contract: Option<ContractType>,
}

impl Refund {
    pub fn users() -> Self {
        Self {
            action: "refund-users",
            from: AccountSet::Users,
            to: ACC_RUN_FAUCET,
            contract: None,
        }
    }

    /// Refund users through the contract each of them installed.
    pub fn users_via(contract_type: ContractType) -> Self {
        Self {
            contract: Some(contract_type),
            ..Self::users()
        }
    }

    pub fn contract() -> Self {
        Self {
            action: "refund-contract",
            from: AccountSet::Contract,
            to: ACC_RUN_FAUCET,
            contract: None,
        }
    }

    pub fn run_faucet() -> Self {
        Self {
            action: "refund-run-faucet",
            from: AccountSet::RunFaucet,
            to: 0,
            contract: None,
        }
    }
}

#[async_trait]
impl Step for Refund {
    fn action(&self) -> &str {
        self.action
    }

    fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor {
        let sources = self.from.indices(&ctx.args);
        let to = self.to;
        let contract = self.contract;
        WorkDescriptor::new(Completion::OnFinalization, sources.len(), move || {
            sources
                .clone()
                .map(move |from| WorkItem::Refund { from, to, contract })
        })
    }

    /// Every refund that reached the chain carries its transfer record, no
    /// source keeps more than the fee and the destination was credited.
    async fn verify(
        &self,
        ctx: &ExecutionContext,
        context: &OrchestrationContext,
        label: &str,
    ) -> Result<(), VerificationError> {
        let refunds: Vec<_> = context
            .cache
            .get_deploys_by_run(&ctx.run)?
            .into_iter()
            .filter(|d| {
                d.step_label == label
                    && d.loop_index == ctx.loop_index
                    && d.status == DeployStatus::Finalized
            })
            .collect();
        let mut returned: Motes = 0;
        for deploy in &refunds {
            let transfer =
                verification::verify_transfer(&context.cache, &ctx.run, &deploy.deploy_hash)?;
            returned += transfer.amount;
        }

        let fee = context.config.tx_fee;
        for index in self.from.indices(&ctx.args) {
            verification::verify_chain_balance_at_most(context, ctx, index, fee).await?;
        }
        if self.to != 0 {
            verification::verify_account_balance_at_least(
                &context.cache,
                &ctx.run,
                self.to,
                returned,
            )?;
        }
        debug!(
            run = %ctx.run,
            step = label,
            refunds = refunds.len(),
            returned,
            "Refunds verified"
        );
        Ok(())
    }
}

/// Install a contract under each account of a set.
#[derive(Debug)]
pub struct InstallContracts {
    pub action: &'static str,
    pub accounts: AccountSet,
    pub contract_type: ContractType,
}

#[async_trait]
impl Step for InstallContracts {
    fn action(&self) -> &str {
        self.action
    }

    fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor {
        let accounts = self.accounts.indices(&ctx.args);
        let contract_type = self.contract_type;
        WorkDescriptor::new(Completion::OnFinalization, accounts.len(), move || {
            accounts
                .clone()
                .map(move |account_index| WorkItem::InstallContract {
                    account_index,
                    contract_type,
                })
        })
    }

    async fn verify(
        &self,
        ctx: &ExecutionContext,
        context: &OrchestrationContext,
        label: &str,
    ) -> Result<(), VerificationError> {
        verification::verify_deploy_count(&context.cache, ctx, label, self.accounts.len(&ctx.args))?;
        let name = self.contract_type.name().to_lowercase();
        for index in self.accounts.indices(&ctx.args) {
            context
                .cache
                .get_named_key(ctx.network(), index, self.contract_type, &name)?;
        }
        Ok(())
    }
}

/// Delegate a fixed amount from each user to the configured validator.
#[derive(Debug, Default)]
pub struct Delegate;

#[async_trait]
impl Step for Delegate {
    fn action(&self) -> &str {
        "delegate"
    }

    fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor {
        let users = AccountSet::Users.indices(&ctx.args);
        let validator_index = ctx.args.validator_index;
        let amount = ctx.args.delegate_amount;
        WorkDescriptor::new(Completion::OnFinalization, users.len(), move || {
            users.clone().map(move |account_index| WorkItem::Delegate {
                account_index,
                validator_index,
                amount,
            })
        })
    }

    async fn verify(
        &self,
        ctx: &ExecutionContext,
        context: &OrchestrationContext,
        label: &str,
    ) -> Result<(), VerificationError> {
        let users = AccountSet::Users.indices(&ctx.args);
        verification::verify_deploy_count(&context.cache, ctx, label, users.len())?;
        let expected = ctx
            .args
            .user_initial_balance
            .saturating_sub(ctx.args.delegate_amount);
        for index in users {
            verification::verify_account_balance(&context.cache, &ctx.run, index, expected)?;
        }
        Ok(())
    }
}
