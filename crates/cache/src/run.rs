//! RUN partition: run records, accounts, deploys and transfers.

use chainload_types::{Account, Deploy, Motes, RunIdentifier, RunInfo, RunStep, Transfer};

use crate::{keys, Cache, CacheError, CacheItemKey, StorePartition};

const P: StorePartition = StorePartition::Run;

impl Cache {
    pub fn set_run_info(&self, info: &RunInfo) -> Result<(), CacheError> {
        self.put(P, keys::run_info(&info.run), info)
    }

    pub fn get_run_info(&self, run: &RunIdentifier) -> Result<RunInfo, CacheError> {
        self.fetch(P, &keys::run_info(run))
    }

    pub fn set_run_step(&self, step: &RunStep) -> Result<(), CacheError> {
        self.put(P, keys::run_step(&step.run, step.loop_index, &step.label), step)
    }

    pub fn get_run_step(
        &self,
        run: &RunIdentifier,
        loop_index: u32,
        label: &str,
    ) -> Result<RunStep, CacheError> {
        self.fetch(P, &keys::run_step(run, loop_index, label))
    }

    /// Steps recorded for one pass of a run.
    pub fn get_run_steps(
        &self,
        run: &RunIdentifier,
        loop_index: u32,
    ) -> Result<Vec<RunStep>, CacheError> {
        self.fetch_many(P, &keys::run_steps(run, loop_index))
    }

    /// Store a run-owned account. Network accounts live in INFRA on the network record.
    pub fn set_account(&self, account: &Account) -> Result<(), CacheError> {
        let run = account.run.as_ref().ok_or_else(|| {
            CacheError::InvalidKey(format!("account {} is not owned by a run", account.label()))
        })?;
        self.put(P, keys::account(run, account.index), account)
    }

    pub fn get_account(&self, run: &RunIdentifier, index: u32) -> Result<Account, CacheError> {
        self.fetch(P, &keys::account(run, index))
    }

    /// Resolve an account index, where 0 designates the network faucet.
    pub fn get_account_by_index(
        &self,
        run: &RunIdentifier,
        index: u32,
    ) -> Result<Account, CacheError> {
        if index == 0 {
            return self
                .get_network(&run.network)?
                .faucet
                .ok_or_else(|| CacheError::NotFound(format!("{}: network faucet", run.network)));
        }
        self.get_account(run, index)
    }

    /// Accounts of a run, ordered by index.
    pub fn get_accounts(&self, run: &RunIdentifier) -> Result<Vec<Account>, CacheError> {
        self.fetch_many(P, &keys::accounts(run))
    }

    /// Atomically add to a run account's tracked balance.
    pub fn increment_account_balance(
        &self,
        run: &RunIdentifier,
        index: u32,
        amount: Motes,
    ) -> Result<Account, CacheError> {
        self.modify(P, &keys::account(run, index), |a: &mut Account| {
            a.balance = a.balance.saturating_add(amount);
        })
    }

    /// Atomically subtract from a run account's tracked balance, flooring at zero.
    pub fn decrement_account_balance(
        &self,
        run: &RunIdentifier,
        index: u32,
        amount: Motes,
    ) -> Result<Account, CacheError> {
        self.modify(P, &keys::account(run, index), |a: &mut Account| {
            a.balance = a.balance.saturating_sub(amount);
        })
    }

    /// Store a deploy along with the index entry that resolves its hash.
    pub fn set_deploy(&self, deploy: &Deploy) -> Result<(), CacheError> {
        let key = keys::deploy(&deploy.run, deploy.account_index, &deploy.deploy_hash);
        self.put(P, key.clone(), deploy)?;
        self.put(P, keys::deploy_index(&deploy.network, &deploy.deploy_hash), &key)
    }

    /// Atomically apply `f` to the stored copy of `deploy`, returning the result.
    pub fn update_deploy<F>(&self, deploy: &Deploy, f: F) -> Result<Deploy, CacheError>
    where
        F: Fn(&mut Deploy) + Send + Sync,
    {
        self.modify(
            P,
            &keys::deploy(&deploy.run, deploy.account_index, &deploy.deploy_hash),
            f,
        )
    }

    /// Remove a deploy record and its index entry; `false` if it was not present.
    pub fn delete_deploy(&self, deploy: &Deploy) -> Result<bool, CacheError> {
        self.store()
            .delete_one(P, &keys::deploy_index(&deploy.network, &deploy.deploy_hash))?;
        self.store().delete_one(
            P,
            &keys::deploy(&deploy.run, deploy.account_index, &deploy.deploy_hash),
        )
    }

    /// Look a deploy up by hash alone, across every run of the network.
    pub fn get_deploy(&self, network: &str, deploy_hash: &str) -> Result<Deploy, CacheError> {
        let key: CacheItemKey = self.fetch(P, &keys::deploy_index(network, deploy_hash))?;
        self.fetch(P, &key)
    }

    pub fn get_deploys_by_run(&self, run: &RunIdentifier) -> Result<Vec<Deploy>, CacheError> {
        self.fetch_many(P, &keys::deploys_of_run(run))
    }

    pub fn get_deploys_by_account(
        &self,
        run: &RunIdentifier,
        account_index: u32,
    ) -> Result<Vec<Deploy>, CacheError> {
        self.fetch_many(P, &keys::deploys_of_account(run, account_index))
    }

    pub fn set_transfer(&self, transfer: &Transfer) -> Result<(), CacheError> {
        self.put(
            P,
            keys::transfer(&transfer.run, transfer.cp1_index, &transfer.deploy_hash),
            transfer,
        )
    }

    pub fn delete_transfer(&self, transfer: &Transfer) -> Result<bool, CacheError> {
        self.store().delete_one(
            P,
            &keys::transfer(&transfer.run, transfer.cp1_index, &transfer.deploy_hash),
        )
    }

    pub fn get_transfer(
        &self,
        run: &RunIdentifier,
        deploy_hash: &str,
    ) -> Result<Transfer, CacheError> {
        self.fetch_by_name(P, &keys::transfers_of_run(run), deploy_hash)
    }

    pub fn get_transfers(&self, run: &RunIdentifier) -> Result<Vec<Transfer>, CacheError> {
        self.fetch_many(P, &keys::transfers_of_run(run))
    }

    /// Remove every record of `run` together with the index entries and
    /// finalization claims of its deploys. Returns the number of items removed.
    pub fn flush_run(&self, run: &RunIdentifier) -> Result<usize, CacheError> {
        let deploys = self.get_deploys_by_run(run)?;
        let mut removed =
            self.prune_deploy_claims(&run.network, deploys.iter().map(|d| d.deploy_hash.as_str()))?;
        for deploy in &deploys {
            let index = keys::deploy_index(&run.network, &deploy.deploy_hash);
            removed += usize::from(self.store().delete_one(P, &index)?);
        }
        for collection in [
            keys::ACCOUNT,
            keys::DEPLOY,
            keys::TRANSFER,
            keys::RUN_STEP,
            keys::LOCK,
        ] {
            for item in self.store().get_many(P, &keys::run_items(run, collection))? {
                removed += usize::from(self.store().delete_one(P, &item.key)?);
            }
        }
        removed += usize::from(self.store().delete_one(P, &keys::run_info(run))?);
        tracing::info!(run = %run, removed, "Flushed run");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainload_types::factory::{
        create_account_for_run, create_deploy_for_run, create_execution_context, create_run_id,
        create_run_info, create_run_step, create_transfer,
    };
    use chainload_types::{AccountType, DeployType, ExecutionContext, WorkloadArgs};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ctx(run_index: u32) -> ExecutionContext {
        let run = create_run_id("lrt1", "WG-100", run_index).unwrap();
        create_execution_context(run, 0, 0, 0, WorkloadArgs::default())
    }

    #[test]
    fn test_run_records_round_trip() {
        let cache = Cache::in_memory();
        let c = ctx(1);
        let info = create_run_info(&c);
        cache.set_run_info(&info).unwrap();
        assert_eq!(cache.get_run_info(&c.run).unwrap(), info);

        let step = create_run_step(&c, "phase-01.create-accounts");
        cache.set_run_step(&step).unwrap();
        assert_eq!(
            cache
                .get_run_step(&c.run, 1, "phase-01.create-accounts")
                .unwrap(),
            step
        );
        assert_eq!(cache.get_run_steps(&c.run, 1).unwrap().len(), 1);
        assert!(cache.get_run_steps(&c.run, 2).unwrap().is_empty());
    }

    #[test]
    fn test_account_balance_updates() {
        let cache = Cache::in_memory();
        let c = ctx(1);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let account = create_account_for_run(&mut rng, &c, 1, AccountType::Faucet).unwrap();
        cache.set_account(&account).unwrap();

        cache.increment_account_balance(&c.run, 1, 1000).unwrap();
        let after = cache.decrement_account_balance(&c.run, 1, 100).unwrap();
        assert_eq!(after.balance, 900);
        assert_eq!(cache.get_account(&c.run, 1).unwrap().balance, 900);
        assert_eq!(
            cache.decrement_account_balance(&c.run, 1, 5_000).unwrap().balance,
            0
        );
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let cache = Cache::in_memory();
        let c = ctx(1);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let account = create_account_for_run(&mut rng, &c, 1, AccountType::User).unwrap();
        cache.set_account(&account).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        cache.increment_account_balance(&c.run, 1, 1).unwrap();
                    }
                });
            }
        });
        assert_eq!(cache.get_account(&c.run, 1).unwrap().balance, 800);
    }

    #[test]
    fn test_accounts_are_scoped_to_run() {
        let cache = Cache::in_memory();
        let (c1, c2) = (ctx(1), ctx(2));
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for i in 1..=3 {
            let a = create_account_for_run(&mut rng, &c1, i, AccountType::User).unwrap();
            cache.set_account(&a).unwrap();
        }
        let other = create_account_for_run(&mut rng, &c2, 1, AccountType::User).unwrap();
        cache.set_account(&other).unwrap();

        let accounts = cache.get_accounts(&c1.run).unwrap();
        assert_eq!(accounts.iter().map(|a| a.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(cache.get_accounts(&c2.run).unwrap(), vec![other]);
    }

    #[test]
    fn test_network_faucet_is_account_zero() {
        let cache = Cache::in_memory();
        let c = ctx(1);
        assert!(cache.get_account_by_index(&c.run, 0).is_err());
    }

    #[test]
    fn test_deploy_lookup_by_hash() {
        let cache = Cache::in_memory();
        let c = ctx(1);
        let d1 = create_deploy_for_run(&c, 1, "h1", 1, DeployType::Transfer, "phase-01.fund", 1000);
        let d2 = create_deploy_for_run(&c, 2, "h2", 1, DeployType::Transfer, "phase-01.fund", 1000);
        let d3 = create_deploy_for_run(&ctx(2), 1, "h3", 1, DeployType::Refund, "phase-02.refund", 1000);
        for d in [&d1, &d2, &d3] {
            cache.set_deploy(d).unwrap();
        }

        assert_eq!(cache.get_deploy("lrt1", "h2").unwrap(), d2);
        assert_eq!(cache.get_deploy("lrt1", "h3").unwrap(), d3);
        assert!(matches!(
            cache.get_deploy("lrt1", "nope"),
            Err(CacheError::NotFound(_))
        ));
        assert_eq!(cache.get_deploys_by_run(&c.run).unwrap().len(), 2);
        assert_eq!(cache.get_deploys_by_account(&c.run, 1).unwrap(), vec![d1.clone()]);

        let updated = cache
            .update_deploy(&d2, |d| {
                d.update_status(chainload_types::DeployStatus::Processed);
            })
            .unwrap();
        assert_eq!(updated.status, chainload_types::DeployStatus::Processed);
        assert_eq!(cache.get_deploy("lrt1", "h2").unwrap(), updated);

        assert!(cache.delete_deploy(&d1).unwrap());
        assert!(!cache.delete_deploy(&d1).unwrap());
        assert!(cache.get_deploy("lrt1", "h1").is_err());
    }

    #[test]
    fn test_flush_run_removes_records_and_claims() {
        let cache = Cache::in_memory();
        let (c1, c2) = (ctx(1), ctx(2));
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        for c in [&c1, &c2] {
            cache.set_run_info(&create_run_info(c)).unwrap();
            cache.set_run_step(&create_run_step(c, "phase-01.fund")).unwrap();
            let account = create_account_for_run(&mut rng, c, 1, AccountType::User).unwrap();
            cache.set_account(&account).unwrap();
        }
        let d1 = create_deploy_for_run(&c1, 1, "h1", 1, DeployType::Transfer, "phase-01.fund", 1000);
        let d2 = create_deploy_for_run(&c2, 1, "h2", 1, DeployType::Transfer, "phase-01.fund", 1000);
        cache.set_deploy(&d1).unwrap();
        cache.set_deploy(&d2).unwrap();
        cache.set_transfer(&create_transfer(&c1, "h1", 1, 3, 100, true)).unwrap();
        let claim = |hash: &str| chainload_types::NodeEventInfo {
            network: "lrt1".into(),
            node_index: 1,
            event_id: 1,
            event_type: keys::DEPLOY_FINALIZED.into(),
            timestamp: chrono::Utc::now(),
            block_hash: Some("b1".into()),
            deploy_hash: Some(hash.into()),
        };
        assert!(cache.set_node_event_once(&claim("h1"), "h1").unwrap());
        assert!(cache.set_node_event_once(&claim("h2"), "h2").unwrap());

        // info, step, account, deploy, its index entry, transfer and claim.
        assert_eq!(cache.flush_run(&c1.run).unwrap(), 7);
        assert!(cache.get_run_info(&c1.run).is_err());
        assert!(cache.get_accounts(&c1.run).unwrap().is_empty());
        assert!(matches!(cache.get_deploy("lrt1", "h1"), Err(CacheError::NotFound(_))));
        assert!(cache.get_transfers(&c1.run).unwrap().is_empty());
        assert_eq!(cache.get_node_events("lrt1", None).unwrap().len(), 1);

        assert_eq!(cache.get_deploy("lrt1", "h2").unwrap(), d2);
        assert_eq!(cache.get_accounts(&c2.run).unwrap().len(), 1);
        assert!(cache.get_run_info(&c2.run).is_ok());
    }

    #[test]
    fn test_transfer_lookup() {
        let cache = Cache::in_memory();
        let c = ctx(1);
        let t = create_transfer(&c, "h1", 1, 3, 100, true);
        cache.set_transfer(&t).unwrap();
        assert_eq!(cache.get_transfer(&c.run, "h1").unwrap(), t);
        assert_eq!(cache.get_transfers(&c.run).unwrap().len(), 1);
        assert!(cache.delete_transfer(&t).unwrap());
        assert!(cache.get_transfers(&c.run).unwrap().is_empty());
    }
}
