//! Key layout of every cached entity.
//!
//! The first path segment is always the network name, which is what
//! network-scoped flushes rely on.

use chainload_types::{
    account_label, lock_label, loop_label, node_label, ContractType, RunIdentifier,
};

use crate::{CacheItemKey, CacheSearchKey};

pub const NETWORK: &str = "network";
pub const NODE: &str = "node";
pub const NAMED_KEY: &str = "named-key";
pub const ACCOUNT: &str = "account";
pub const DEPLOY: &str = "deploy";
pub const DEPLOY_INDEX: &str = "deploy-index";
pub const TRANSFER: &str = "transfer";
pub const RUN: &str = "run";
pub const RUN_STEP: &str = "run-step";
pub const LOCK: &str = "lock";
pub const EVENT: &str = "event";
pub const MONITOR_LOCK: &str = "monitor-lock";

/// Event type of the per-deploy finalization claim.
pub const DEPLOY_FINALIZED: &str = "deploy_finalized";

fn run_paths(run: &RunIdentifier, collection: &str) -> Vec<String> {
    vec![
        run.network.clone(),
        collection.to_string(),
        run.run_type.clone(),
        run.label(),
    ]
}

pub fn network(name: &str) -> CacheItemKey {
    CacheItemKey::new([name], [NETWORK])
}

pub fn networks() -> CacheSearchKey {
    CacheSearchKey::new(["*", NETWORK])
}

pub fn node(network: &str, index: u32) -> CacheItemKey {
    CacheItemKey::new([network, NODE], [node_label(index)])
}

pub fn nodes(network: &str) -> CacheSearchKey {
    CacheSearchKey::new([network, NODE])
}

pub fn named_key(
    network: &str,
    account_index: u32,
    contract_type: ContractType,
    name: &str,
) -> CacheItemKey {
    CacheItemKey::new(
        [
            network.to_string(),
            NAMED_KEY.to_string(),
            account_label(account_index),
            contract_type.name().to_string(),
        ],
        [name],
    )
}

pub fn named_keys(network: &str, account_index: u32) -> CacheSearchKey {
    CacheSearchKey::new([
        network.to_string(),
        NAMED_KEY.to_string(),
        account_label(account_index),
    ])
}

pub fn account(run: &RunIdentifier, index: u32) -> CacheItemKey {
    CacheItemKey::new(run_paths(run, ACCOUNT), [account_label(index)])
}

pub fn accounts(run: &RunIdentifier) -> CacheSearchKey {
    CacheSearchKey::new(run_paths(run, ACCOUNT))
}

pub fn deploy(run: &RunIdentifier, account_index: u32, deploy_hash: &str) -> CacheItemKey {
    let mut paths = run_paths(run, DEPLOY);
    paths.push(account_label(account_index));
    CacheItemKey::new(paths, [deploy_hash])
}

/// Pointer from a deploy hash to the run-scoped key of its deploy.
pub fn deploy_index(network: &str, deploy_hash: &str) -> CacheItemKey {
    CacheItemKey::new([network, DEPLOY_INDEX], [deploy_hash])
}

pub fn deploys_of_run(run: &RunIdentifier) -> CacheSearchKey {
    CacheSearchKey::new(run_paths(run, DEPLOY))
}

pub fn deploys_of_account(run: &RunIdentifier, account_index: u32) -> CacheSearchKey {
    deploys_of_run(run).child(account_label(account_index))
}

pub fn transfer(run: &RunIdentifier, cp1_index: u32, deploy_hash: &str) -> CacheItemKey {
    let mut paths = run_paths(run, TRANSFER);
    paths.push(account_label(cp1_index));
    CacheItemKey::new(paths, [deploy_hash])
}

pub fn transfers_of_run(run: &RunIdentifier) -> CacheSearchKey {
    CacheSearchKey::new(run_paths(run, TRANSFER))
}

/// Every item of one collection of a run.
pub fn run_items(run: &RunIdentifier, collection: &str) -> CacheSearchKey {
    CacheSearchKey::new(run_paths(run, collection))
}

pub fn run_info(run: &RunIdentifier) -> CacheItemKey {
    CacheItemKey::new(
        [run.network.clone(), RUN.to_string(), run.run_type.clone()],
        [run.label()],
    )
}

pub fn run_step(run: &RunIdentifier, loop_index: u32, label: &str) -> CacheItemKey {
    let mut paths = run_paths(run, RUN_STEP);
    paths.push(loop_label(loop_index));
    CacheItemKey::new(paths, [label])
}

pub fn run_steps(run: &RunIdentifier, loop_index: u32) -> CacheSearchKey {
    CacheSearchKey::new(run_paths(run, RUN_STEP)).child(loop_label(loop_index))
}

pub fn run_lock(run: &RunIdentifier, lock_index: u32) -> CacheItemKey {
    CacheItemKey::new(run_paths(run, LOCK), [lock_label(lock_index)])
}

pub fn run_locks(run: &RunIdentifier) -> CacheSearchKey {
    CacheSearchKey::new(run_paths(run, LOCK))
}

/// First-seen record of an event about `subject` (a deploy or block hash).
pub fn node_event(network: &str, event_type: &str, subject: &str) -> CacheItemKey {
    CacheItemKey::new([network, EVENT, event_type], [subject])
}

pub fn node_events(network: &str, event_type: Option<&str>) -> CacheSearchKey {
    let search = CacheSearchKey::new([network, EVENT]);
    match event_type {
        Some(kind) => search.child(kind),
        None => search,
    }
}

pub fn monitor_lock(network: &str, node_index: u32, lock_index: u32) -> CacheItemKey {
    CacheItemKey::new(
        [network.to_string(), MONITOR_LOCK.to_string(), node_label(node_index)],
        [lock_label(lock_index)],
    )
}

pub fn monitor_locks(network: &str, node_index: u32) -> CacheSearchKey {
    CacheSearchKey::new([network.to_string(), MONITOR_LOCK.to_string(), node_label(node_index)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique_per_identity() {
        let r1 = RunIdentifier::new("lrt1", "WG-100", 1);
        let r2 = RunIdentifier::new("lrt1", "WG-100", 2);
        let r3 = RunIdentifier::new("lrt2", "WG-100", 1);
        let r4 = RunIdentifier::new("lrt1", "WG-200", 1);

        let mut seen = HashSet::new();
        for run in [&r1, &r2, &r3, &r4] {
            for i in 1..=3 {
                assert!(seen.insert(account(run, i)));
                assert!(seen.insert(deploy(run, i, "h")));
                assert!(seen.insert(transfer(run, i, "h")));
                assert!(seen.insert(run_step(run, i, "phase-01.fund")));
                assert!(seen.insert(run_lock(run, i)));
            }
            assert!(seen.insert(run_info(run)));
        }
        for net in ["lrt1", "lrt2"] {
            assert!(seen.insert(network(net)));
            assert!(seen.insert(deploy_index(net, "h")));
            for i in 1..=3 {
                assert!(seen.insert(node(net, i)));
                assert!(seen.insert(monitor_lock(net, i, 1)));
            }
        }
    }

    #[test]
    fn test_keys_contain_no_wildcards() {
        let run = RunIdentifier::new("lrt1", "WG-100", 1);
        for key in [
            network("lrt1"),
            node("lrt1", 1),
            account(&run, 1),
            deploy(&run, 1, "h"),
            run_lock(&run, 1),
            node_event("lrt1", "deploy_finalized", "h"),
        ] {
            assert!(key.validate().is_ok(), "{key}");
        }
    }

    #[test]
    fn test_search_keys_cover_item_keys() {
        let run = RunIdentifier::new("lrt1", "WG-100", 1);
        let d = deploy(&run, 2, "h");
        assert!(deploys_of_run(&run).matches(&d));
        assert!(deploys_of_account(&run, 2).matches(&d));
        assert!(!run_items(&run, DEPLOY).matches(&deploy_index("lrt1", "h")));
        assert!(run_items(&run, RUN_STEP).matches(&run_step(&run, 2, "phase-01.fund")));
        assert!(!deploys_of_account(&run, 3).matches(&d));
        assert!(networks().matches(&network("dev7")));
        assert!(!networks().matches(&node("dev7", 1)));
        assert!(run_locks(&run).matches(&run_lock(&run, 4)));
    }
}
