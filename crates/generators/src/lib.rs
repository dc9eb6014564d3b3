//! Workload generators.
//!
//! Every generator funds its run from the network faucet, exercises the
//! chain, then returns what is left:
//!
//! ```text
//! WG-100  phase-01  create-accounts ─ fund-run-faucet ─ fund-users
//!         phase-02  refund-users ─ refund-run-faucet
//!
//! WG-200  phase-01  create-accounts ─ fund-run-faucet ─ fund-contract ─ fund-users
//!         phase-02  install-counter ─ install-user-contracts
//!         phase-03  refund-users ─ refund-contract ─ refund-run-faucet
//!                   (users refund through their stored-transfer contract)
//!
//! WG-210  phase-01  create-accounts ─ fund-run-faucet ─ fund-users
//!         phase-02  delegate
//!         phase-03  refund-users ─ refund-run-faucet
//! ```
//!
//! Account indices: 0 is the network faucet, 1 the run faucet, 2 the
//! contract account and users start at 3.

mod steps;

pub use steps::{
    AccountSet, CreateAccounts, Delegate, Fund, InstallContracts, Refund, ACC_RUN_CONTRACT,
    ACC_RUN_FAUCET, ACC_RUN_USERS,
};

use chainload_orchestration::{Generator, GeneratorRegistry, Phase};
use chainload_types::ContractType;

pub const WG_100: &str = "WG-100";
pub const WG_200: &str = "WG-200";
pub const WG_210: &str = "WG-210";

fn setup(with_contract: bool) -> Phase {
    let phase = Phase::new("phase-01")
        .with_step(CreateAccounts)
        .with_step(Fund::run_faucet());
    let phase = if with_contract {
        phase.with_step(Fund::contract())
    } else {
        phase
    };
    phase.with_step(Fund::users())
}

/// Native transfers: fund users from a run faucet, then refund everything.
pub fn wg_100() -> Generator {
    Generator::new(WG_100, "Fund users with native transfers, then refund")
        .with_phase(setup(false))
        .with_phase(
            Phase::new("phase-02")
                .with_step(Refund::users())
                .with_step(Refund::run_faucet()),
        )
}

/// Contract installs by the contract account and by every user.
pub fn wg_200() -> Generator {
    Generator::new(WG_200, "Install a counter contract and user stored-transfer contracts")
        .with_phase(setup(true))
        .with_phase(
            Phase::new("phase-02")
                .with_step(InstallContracts {
                    action: "install-counter",
                    accounts: AccountSet::Contract,
                    contract_type: ContractType::CounterDefine,
                })
                .with_step(InstallContracts {
                    action: "install-user-contracts",
                    accounts: AccountSet::Users,
                    contract_type: ContractType::TransferU512Stored,
                }),
        )
        .with_phase(
            Phase::new("phase-03")
                .with_step(Refund::users_via(ContractType::TransferU512Stored))
                .with_step(Refund::contract())
                .with_step(Refund::run_faucet()),
        )
}

/// Delegation from every user to one validator.
pub fn wg_210() -> Generator {
    Generator::new(WG_210, "Delegate from user accounts to a validator")
        .with_phase(setup(false))
        .with_phase(Phase::new("phase-02").with_step(Delegate))
        .with_phase(
            Phase::new("phase-03")
                .with_step(Refund::users())
                .with_step(Refund::run_faucet()),
        )
}

/// Every built-in generator.
pub fn registry() -> GeneratorRegistry {
    GeneratorRegistry::new()
        .with(wg_100())
        .with(wg_200())
        .with(wg_210())
}
