//! Chain client implementations.
//!
//! - [`RpcClient`]: JSON over HTTP against real nodes
//! - [`SimulatedChain`]: an in-process chain for local runs and tests

mod rpc;
mod sim;

pub use rpc::{
    BalanceResponse, BlockDeploysResponse, BlockResponse, RpcClient, SubmitDeployRequest,
    SubmitDeployResponse,
};
pub use sim::{SimulatedChain, SimulationConfig};
