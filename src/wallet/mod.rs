// Wallet module - THE NODE EDGE
// Capability interface over the wallet RPC surface, a Bitcoin Core binding,
// and a mock backend for tests

mod core_rpc;
mod mock;
mod traits;

pub use core_rpc::{CoreRpcConfig, CoreWalletClient};
pub use mock::MockWallet;
pub use traits::{ChainStatus, TxInput, Unspent, WalletBackend, WalletError};
