// satflipd - runs the deposit reconciler and session-expiry sweep against
// a Bitcoin Core wallet. The chat front end drives the Custodian in-process.

use clap::Parser;
use satflip::deposit::{DepositReconciler, ReconcilerConfig};
use satflip::ledger::LedgerStore;
use satflip::service::Custodian;
use satflip::wager::WagerConfig;
use satflip::wallet::{CoreRpcConfig, CoreWalletClient, WalletBackend};
use satflip::withdraw::{FeeMode, WithdrawConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "satflipd", about = "Custodial satoshi ledger daemon")]
struct Args {
    /// Ledger database directory
    #[arg(long, default_value = "./satflip-db")]
    db: PathBuf,

    /// Bitcoin Core RPC host
    #[arg(long, default_value = "127.0.0.1")]
    rpc_host: String,

    /// Bitcoin Core RPC port
    #[arg(long, default_value_t = 8332)]
    rpc_port: u16,

    /// RPC username
    #[arg(long, default_value = "rpcuser")]
    rpc_user: String,

    /// RPC password
    #[arg(long, default_value = "rpcpassword")]
    rpc_password: String,

    /// Wallet name on the node
    #[arg(long, default_value = "satflip")]
    rpc_wallet: String,

    /// Seconds between deposit scan cycles
    #[arg(long, default_value_t = 20)]
    scan_interval: u64,

    /// Minimum confirmations before a deposit is credited
    #[arg(long, default_value_t = 1)]
    min_conf: u32,

    /// Fee rate in sat/vB for constructed withdrawals
    #[arg(long, default_value_t = 5)]
    fee_rate: u64,

    /// Delegate withdrawal coin selection and fees to the wallet
    #[arg(long)]
    wallet_managed_fees: bool,

    /// Wager session time-to-live in seconds
    #[arg(long, default_value_t = 900)]
    wager_ttl: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let ledger = Arc::new(LedgerStore::open(&args.db)?);
    let stats = ledger.stats()?;
    info!(
        accounts = stats.accounts,
        deposits = stats.deposits,
        addresses = stats.addresses,
        "ledger opened"
    );

    let rpc_config = CoreRpcConfig::new()
        .with_host(&args.rpc_host)
        .with_port(args.rpc_port)
        .with_auth(&args.rpc_user, &args.rpc_password)
        .with_wallet(&args.rpc_wallet);
    let wallet: Arc<dyn WalletBackend> = Arc::new(CoreWalletClient::connect(&rpc_config)?);

    let status = wallet.chain_status().await?;
    info!(
        network = %status.network,
        height = status.height,
        mempool_txs = status.mempool_txs,
        "connected to node"
    );

    let fee = if args.wallet_managed_fees {
        FeeMode::WalletManaged
    } else {
        FeeMode::SubtractFromPayout {
            sat_per_vbyte: args.fee_rate,
        }
    };
    let custodian = Custodian::new(
        Arc::clone(&ledger),
        Arc::clone(&wallet),
        WagerConfig::new().with_ttl(Duration::from_secs(args.wager_ttl)),
        WithdrawConfig::new()
            .with_fee_mode(fee)
            .with_min_conf(args.min_conf),
    );

    let reconciler = DepositReconciler::new(
        Arc::clone(&ledger),
        Arc::clone(&wallet),
        ReconcilerConfig::new()
            .with_interval(Duration::from_secs(args.scan_interval))
            .with_min_conf(args.min_conf),
    );

    let sweep = async {
        let mut ticker = tokio::time::interval(Duration::from_secs(args.scan_interval));
        loop {
            ticker.tick().await;
            let swept = custodian.sweep_expired_wagers().await;
            if swept > 0 {
                info!(swept, "expired wager sessions cancelled");
            }
        }
    };

    tokio::join!(reconciler.run(), sweep);
    Ok(())
}
