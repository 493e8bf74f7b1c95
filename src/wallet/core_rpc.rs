// Bitcoin Core wallet binding over JSON-RPC
//
// The only place in the crate where BTC amounts exist: everything crossing
// this boundary is converted to or from integer satoshis exactly once.

use crate::wallet::traits::{ChainStatus, TxInput, Unspent, WalletBackend, WalletError};
use async_trait::async_trait;
use bitcoin::Amount;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use serde_json::{json, Value};

/// Connection settings for a Bitcoin Core wallet
#[derive(Clone, Debug)]
pub struct CoreRpcConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub wallet: String,
}

impl Default for CoreRpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8332,
            user: "rpcuser".to_string(),
            password: "rpcpassword".to_string(),
            wallet: "satflip".to_string(),
        }
    }
}

impl CoreRpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_wallet(mut self, wallet: &str) -> Self {
        self.wallet = wallet.to_string();
        self
    }

    fn url(&self) -> String {
        format!("http://{}:{}/wallet/{}", self.host, self.port, self.wallet)
    }
}

/// Wallet backend bound to a Bitcoin Core node
pub struct CoreWalletClient {
    client: Client,
}

fn rpc_err(err: bitcoincore_rpc::Error) -> WalletError {
    WalletError::Rpc(err.to_string())
}

fn sats_from_btc(btc: f64) -> Result<u64, WalletError> {
    Amount::from_btc(btc)
        .map(|a| a.to_sat())
        .map_err(|e| WalletError::InvalidAmount(e.to_string()))
}

/// Exact decimal BTC string for a satoshi amount, avoiding float rounding
fn btc_string(sats: u64) -> String {
    format!("{}.{:08}", sats / 100_000_000, sats % 100_000_000)
}

impl CoreWalletClient {
    pub fn connect(config: &CoreRpcConfig) -> Result<Self, WalletError> {
        let auth = Auth::UserPass(config.user.clone(), config.password.clone());
        let client = Client::new(&config.url(), auth).map_err(rpc_err)?;
        Ok(Self { client })
    }

    fn parse_unspent(entry: &Value) -> Result<Unspent, WalletError> {
        let txid = entry["txid"]
            .as_str()
            .ok_or_else(|| WalletError::MalformedResponse("listunspent: missing txid".into()))?
            .to_string();
        let vout = entry["vout"]
            .as_u64()
            .ok_or_else(|| WalletError::MalformedResponse("listunspent: missing vout".into()))?
            as u32;
        let amount = entry["amount"]
            .as_f64()
            .ok_or_else(|| WalletError::MalformedResponse("listunspent: missing amount".into()))?;
        // Outputs without an address (e.g. non-standard scripts) still list;
        // they can never belong to a labelled account
        let address = entry["address"].as_str().unwrap_or_default().to_string();
        let confirmations = entry["confirmations"].as_u64().unwrap_or(0) as u32;
        Ok(Unspent {
            txid,
            vout,
            address,
            amount_sats: sats_from_btc(amount)?,
            confirmations,
        })
    }
}

#[async_trait]
impl WalletBackend for CoreWalletClient {
    async fn new_address(&self, label: &str) -> Result<String, WalletError> {
        self.client
            .call::<String>("getnewaddress", &[label.into()])
            .map_err(rpc_err)
    }

    async fn address_labels(&self, address: &str) -> Result<Vec<String>, WalletError> {
        let info = self
            .client
            .call::<Value>("getaddressinfo", &[address.into()])
            .map_err(rpc_err)?;
        let labels = match info["labels"].as_array() {
            Some(items) => items
                .iter()
                .filter_map(|item| {
                    // Modern Core returns plain strings; pre-0.21 returned
                    // {"name": ..., "purpose": ...} objects
                    item.as_str()
                        .map(str::to_string)
                        .or_else(|| item["name"].as_str().map(str::to_string))
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(labels)
    }

    async fn list_unspent(
        &self,
        min_conf: u32,
        max_conf: u32,
        addresses: Option<&[String]>,
    ) -> Result<Vec<Unspent>, WalletError> {
        let addrs: Vec<String> = addresses.map(|a| a.to_vec()).unwrap_or_default();
        let entries = self
            .client
            .call::<Vec<Value>>(
                "listunspent",
                &[min_conf.into(), max_conf.into(), json!(addrs)],
            )
            .map_err(rpc_err)?;
        entries.iter().map(Self::parse_unspent).collect()
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[(String, u64)],
    ) -> Result<String, WalletError> {
        let inputs_json: Vec<Value> = inputs
            .iter()
            .map(|input| json!({ "txid": input.txid, "vout": input.vout }))
            .collect();
        let mut outputs_json = serde_json::Map::new();
        for (address, sats) in outputs {
            outputs_json.insert(address.clone(), json!(btc_string(*sats)));
        }
        self.client
            .call::<String>(
                "createrawtransaction",
                &[json!(inputs_json), Value::Object(outputs_json)],
            )
            .map_err(rpc_err)
    }

    async fn decoded_vsize(&self, hex: &str) -> Result<u64, WalletError> {
        let decoded = self
            .client
            .call::<Value>("decoderawtransaction", &[hex.into()])
            .map_err(rpc_err)?;
        decoded["vsize"]
            .as_u64()
            .ok_or_else(|| WalletError::MalformedResponse("decoderawtransaction: missing vsize".into()))
    }

    async fn sign_raw_transaction(&self, hex: &str) -> Result<String, WalletError> {
        let signed = self
            .client
            .call::<Value>("signrawtransactionwithwallet", &[hex.into()])
            .map_err(rpc_err)?;
        if signed["complete"].as_bool() != Some(true) {
            return Err(WalletError::IncompleteSignature);
        }
        signed["hex"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::MalformedResponse("signrawtransactionwithwallet: missing hex".into()))
    }

    async fn broadcast(&self, hex: &str) -> Result<String, WalletError> {
        self.client
            .call::<String>("sendrawtransaction", &[hex.into()])
            .map_err(|e| WalletError::BroadcastRejected(e.to_string()))
    }

    async fn send(
        &self,
        address: &str,
        amount_sats: u64,
        sat_per_vbyte: Option<u64>,
    ) -> Result<String, WalletError> {
        let mut destination = serde_json::Map::new();
        destination.insert(address.to_string(), json!(btc_string(amount_sats)));
        let outputs = Value::Array(vec![Value::Object(destination)]);
        let fee_rate = match sat_per_vbyte {
            Some(rate) => json!(rate),
            None => Value::Null,
        };
        let result = self
            .client
            .call::<Value>("send", &[outputs, Value::Null, Value::Null, fee_rate])
            .map_err(rpc_err)?;
        result["txid"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::MalformedResponse("send: missing txid".into()))
    }

    async fn chain_status(&self) -> Result<ChainStatus, WalletError> {
        let chain = self
            .client
            .call::<Value>("getblockchaininfo", &[])
            .map_err(rpc_err)?;
        let mempool = self
            .client
            .call::<Value>("getmempoolinfo", &[])
            .map_err(rpc_err)?;
        Ok(ChainStatus {
            network: chain["chain"].as_str().unwrap_or("unknown").to_string(),
            height: chain["blocks"].as_u64().unwrap_or(0),
            difficulty: chain["difficulty"].as_f64().unwrap_or(0.0),
            mempool_txs: mempool["size"].as_u64().unwrap_or(0),
        })
    }
}
