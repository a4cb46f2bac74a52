use handle_market_sdk::pallas_addresses::ShelleyAddress;
use handle_market_sdk::{
    BuiltTransaction, BuyRequest, BuyResult, ChainBackend, ContractRequest, DeployRequest,
    DeploymentStore, KeySigner, ListRequest, Network, Payout, ScriptDeploymentRecord, ScriptVm,
    TxOutRef, UpdateRequest, Utxo, WithdrawRequest, ada_to_lovelace, handle_asset_name, parse_address,
    to_bech32,
};
use serde::{Deserialize, Serialize};

use crate::app::MarketplaceApp;
use crate::error::AppError;

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Bech32 payment address.
    pub address: String,
    /// Decimal ADA, e.g. `"12.5"`.
    pub ada: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListHandleRequest {
    pub change_address: String,
    /// Handle name, with or without the leading `$`.
    pub handle: String,
    pub payouts: Vec<PayoutRequest>,
    #[serde(default)]
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    /// Wallet UTXOs as `[input, output]` CBOR hex (CIP-30 `getUtxos`).
    /// Empty means the UTXOs at `change_address`.
    #[serde(default)]
    pub cbor_utxos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyHandleRequest {
    pub change_address: String,
    pub handle: String,
    /// `<tx hash>#<index>` of the listing.
    pub listing_utxo: String,
    #[serde(default)]
    pub collateral_utxo: Option<String>,
    #[serde(default)]
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    #[serde(default)]
    pub cbor_utxos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyHandleWithAuthRequest {
    #[serde(flatten)]
    pub buy: BuyHandleRequest,
    /// Authorizer payment key hash (hex).
    pub authorizer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateListingRequest {
    pub change_address: String,
    pub handle: String,
    pub listing_utxo: String,
    pub new_payouts: Vec<PayoutRequest>,
    #[serde(default)]
    pub collateral_utxo: Option<String>,
    #[serde(default)]
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    #[serde(default)]
    pub cbor_utxos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawListingRequest {
    pub change_address: String,
    pub handle: String,
    pub listing_utxo: String,
    #[serde(default)]
    pub collateral_utxo: Option<String>,
    #[serde(default)]
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    #[serde(default)]
    pub cbor_utxos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildContractRequest {
    /// Handle that will mark the deployment output.
    pub handle: String,
    /// Unapplied optimized validator (CBOR hex).
    pub cbor_hex: String,
    /// Unapplied trace-preserving validator (CBOR hex).
    pub unoptimized_cbor_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployContractRequest {
    pub change_address: String,
    #[serde(flatten)]
    pub contract: BuildContractRequest,
    /// Payment signing key of `change_address` (hex, optionally `5820`-prefixed).
    pub signing_key_hex: String,
    #[serde(default)]
    pub cbor_utxos: Vec<String>,
}

/// An unsigned, balanced transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub cbor_hex: String,
    pub tx_hash: String,
    /// Network fee in lovelace.
    pub fee: u64,
    pub dump: String,
}

impl From<&BuiltTransaction> for TxResponse {
    fn from(tx: &BuiltTransaction) -> Self {
        Self {
            cbor_hex: tx.tx_hex(),
            tx_hash: tx.tx_hash.to_string(),
            fee: tx.fee,
            dump: tx.dump.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyResponse {
    #[serde(flatten)]
    pub tx: TxResponse,
    pub total_payout: u64,
    pub marketplace_fee: u64,
}

impl From<BuyResult> for BuyResponse {
    fn from(result: BuyResult) -> Self {
        Self {
            tx: TxResponse::from(&result.tx),
            total_payout: result.total_payout,
            marketplace_fee: result.marketplace_fee,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub tx_hash: String,
    pub locker_address: String,
    pub record: ScriptDeploymentRecord,
}

// ============================================================================
// Request parsing
// ============================================================================

fn address(bech32: &str, network: Network) -> Result<ShelleyAddress, AppError> {
    parse_address(bech32, network)
        .map_err(|e| AppError::request(format!("address {bech32:?}: {e}")))
}

fn out_ref(value: &str) -> Result<TxOutRef, AppError> {
    value
        .parse()
        .map_err(|e| AppError::request(format!("utxo {value:?}: {e}")))
}

fn handle_name(handle: &str) -> Result<Vec<u8>, AppError> {
    let name = handle.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(AppError::request("handle must not be empty"));
    }
    Ok(handle_asset_name(name))
}

fn payouts(requests: &[PayoutRequest], network: Network) -> Result<Vec<Payout>, AppError> {
    requests
        .iter()
        .map(|p| -> Result<Payout, AppError> {
            Ok(Payout::new(
                address(&p.address, network)?,
                ada_to_lovelace(&p.ada)?,
            ))
        })
        .collect()
}

fn wallet_utxos(cbor_utxos: &[String]) -> Result<Option<Vec<Utxo>>, AppError> {
    if cbor_utxos.is_empty() {
        return Ok(None);
    }
    cbor_utxos
        .iter()
        .map(|hex| {
            Utxo::from_cbor_hex(hex.trim())
                .map_err(|e| AppError::request(format!("wallet utxo {hex:?}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn program(field: &str, cbor_hex: &str) -> Result<Vec<u8>, AppError> {
    let bytes = hex::decode(cbor_hex.trim())
        .map_err(|e| AppError::request(format!("{field}: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::request(format!("{field} must not be empty")));
    }
    Ok(bytes)
}

fn contract_request<C, V>(
    app: &MarketplaceApp<C, V>,
    request: &BuildContractRequest,
) -> Result<ContractRequest, AppError>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    Ok(ContractRequest {
        handle: request.handle.trim().trim_start_matches('$').to_string(),
        program: program("cbor_hex", &request.cbor_hex)?,
        debug_program: program("unoptimized_cbor_hex", &request.unoptimized_cbor_hex)?,
        parameters: app.config().marketplace_parameters()?,
    })
}

fn buy_request(request: &BuyHandleRequest, network: Network) -> Result<BuyRequest, AppError> {
    Ok(BuyRequest {
        buyer_address: address(&request.change_address, network)?,
        listing: out_ref(&request.listing_utxo)?,
        handle: handle_name(&request.handle)?,
        collateral: request.collateral_utxo.as_deref().map(out_ref).transpose()?,
        custom_deployment: request.custom_deployment.clone(),
        wallet_utxos: wallet_utxos(&request.cbor_utxos)?,
    })
}

// ============================================================================
// Commands
// ============================================================================

async fn list_handle_inner<C, V>(
    app: &MarketplaceApp<C, V>,
    request: ListHandleRequest,
) -> Result<TxResponse, AppError>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let network = app.network();
    let sdk_request = ListRequest {
        owner_address: address(&request.change_address, network)?,
        handle: handle_name(&request.handle)?,
        payouts: payouts(&request.payouts, network)?,
        custom_deployment: request.custom_deployment,
        wallet_utxos: wallet_utxos(&request.cbor_utxos)?,
    };
    let tx = app.with_sdk(move |sdk| sdk.list(&sdk_request)).await?;
    Ok(TxResponse::from(&tx))
}

/// Lock a handle at the marketplace with the given payouts.
pub async fn list_handle<C, V>(
    app: &MarketplaceApp<C, V>,
    request: ListHandleRequest,
) -> Result<TxResponse, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    list_handle_inner(app, request)
        .await
        .map_err(|e| e.to_string())
}

pub async fn buy_handle<C, V>(
    app: &MarketplaceApp<C, V>,
    request: BuyHandleRequest,
) -> Result<BuyResponse, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let sdk_request = buy_request(&request, app.network()).map_err(|e| e.to_string())?;
    app.with_sdk(move |sdk| sdk.buy(&sdk_request))
        .await
        .map(BuyResponse::from)
        .map_err(|e| e.to_string())
}

/// Fee-free buy co-signed by a marketplace authorizer.
pub async fn buy_handle_with_auth<C, V>(
    app: &MarketplaceApp<C, V>,
    request: BuyHandleWithAuthRequest,
) -> Result<BuyResponse, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let sdk_request = buy_request(&request.buy, app.network()).map_err(|e| e.to_string())?;
    let authorizer = request.authorizer;
    app.with_sdk(move |sdk| sdk.buy_with_authorizer(&sdk_request, &authorizer))
        .await
        .map(BuyResponse::from)
        .map_err(|e| e.to_string())
}

async fn update_listing_inner<C, V>(
    app: &MarketplaceApp<C, V>,
    request: UpdateListingRequest,
) -> Result<TxResponse, AppError>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let network = app.network();
    let sdk_request = UpdateRequest {
        owner_address: address(&request.change_address, network)?,
        listing: out_ref(&request.listing_utxo)?,
        handle: handle_name(&request.handle)?,
        new_payouts: payouts(&request.new_payouts, network)?,
        collateral: request.collateral_utxo.as_deref().map(out_ref).transpose()?,
        custom_deployment: request.custom_deployment,
        wallet_utxos: wallet_utxos(&request.cbor_utxos)?,
    };
    let tx = app.with_sdk(move |sdk| sdk.update(&sdk_request)).await?;
    Ok(TxResponse::from(&tx))
}

pub async fn update_listing<C, V>(
    app: &MarketplaceApp<C, V>,
    request: UpdateListingRequest,
) -> Result<TxResponse, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    update_listing_inner(app, request)
        .await
        .map_err(|e| e.to_string())
}

async fn withdraw_listing_inner<C, V>(
    app: &MarketplaceApp<C, V>,
    request: WithdrawListingRequest,
) -> Result<TxResponse, AppError>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let network = app.network();
    let sdk_request = WithdrawRequest {
        owner_address: address(&request.change_address, network)?,
        listing: out_ref(&request.listing_utxo)?,
        handle: handle_name(&request.handle)?,
        collateral: request.collateral_utxo.as_deref().map(out_ref).transpose()?,
        custom_deployment: request.custom_deployment,
        wallet_utxos: wallet_utxos(&request.cbor_utxos)?,
    };
    let tx = app.with_sdk(move |sdk| sdk.withdraw(&sdk_request)).await?;
    Ok(TxResponse::from(&tx))
}

pub async fn withdraw_listing<C, V>(
    app: &MarketplaceApp<C, V>,
    request: WithdrawListingRequest,
) -> Result<TxResponse, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    withdraw_listing_inner(app, request)
        .await
        .map_err(|e| e.to_string())
}

/// Apply the configured parameters to a validator without deploying it.
pub async fn build_contract<C, V>(
    app: &MarketplaceApp<C, V>,
    request: BuildContractRequest,
) -> Result<ScriptDeploymentRecord, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let contract = contract_request(app, &request).map_err(|e| e.to_string())?;
    app.with_sdk(move |sdk| sdk.build_contract(&contract))
        .await
        .map_err(|e| e.to_string())
}

async fn deploy_contract_inner<C, V>(
    app: &MarketplaceApp<C, V>,
    request: DeployContractRequest,
) -> Result<DeployResponse, AppError>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let sdk_request = DeployRequest {
        owner_address: address(&request.change_address, app.network())?,
        contract: contract_request(app, &request.contract)?,
        wallet_utxos: wallet_utxos(&request.cbor_utxos)?,
    };
    let signer = KeySigner::from_hex(&request.signing_key_hex)?;
    let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis())
        .map_err(|e| AppError::request(format!("system clock before epoch: {e}")))?;

    let deployed = app
        .with_sdk(move |sdk| sdk.deploy(&sdk_request, &signer, now_ms))
        .await?;
    Ok(DeployResponse {
        tx_hash: deployed.tx_hash.to_string(),
        locker_address: to_bech32(&deployed.locker_address),
        record: deployed.record,
    })
}

/// Publish the validator, wait for confirmation and record the deployment.
pub async fn deploy_contract<C, V>(
    app: &MarketplaceApp<C, V>,
    request: DeployContractRequest,
) -> Result<DeployResponse, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    deploy_contract_inner(app, request)
        .await
        .map_err(|e| e.to_string())
}

pub async fn latest_deployment<C, V>(
    app: &MarketplaceApp<C, V>,
) -> Result<Option<ScriptDeploymentRecord>, String>
where
    C: ChainBackend + Send + Sync + 'static,
    V: ScriptVm + Send + Sync + 'static,
{
    let network = app.network();
    app.with_sdk(move |sdk| sdk.store().latest(network))
        .await
        .map_err(|e| e.to_string())
}
