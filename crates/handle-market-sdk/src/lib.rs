pub use pallas_addresses;
pub use pallas_crypto;

pub mod address;
pub mod chain;
pub mod config;
pub mod contract;
pub mod datum;
pub mod deployment;
pub mod diagnostics;
pub mod error;
pub mod fee;
pub mod network;
pub mod ops;
pub mod params;
pub mod plutus_data;
pub mod redeemer;
pub mod script_context;
pub mod sdk;
pub mod selection;
pub mod signer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tx;
pub mod uplc_vm;
pub mod vm;

// Core types
pub use chain::{BlockfrostBackend, ChainBackend};
pub use config::{HANDLE_POLICY_ID, MarketConfig, handle_asset_name};
pub use contract::MarketplaceValidator;
pub use datum::{DatumLayout, ListingDatum, Payout};
pub use deployment::{DeploymentStore, ScriptDeploymentRecord};
pub use error::{DecodeError, Error, ErrorKind, Result, ValidationFailure};
pub use network::Network;
pub use params::MarketplaceParameters;
pub use plutus_data::{PlutusData, PlutusDataExt};
pub use redeemer::MarketAction;
pub use sdk::{
    BuyRequest, BuyResult, ContractRequest, DeployPlan, DeployRequest, DeployResult, ListRequest,
    MarketplaceSdk, UpdateRequest, WithdrawRequest,
};
pub use signer::{KeySigner, TxSigner};
pub use uplc_vm::UplcVm;
pub use vm::{EvaluationRequest, FailureContext, ProgramRun, ScriptFailure, ScriptVm};

// Codec and calculator helpers
pub use address::{Credential, parse_address, script_address, to_bech32};
pub use fee::{
    LOVELACE_PER_ADA, MIN_FEE, MIN_LOVELACE, ada_to_lovelace, marketplace_fee,
    required_buy_funding, total_payout_lovelace,
};
pub use selection::{build_datum_tag, select_collateral, select_funding};

// Ledger types
pub use tx::{
    AssetName, BuiltTransaction, ExUnits, NativeScript, PolicyId, ProtocolParameters,
    TransactionDraft, TxOutRef, TxOutput, Utxo, VKeyWitness, Value, native_script_hash,
};

// Operation builders
pub use ops::{
    BuyDraft, BuyParams, DeployDraft, DeployParams, ListParams, ListingSpend, UpdateParams,
    WithdrawParams, build_buy_draft, build_buy_with_auth_draft, build_deploy_draft,
    build_list_draft, build_update_draft, build_withdraw_draft,
};
