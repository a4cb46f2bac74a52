use pallas_addresses::ShelleyAddress;
use pallas_crypto::hash::Hash;

use crate::chain::ChainBackend;
use crate::config::MarketConfig;
use crate::contract::MarketplaceValidator;
use crate::datum::Payout;
use crate::deployment::{DeploymentStore, ScriptDeploymentRecord};
use crate::error::{Error, Result};
use crate::fee::required_buy_funding;
use crate::network::Network;
use crate::ops::{
    BuyDraft, BuyParams, DeployParams, ListParams, ListingSpend, UpdateParams, WithdrawParams,
    build_buy_draft, build_buy_with_auth_draft, build_deploy_draft, build_list_draft,
    build_update_draft, build_withdraw_draft,
};
use crate::params::MarketplaceParameters;
use crate::selection::select_funding;
use crate::signer::TxSigner;
use crate::tx::{
    AssetName, BuildContext, BuiltTransaction, NativeScript, ProtocolParameters, TransactionDraft,
    TxOutRef, Utxo, Value, balance,
};
use crate::vm::ScriptVm;

/// Request to list a handle.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub owner_address: ShelleyAddress,
    pub handle: AssetName,
    pub payouts: Vec<Payout>,
    /// Use this deployment instead of the store's latest.
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    /// Wallet UTXOs as reported by the wallet; `None` reads the UTXOs at
    /// the change address from the chain.
    pub wallet_utxos: Option<Vec<Utxo>>,
}

/// Request to buy a listed handle.
#[derive(Debug, Clone)]
pub struct BuyRequest {
    pub buyer_address: ShelleyAddress,
    pub listing: TxOutRef,
    pub handle: AssetName,
    pub collateral: Option<TxOutRef>,
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    pub wallet_utxos: Option<Vec<Utxo>>,
}

/// Request to replace a listing's payouts.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub owner_address: ShelleyAddress,
    pub listing: TxOutRef,
    pub handle: AssetName,
    pub new_payouts: Vec<Payout>,
    pub collateral: Option<TxOutRef>,
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    pub wallet_utxos: Option<Vec<Utxo>>,
}

/// Request to take a handle off the market.
#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub owner_address: ShelleyAddress,
    pub listing: TxOutRef,
    pub handle: AssetName,
    pub collateral: Option<TxOutRef>,
    pub custom_deployment: Option<ScriptDeploymentRecord>,
    pub wallet_utxos: Option<Vec<Utxo>>,
}

/// Unapplied validator programs and the parameters to apply.
#[derive(Debug, Clone)]
pub struct ContractRequest {
    /// Handle that will mark the deployment output.
    pub handle: String,
    pub program: Vec<u8>,
    /// Trace-preserving build of `program`.
    pub debug_program: Vec<u8>,
    pub parameters: MarketplaceParameters,
}

/// Request to publish the validator on-chain.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub owner_address: ShelleyAddress,
    pub contract: ContractRequest,
    pub wallet_utxos: Option<Vec<Utxo>>,
}

/// Result of a successful buy build.
#[derive(Debug, Clone)]
pub struct BuyResult {
    pub tx: BuiltTransaction,
    pub total_payout: u64,
    pub marketplace_fee: u64,
}

/// A balanced, unsigned deploy transaction.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub tx: BuiltTransaction,
    pub validator: MarketplaceValidator,
    pub locker_script: NativeScript,
    pub locker_address: ShelleyAddress,
}

/// Result of a confirmed deploy.
#[derive(Debug, Clone)]
pub struct DeployResult {
    pub tx_hash: Hash<32>,
    pub record: ScriptDeploymentRecord,
    pub locker_address: ShelleyAddress,
}

/// Marketplace transaction engine over a chain backend, a script VM and a
/// deployment store.
///
/// Every call refetches protocol parameters, wallet UTXOs and the deployment
/// record; nothing is cached between operations.
pub struct MarketplaceSdk<C, V, S> {
    network: Network,
    config: MarketConfig,
    chain: C,
    vm: V,
    store: S,
}

impl<C: ChainBackend, V: ScriptVm, S: DeploymentStore> MarketplaceSdk<C, V, S> {
    pub fn new(network: Network, config: MarketConfig, chain: C, vm: V, store: S) -> Self {
        Self {
            network,
            config,
            chain,
            vm,
            store,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Listing ──────────────────────────────────────────────────────────

    /// Lock a handle at the marketplace validator.
    pub fn list(&self, request: &ListRequest) -> Result<BuiltTransaction> {
        let validator = self.load_validator(request.custom_deployment.as_ref())?;
        let protocol = self.chain.protocol_parameters()?;
        let wallet = self.wallet(request.wallet_utxos.as_deref(), &request.owner_address)?;

        let draft = build_list_draft(
            &validator,
            &ListParams {
                owner_address: request.owner_address.clone(),
                wallet_utxos: wallet.clone(),
                policy: self.config.handle_policy_id,
                handle: request.handle.clone(),
                payouts: request.payouts.clone(),
            },
        )?;
        self.balance(&draft, &wallet, &protocol, &validator)
    }

    // ── Buying ───────────────────────────────────────────────────────────

    /// Buy a listed handle, paying the marketplace fee.
    pub fn buy(&self, request: &BuyRequest) -> Result<BuyResult> {
        let validator = self.load_validator(request.custom_deployment.as_ref())?;
        let params = self.buy_params(&validator, request)?;
        let buy = build_buy_draft(&validator, &params)?;
        self.fund_buy(&validator, buy, request)
    }

    /// Buy a listed handle under an authorizer's signature; no marketplace fee.
    pub fn buy_with_authorizer(&self, request: &BuyRequest, authorizer: &str) -> Result<BuyResult> {
        let validator = self.load_validator(request.custom_deployment.as_ref())?;
        // Membership is checked before any chain lookup.
        if !validator.parameters().is_authorizer(authorizer) {
            return Err(Error::precondition(format!(
                "{authorizer} is not a marketplace authorizer"
            )));
        }
        let params = self.buy_params(&validator, request)?;
        let buy = build_buy_with_auth_draft(&validator, &params, authorizer)?;
        self.fund_buy(&validator, buy, request)
    }

    fn buy_params(
        &self,
        validator: &MarketplaceValidator,
        request: &BuyRequest,
    ) -> Result<BuyParams> {
        Ok(BuyParams {
            buyer_address: request.buyer_address.clone(),
            spend: self.listing_spend(
                validator,
                &request.listing,
                &request.handle,
                request.collateral.as_ref(),
            )?,
        })
    }

    fn fund_buy(
        &self,
        validator: &MarketplaceValidator,
        buy: BuyDraft,
        request: &BuyRequest,
    ) -> Result<BuyResult> {
        let protocol = self.chain.protocol_parameters()?;
        let wallet = self.wallet(request.wallet_utxos.as_deref(), &request.buyer_address)?;
        let required = required_buy_funding(buy.total_payout, buy.marketplace_fee)?;
        let (selected, rest) = select_funding(&wallet, &Value::lovelace(required))?;

        let mut draft = buy.draft;
        for utxo in selected {
            draft.add_input(utxo);
        }
        let tx = self.balance(&draft, &rest, &protocol, validator)?;
        Ok(BuyResult {
            tx,
            total_payout: buy.total_payout,
            marketplace_fee: buy.marketplace_fee,
        })
    }

    // ── Owner actions ────────────────────────────────────────────────────

    /// Replace a listing's payouts. Only its owner may do this.
    pub fn update(&self, request: &UpdateRequest) -> Result<BuiltTransaction> {
        let validator = self.load_validator(request.custom_deployment.as_ref())?;
        let spend = self.listing_spend(
            &validator,
            &request.listing,
            &request.handle,
            request.collateral.as_ref(),
        )?;
        let draft = build_update_draft(
            &validator,
            &UpdateParams {
                owner_address: request.owner_address.clone(),
                spend,
                new_payouts: request.new_payouts.clone(),
            },
        )?;
        let protocol = self.chain.protocol_parameters()?;
        let wallet = self.wallet(request.wallet_utxos.as_deref(), &request.owner_address)?;
        self.balance(&draft, &wallet, &protocol, &validator)
    }

    /// Return a listed handle to its owner.
    pub fn withdraw(&self, request: &WithdrawRequest) -> Result<BuiltTransaction> {
        let validator = self.load_validator(request.custom_deployment.as_ref())?;
        let spend = self.listing_spend(
            &validator,
            &request.listing,
            &request.handle,
            request.collateral.as_ref(),
        )?;
        let draft = build_withdraw_draft(
            &validator,
            &WithdrawParams {
                owner_address: request.owner_address.clone(),
                spend,
            },
        )?;
        let protocol = self.chain.protocol_parameters()?;
        let wallet = self.wallet(request.wallet_utxos.as_deref(), &request.owner_address)?;
        self.balance(&draft, &wallet, &protocol, &validator)
    }

    // ── Deployment ───────────────────────────────────────────────────────

    /// Apply parameters and describe the resulting validator without
    /// touching the chain.
    pub fn build_contract(&self, request: &ContractRequest) -> Result<ScriptDeploymentRecord> {
        let validator = self.compile(request)?;
        log::info!(
            "built marketplace validator {} ({} bytes)",
            validator.hash(),
            validator.program().len()
        );
        Ok(validator.to_record(&request.handle, None))
    }

    /// Build the unsigned deploy transaction, time-locked from `now_ms`.
    pub fn build_deploy(&self, request: &DeployRequest, now_ms: u64) -> Result<DeployPlan> {
        let validator = self.compile(&request.contract)?;
        let protocol = self.chain.protocol_parameters()?;
        let wallet = self.wallet(request.wallet_utxos.as_deref(), &request.owner_address)?;

        let deploy = build_deploy_draft(
            &validator,
            &DeployParams {
                owner_address: request.owner_address.clone(),
                wallet_utxos: wallet.clone(),
                policy: self.config.handle_policy_id,
                handle: request.contract.handle.clone(),
                valid_from_slot: self.network.slot_config().slot_at(now_ms),
            },
        )?;
        let tx = self.balance(&deploy.draft, &wallet, &protocol, &validator)?;
        Ok(DeployPlan {
            tx,
            validator,
            locker_script: deploy.locker_script,
            locker_address: deploy.locker_address,
        })
    }

    /// Build, sign and submit the deploy, wait for output 0 to appear and
    /// persist the deployment record.
    pub fn deploy(
        &self,
        request: &DeployRequest,
        signer: &dyn TxSigner,
        now_ms: u64,
    ) -> Result<DeployResult> {
        let plan = self.build_deploy(request, now_ms)?;
        let tx_hash = self.sign_and_submit(&plan.tx, &[signer])?;

        let out_ref = TxOutRef::new(tx_hash, 0);
        log::info!("waiting for deploy output {out_ref}");
        self.wait_for_output(&out_ref)?;
        log::info!("deploy {tx_hash} confirmed, saving record");

        let record = plan
            .validator
            .to_record(&request.contract.handle, Some((out_ref, &plan.locker_address)));
        self.store.save(self.network, &record)?;
        Ok(DeployResult {
            tx_hash,
            record,
            locker_address: plan.locker_address,
        })
    }

    fn wallet(&self, supplied: Option<&[Utxo]>, change: &ShelleyAddress) -> Result<Vec<Utxo>> {
        match supplied {
            Some(utxos) => Ok(utxos.to_vec()),
            None => self.chain.utxos_at(change),
        }
    }

    fn wait_for_output(&self, out_ref: &TxOutRef) -> Result<Utxo> {
        let mut polls = 0u32;
        loop {
            match self.chain.utxo(out_ref) {
                Ok(Some(utxo)) => return Ok(utxo),
                Ok(None) => log::debug!("{out_ref} not visible yet"),
                Err(e) => log::debug!("polling {out_ref} failed: {e}"),
            }
            polls += 1;
            if self
                .config
                .max_confirmation_polls
                .is_some_and(|max| polls >= max)
            {
                return Err(Error::Chain(format!(
                    "{out_ref} not confirmed after {polls} polls"
                )));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    // ── Signing ──────────────────────────────────────────────────────────

    /// Witness `tx` with `signers` and submit it.
    ///
    /// Every key the transaction requires must be among `signers`.
    pub fn sign_and_submit(
        &self,
        tx: &BuiltTransaction,
        signers: &[&dyn TxSigner],
    ) -> Result<Hash<32>> {
        let mut witnesses = Vec::with_capacity(tx.signers.len());
        for key in &tx.signers {
            let signer = signers
                .iter()
                .find(|s| s.key_hash() == *key)
                .ok_or_else(|| Error::Signer(format!("no signer for required key {key}")))?;
            witnesses.push(signer.sign(&tx.tx_hash)?);
        }

        let submitted = self.chain.submit(&tx.with_witnesses(&witnesses))?;
        if submitted != tx.tx_hash {
            log::warn!(
                "backend reported {submitted} for transaction {}",
                tx.tx_hash
            );
        }
        log::info!("submitted {submitted}");
        Ok(submitted)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn compile(&self, request: &ContractRequest) -> Result<MarketplaceValidator> {
        MarketplaceValidator::compile(
            &self.vm,
            &request.program,
            &request.debug_program,
            request.parameters.clone(),
            self.network,
        )
    }

    fn load_validator(
        &self,
        custom: Option<&ScriptDeploymentRecord>,
    ) -> Result<MarketplaceValidator> {
        let record = match custom {
            Some(record) => record.clone(),
            None => self.store.latest(self.network)?.ok_or_else(|| {
                Error::precondition(format!(
                    "no marketplace deployment recorded for {}",
                    self.network
                ))
            })?,
        };
        MarketplaceValidator::from_record(&record, self.network)
    }

    fn fetch_utxo(&self, out_ref: &TxOutRef, what: &str) -> Result<Utxo> {
        self.chain
            .utxo(out_ref)?
            .ok_or_else(|| Error::precondition(format!("{what} {out_ref} not found on chain")))
    }

    fn listing_spend(
        &self,
        validator: &MarketplaceValidator,
        listing: &TxOutRef,
        handle: &AssetName,
        collateral: Option<&TxOutRef>,
    ) -> Result<ListingSpend> {
        let reference = self.fetch_utxo(&validator.reference()?, "deployed script UTxO")?;
        let listing = self.fetch_utxo(listing, "listing UTxO")?;
        let collateral = collateral
            .map(|c| self.fetch_utxo(c, "collateral UTxO"))
            .transpose()?;
        Ok(ListingSpend {
            listing,
            reference,
            policy: self.config.handle_policy_id,
            handle: handle.clone(),
            collateral,
        })
    }

    fn balance(
        &self,
        draft: &TransactionDraft,
        spare: &[Utxo],
        protocol: &ProtocolParameters,
        validator: &MarketplaceValidator,
    ) -> Result<BuiltTransaction> {
        let ctx = BuildContext {
            network: self.network,
            protocol,
            vm: &self.vm,
            debug_program: validator.debug_program(),
            max_iterations: self.config.max_balance_iterations,
        };
        balance(draft, spare, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::handle_asset_name;
    use crate::testing::{
        MemoryDeploymentStore, MockChain, MockVm, deployed_marketplace, key_address,
        preprod_protocol, test_config,
    };

    type TestSdk = MarketplaceSdk<MockChain, MockVm, MemoryDeploymentStore>;

    fn sdk_without_deployment() -> TestSdk {
        MarketplaceSdk::new(
            Network::Preprod,
            test_config(),
            MockChain::new(preprod_protocol()),
            MockVm::default(),
            MemoryDeploymentStore::default(),
        )
    }

    #[test]
    fn missing_deployment_is_a_precondition() {
        let sdk = sdk_without_deployment();
        let err = sdk
            .list(&ListRequest {
                owner_address: key_address(1),
                handle: handle_asset_name("mkt"),
                payouts: vec![Payout::new(key_address(10), 10_000_000)],
                custom_deployment: None,
                wallet_utxos: None,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "no marketplace deployment recorded for preprod");
    }

    #[test]
    fn custom_deployment_overrides_store() {
        let sdk = sdk_without_deployment();
        let (record, _) = deployed_marketplace(&MockVm::default());
        let validator = sdk.load_validator(Some(&record)).unwrap();
        assert_eq!(validator.hash().to_string(), record.validator_hash);
    }

    #[test]
    fn unknown_listing_is_reported() {
        let vm = MockVm::default();
        let (record, reference) = deployed_marketplace(&vm);
        let sdk = MarketplaceSdk::new(
            Network::Preprod,
            test_config(),
            MockChain::new(preprod_protocol()).with_utxos(vec![reference]),
            vm,
            MemoryDeploymentStore::with(Network::Preprod, record),
        );
        let err = sdk
            .buy(&BuyRequest {
                buyer_address: key_address(2),
                listing: TxOutRef::new(Hash::new([1; 32]), 0),
                handle: handle_asset_name("mkt"),
                collateral: None,
                custom_deployment: None,
                wallet_utxos: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(err.to_string().starts_with("listing UTxO"));
    }

    #[test]
    fn unregistered_authorizer_fails_before_lookup() {
        let vm = MockVm::default();
        let (record, _) = deployed_marketplace(&vm);
        // No reference or listing on chain: only the membership check can fail.
        let sdk = MarketplaceSdk::new(
            Network::Preprod,
            test_config(),
            MockChain::new(preprod_protocol()),
            vm,
            MemoryDeploymentStore::with(Network::Preprod, record),
        );
        let request = BuyRequest {
            buyer_address: key_address(2),
            listing: TxOutRef::new(Hash::new([1; 32]), 0),
            handle: handle_asset_name("mkt"),
            collateral: None,
            custom_deployment: None,
            wallet_utxos: None,
        };
        let err = sdk
            .buy_with_authorizer(&request, &"ab".repeat(28))
            .unwrap_err();
        assert!(err.to_string().contains("not a marketplace authorizer"));
    }
}
