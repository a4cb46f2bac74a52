use serde::{Deserialize, Serialize};

use super::TxOutput;
use crate::error::{Error, Result};

/// Per-output overhead in the Babbage min-UTxO formula.
const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// Reference-script fees step up every this many bytes.
const REF_SCRIPT_TIER_SIZE: u64 = 25_600;

/// Execution budget of one script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }

    pub fn saturating_add(self, other: ExUnits) -> ExUnits {
        ExUnits {
            mem: self.mem.saturating_add(other.mem),
            steps: self.steps.saturating_add(other.steps),
        }
    }
}

/// Non-negative rational used for execution prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator: denominator.max(1),
        }
    }

    /// Closest ratio with a 10^9 denominator; indexers report prices as decimals.
    pub fn from_decimal(value: f64) -> Self {
        const SCALE: u64 = 1_000_000_000;
        let numerator = (value.max(0.0) * SCALE as f64).round() as u64;
        Self::new(numerator, SCALE)
    }
}

/// The subset of ledger protocol parameters transaction building needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub max_tx_size: u64,
    pub coins_per_utxo_byte: u64,
    pub price_mem: Ratio,
    pub price_step: Ratio,
    pub max_tx_ex_units: ExUnits,
    pub collateral_percentage: u64,
    pub max_collateral_inputs: u64,
    pub min_fee_ref_script_cost_per_byte: u64,
    pub plutus_v2_cost_model: Vec<i64>,
}

impl ProtocolParameters {
    /// Minimum lovelace an output must carry:
    ///
    /// ```text
    /// (160 + |serialised output|) * coins_per_utxo_byte
    /// ```
    pub fn min_lovelace(&self, output: &TxOutput) -> u64 {
        let size = output.to_cbor().len() as u64;
        (UTXO_ENTRY_OVERHEAD + size).saturating_mul(self.coins_per_utxo_byte)
    }

    /// Raise the output's lovelace to its minimum. Raising lovelace can grow
    /// the encoding, so iterate until stable.
    pub fn with_min_lovelace(&self, output: &TxOutput) -> TxOutput {
        let mut corrected = output.clone();
        loop {
            let min = self.min_lovelace(&corrected);
            if corrected.value.lovelace >= min {
                return corrected;
            }
            corrected.value.lovelace = min;
        }
    }

    /// `min_fee_a * size + min_fee_b`
    pub fn size_fee(&self, tx_size: u64) -> Result<u64> {
        self.min_fee_a
            .checked_mul(tx_size)
            .and_then(|v| v.checked_add(self.min_fee_b))
            .ok_or(Error::Overflow)
    }

    /// `ceil(price_mem * mem + price_step * steps)`
    pub fn execution_fee(&self, units: ExUnits) -> u64 {
        let pm = self.price_mem;
        let ps = self.price_step;
        let num = u128::from(units.mem) * u128::from(pm.numerator) * u128::from(ps.denominator)
            + u128::from(units.steps) * u128::from(ps.numerator) * u128::from(pm.denominator);
        let den = u128::from(pm.denominator) * u128::from(ps.denominator);
        u64::try_from(num.div_ceil(den)).unwrap_or(u64::MAX)
    }

    /// Conway reference-script fee: each 25 KiB tier costs 1.2x the previous.
    pub fn reference_script_fee(&self, total_bytes: u64) -> u64 {
        if total_bytes == 0 || self.min_fee_ref_script_cost_per_byte == 0 {
            return 0;
        }
        let tiers = total_bytes.div_ceil(REF_SCRIPT_TIER_SIZE) as u32;
        // Scale every tier by 5^(tiers-1) so 1.2^k = 6^k / 5^k stays integral.
        let mut scaled: u128 = 0;
        let mut remaining = total_bytes;
        for k in 0..tiers {
            let chunk = remaining.min(REF_SCRIPT_TIER_SIZE);
            remaining -= chunk;
            scaled += u128::from(chunk)
                * u128::from(self.min_fee_ref_script_cost_per_byte)
                * 6u128.pow(k)
                * 5u128.pow(tiers - 1 - k);
        }
        u64::try_from(scaled / 5u128.pow(tiers - 1)).unwrap_or(u64::MAX)
    }

    /// Collateral the ledger demands for a fee.
    pub fn required_collateral(&self, fee: u64) -> u64 {
        let scaled = u128::from(fee) * u128::from(self.collateral_percentage);
        u64::try_from(scaled.div_ceil(100)).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::tx::Value;
    use pallas_addresses::{ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};
    use pallas_crypto::hash::Hash;

    fn preprod_params() -> ProtocolParameters {
        ProtocolParameters {
            min_fee_a: 44,
            min_fee_b: 155_381,
            max_tx_size: 16_384,
            coins_per_utxo_byte: 4_310,
            price_mem: Ratio::new(577, 10_000),
            price_step: Ratio::new(721, 10_000_000),
            max_tx_ex_units: ExUnits::new(14_000_000, 10_000_000_000),
            collateral_percentage: 150,
            max_collateral_inputs: 3,
            min_fee_ref_script_cost_per_byte: 15,
            plutus_v2_cost_model: vec![0; 175],
        }
    }

    fn output(value: Value) -> TxOutput {
        TxOutput::new(
            &ShelleyAddress::new(
                Network::Preprod.address_network(),
                ShelleyPaymentPart::Key(Hash::new([1; 28])),
                ShelleyDelegationPart::Key(Hash::new([2; 28])),
            ),
            value,
        )
    }

    #[test]
    fn min_lovelace_follows_babbage_formula() {
        let params = preprod_params();
        let out = params.with_min_lovelace(&output(Value::lovelace(0)));
        let expected = (160 + out.to_cbor().len() as u64) * 4_310;
        assert_eq!(out.value.lovelace, expected);
        assert!(out.value.lovelace >= params.min_lovelace(&out));
    }

    #[test]
    fn min_lovelace_grows_with_assets() {
        let params = preprod_params();
        let plain = params.with_min_lovelace(&output(Value::lovelace(0)));
        let token = params.with_min_lovelace(&output(Value::token(
            Hash::new([3; 28]),
            b"some-handle".to_vec(),
            1,
        )));
        assert!(token.value.lovelace > plain.value.lovelace);
    }

    #[test]
    fn outputs_above_minimum_are_untouched() {
        let params = preprod_params();
        let out = output(Value::lovelace(50_000_000));
        assert_eq!(params.with_min_lovelace(&out), out);
    }

    #[test]
    fn execution_fee_rounds_up() {
        let params = preprod_params();
        // 1000 * 0.0577 + 1_000_000 * 0.0000721 = 57.7 + 72.1 = 129.8
        assert_eq!(params.execution_fee(ExUnits::new(1_000, 1_000_000)), 130);
        assert_eq!(params.execution_fee(ExUnits::default()), 0);
    }

    #[test]
    fn reference_script_fee_tiers() {
        let params = preprod_params();
        assert_eq!(params.reference_script_fee(0), 0);
        assert_eq!(params.reference_script_fee(1_000), 15_000);
        // 25_600 * 15 + 400 * 18
        assert_eq!(params.reference_script_fee(26_000), 384_000 + 7_200);
    }

    #[test]
    fn collateral_rounds_up() {
        let params = preprod_params();
        assert_eq!(params.required_collateral(200_001), 300_002);
        assert_eq!(params.required_collateral(1), 2);
    }

    #[test]
    fn ratio_from_decimal() {
        assert_eq!(Ratio::from_decimal(0.0577), Ratio::new(57_700_000, 1_000_000_000));
    }
}
