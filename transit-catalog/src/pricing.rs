use serde::{Deserialize, Serialize};

use crate::inventory::InventoryError;

const BPS_DENOMINATOR: i64 = 10_000;

/// Fare components in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    pub base_fee: i64,
    pub commission: i64,
    pub total_price: i64,
}

/// Commission and refund rates, in basis points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FarePolicy {
    pub commission_bps: i64,
    pub refund_bps: i64,
}

impl Default for FarePolicy {
    fn default() -> Self {
        Self {
            commission_bps: 700,
            refund_bps: 8_500,
        }
    }
}

impl FarePolicy {
    pub fn new(commission_bps: i64, refund_bps: i64) -> Self {
        Self { commission_bps, refund_bps }
    }

    pub fn quote(&self, base_fee: i64) -> Result<Fare, InventoryError> {
        if base_fee < 0 {
            return Err(InventoryError::InvalidAmount(base_fee));
        }
        let commission = apply_bps(base_fee, self.commission_bps)
            .ok_or(InventoryError::InvalidAmount(base_fee))?;
        let total_price = base_fee
            .checked_add(commission)
            .ok_or(InventoryError::InvalidAmount(base_fee))?;
        // Refused here so refund_for never has to.
        apply_bps(base_fee, self.refund_bps).ok_or(InventoryError::InvalidAmount(base_fee))?;

        Ok(Fare {
            base_fee,
            commission,
            total_price,
        })
    }

    /// Refund owed on cancellation. Computed from the base fee only.
    pub fn refund_for(&self, fare: &Fare) -> i64 {
        apply_bps(fare.base_fee, self.refund_bps).unwrap_or(fare.base_fee)
    }
}

/// `amount * bps / 10000`, rounded half-up. `amount` is non-negative.
/// `None` when the result does not fit in an `i64`.
pub fn apply_bps(amount: i64, bps: i64) -> Option<i64> {
    let scaled = i128::from(amount) * i128::from(bps) + i128::from(BPS_DENOMINATOR / 2);
    i64::try_from(scaled / i128::from(BPS_DENOMINATOR)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_and_refund() {
        let policy = FarePolicy::default();

        let fare = policy.quote(1_000).unwrap();
        assert_eq!(fare.commission, 70);
        assert_eq!(fare.total_price, 1_070);
        assert_eq!(policy.refund_for(&fare), 850);

        // Same fee expressed in cents.
        let fare = policy.quote(100_000).unwrap();
        assert_eq!(fare.commission, 7_000);
        assert_eq!(fare.total_price, 107_000);
        assert_eq!(policy.refund_for(&fare), 85_000);
    }

    #[test]
    fn test_rounds_half_up() {
        assert_eq!(apply_bps(1_050, 700), Some(74)); // 73.5
        assert_eq!(apply_bps(1_005, 700), Some(70)); // 70.35
        assert_eq!(apply_bps(0, 700), Some(0));
    }

    #[test]
    fn test_large_fees_never_overflow() {
        let policy = FarePolicy::default();

        let fare = policy.quote(i64::MAX / 100).unwrap();
        assert_eq!(fare.commission, 6_456_360_425_798_343);
        assert_eq!(fare.total_price, 98_690_080_794_346_101);

        // Commission fits but the total does not.
        assert_eq!(
            policy.quote(i64::MAX - 10).unwrap_err(),
            InventoryError::InvalidAmount(i64::MAX - 10)
        );
        // Rates far above 100% overflow the commission itself.
        assert!(FarePolicy::new(i64::MAX, 8_500).quote(1_000_000).is_err());
        assert_eq!(apply_bps(i64::MAX, i64::MAX), None);

        // Large but representable fees still quote exactly.
        let fare = policy.quote(1_000_000_000_000).unwrap();
        assert_eq!(fare.commission, 70_000_000_000);
        assert_eq!(fare.total_price, 1_070_000_000_000);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let err = FarePolicy::default().quote(-1).unwrap_err();
        assert_eq!(err, InventoryError::InvalidAmount(-1));
    }
}
