use serde::Deserialize;
use transit_shared::Masked;

use crate::{CoreError, CoreResult};

/// Delivered by the payment collaborator once a transaction settles.
/// May arrive more than once for the same reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfirmation {
    pub transaction_reference: String,
    pub customer_reference: Masked<String>,
}

impl PaymentConfirmation {
    pub fn new(transaction_reference: impl Into<String>, customer_reference: impl Into<String>) -> Self {
        Self {
            transaction_reference: transaction_reference.into(),
            customer_reference: Masked::new(customer_reference.into()),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.transaction_reference.trim().is_empty() {
            return Err(CoreError::InvalidArgument("transaction_reference is required".into()));
        }
        if self.customer_reference.expose().trim().is_empty() {
            return Err(CoreError::InvalidArgument("customer_reference is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_fields() {
        let json = r#"{"transaction_reference":"txn-1","customer_reference":"cus_1","amount":10}"#;
        assert!(serde_json::from_str::<PaymentConfirmation>(json).is_err());

        let json = r#"{"transaction_reference":"txn-1","customer_reference":"cus_1"}"#;
        let confirmation: PaymentConfirmation = serde_json::from_str(json).unwrap();
        assert!(confirmation.validate().is_ok());
        assert_eq!(format!("{:?}", confirmation.customer_reference), "********");
    }

    #[test]
    fn test_blank_reference_is_invalid() {
        let err = PaymentConfirmation::new("  ", "cus_1").validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }
}
