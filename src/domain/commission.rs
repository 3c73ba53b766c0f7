//! Transaction cost models.
//!
//! The tree asks its injected [`CommissionModel`] for the cost of every
//! non-zero trade. Costs must be finite and non-negative.

use super::error::NavtreeError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct CommissionError(pub String);

pub trait CommissionModel {
    /// Cost of trading `quantity` shares (signed) at `price`.
    fn commission(&self, quantity: i64, price: f64) -> Result<f64, CommissionError>;
}

impl<F> CommissionModel for F
where
    F: Fn(i64, f64) -> f64,
{
    fn commission(&self, quantity: i64, price: f64) -> Result<f64, CommissionError> {
        Ok(self(quantity, price))
    }
}

/// flat fee + per-share fee + percentage of notional.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionSchedule {
    pub per_trade: f64,
    pub per_share: f64,
    pub pct: f64,
}

impl CommissionSchedule {
    pub fn flat(fee: f64) -> Self {
        CommissionSchedule {
            per_trade: fee,
            per_share: 0.0,
            pct: 0.0,
        }
    }

    pub fn free() -> Self {
        CommissionSchedule::flat(0.0)
    }
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        CommissionSchedule::flat(1.0)
    }
}

impl CommissionModel for CommissionSchedule {
    fn commission(&self, quantity: i64, price: f64) -> Result<f64, CommissionError> {
        if quantity == 0 {
            return Ok(0.0);
        }
        let shares = quantity.unsigned_abs() as f64;
        Ok(self.per_trade + shares * self.per_share + shares * price.abs() * self.pct / 100.0)
    }
}

/// Runs the model and rejects failing, negative or non-finite costs.
pub(crate) fn checked_commission(
    model: &dyn CommissionModel,
    name: &str,
    quantity: i64,
    price: f64,
) -> Result<f64, NavtreeError> {
    let cost = model
        .commission(quantity, price)
        .map_err(|e| NavtreeError::InvalidCommission {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(NavtreeError::InvalidCommission {
            name: name.to_string(),
            reason: format!("cost must be finite and non-negative, got {cost}"),
        });
    }
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_is_one_per_trade() {
        let c = CommissionSchedule::default();
        assert_relative_eq!(c.commission(5, 100.0).unwrap(), 1.0);
        assert_relative_eq!(c.commission(-3, 100.0).unwrap(), 1.0);
    }

    #[test]
    fn zero_quantity_is_free() {
        let c = CommissionSchedule {
            per_trade: 10.0,
            per_share: 0.01,
            pct: 0.1,
        };
        assert_relative_eq!(c.commission(0, 100.0).unwrap(), 0.0);
    }

    #[test]
    fn schedule_combines_all_components() {
        let c = CommissionSchedule {
            per_trade: 10.0,
            per_share: 0.01,
            pct: 0.1,
        };
        // 10 + 100 * 0.01 + 100 * 50 * 0.1%
        assert_relative_eq!(c.commission(-100, 50.0).unwrap(), 16.0);
    }

    #[test]
    fn closures_are_models() {
        let per_share = |q: i64, _p: f64| q.abs() as f64 * 0.5;
        assert_relative_eq!(per_share.commission(4, 10.0).unwrap(), 2.0);
    }

    #[test]
    fn checked_rejects_negative_cost() {
        let rebate = |_q: i64, _p: f64| -1.0;
        let err = checked_commission(&rebate, "s/c1", 1, 100.0).unwrap_err();
        assert!(matches!(err, NavtreeError::InvalidCommission { name, .. } if name == "s/c1"));
    }

    #[test]
    fn checked_rejects_nan_cost() {
        let broken = |_q: i64, _p: f64| f64::NAN;
        assert!(checked_commission(&broken, "c1", 1, 100.0).is_err());
    }

    #[test]
    fn checked_reports_model_failures() {
        struct Unavailable;
        impl CommissionModel for Unavailable {
            fn commission(&self, _q: i64, _p: f64) -> Result<f64, CommissionError> {
                Err(CommissionError("fee schedule unavailable".into()))
            }
        }
        let err = checked_commission(&Unavailable, "c1", 1, 100.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid commission for c1: fee schedule unavailable"
        );
    }
}
