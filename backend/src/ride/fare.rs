//! Fare computation

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::models::VehicleType;
use crate::ride::model::{Fare, FareBreakdown};

/// Per-class tariff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateCard {
    pub base: f64,
    pub per_km: f64,
    pub per_minute: f64,
}

impl RateCard {
    pub fn default_for(vehicle: VehicleType) -> Self {
        let (base, per_km, per_minute) = match vehicle {
            VehicleType::Standard => (50.0, 15.0, 2.0),
            VehicleType::Comfort => (70.0, 18.0, 2.5),
            VehicleType::Premium => (100.0, 25.0, 3.0),
            VehicleType::Share => (30.0, 10.0, 1.5),
        };
        Self {
            base,
            per_km,
            per_minute,
        }
    }
}

/// Deterministic fare calculator
#[derive(Debug, Clone)]
pub struct FareCalculator {
    rates: HashMap<VehicleType, RateCard>,
    surge_multiplier: f64,
    minimum_fare: f64,
    currency: String,
}

impl FareCalculator {
    pub fn new(
        rates: impl IntoIterator<Item = (VehicleType, RateCard)>,
        surge_multiplier: f64,
        minimum_fare: f64,
        currency: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if !(surge_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "surge multiplier must be at least 1.0, got {}",
                surge_multiplier
            )));
        }
        if !minimum_fare.is_finite() || minimum_fare < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "minimum fare must be non-negative, got {}",
                minimum_fare
            )));
        }

        let mut table: HashMap<VehicleType, RateCard> = VehicleType::ALL
            .iter()
            .map(|vehicle| (*vehicle, RateCard::default_for(*vehicle)))
            .collect();
        table.extend(rates);

        Ok(Self {
            rates: table,
            surge_multiplier,
            minimum_fare,
            currency: currency.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            config.fare_rates.iter().copied(),
            config.surge_multiplier,
            config.minimum_fare,
            config.fare_currency.clone(),
        )
    }

    pub fn rate_card(&self, vehicle: VehicleType) -> RateCard {
        self.rates
            .get(&vehicle)
            .copied()
            .unwrap_or_else(|| RateCard::default_for(vehicle))
    }

    /// `max(minimum, round((base + km*per_km + min*per_min) * surge))`
    pub fn fare(&self, distance_km: f64, duration_min: f64, vehicle: VehicleType) -> Fare {
        let card = self.rate_card(vehicle);
        let distance = distance_km.max(0.0) * card.per_km;
        let time = duration_min.max(0.0) * card.per_minute;

        let computed = ((card.base + distance + time) * self.surge_multiplier).round();
        let minimum_applied = computed < self.minimum_fare;
        let amount = if minimum_applied {
            self.minimum_fare
        } else {
            computed
        };

        Fare {
            amount,
            currency: self.currency.clone(),
            breakdown: FareBreakdown {
                base: card.base,
                distance: round_cents(distance),
                time: round_cents(time),
                surge_multiplier: self.surge_multiplier,
                minimum_applied,
            },
        }
    }
}

impl Default for FareCalculator {
    fn default() -> Self {
        Self {
            rates: VehicleType::ALL
                .iter()
                .map(|vehicle| (*vehicle, RateCard::default_for(*vehicle)))
                .collect(),
            surge_multiplier: 1.0,
            minimum_fare: 0.0,
            currency: "INR".to_string(),
        }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_fare_scenario() {
        let calculator = FareCalculator::default();
        let fare = calculator.fare(6.0, 18.0, VehicleType::Standard);

        assert_eq!(fare.amount, 176.0);
        assert_eq!(fare.currency, "INR");
        assert_eq!(fare.breakdown.base, 50.0);
        assert_eq!(fare.breakdown.distance, 90.0);
        assert_eq!(fare.breakdown.time, 36.0);
        assert!(!fare.breakdown.minimum_applied);
    }

    #[test]
    fn test_fare_is_deterministic() {
        let calculator = FareCalculator::default();
        let first = calculator.fare(7.3, 21.4, VehicleType::Comfort);
        let second = calculator.fare(7.3, 21.4, VehicleType::Comfort);
        assert_eq!(first, second);
        assert_eq!(first.amount, first.amount.round());
    }

    #[test]
    fn test_surge_and_minimum() {
        let calculator =
            FareCalculator::new(Vec::new(), 1.5, 300.0, "INR").unwrap();
        // 176 * 1.5 = 264, below the 300 floor
        let fare = calculator.fare(6.0, 18.0, VehicleType::Standard);
        assert_eq!(fare.amount, 300.0);
        assert!(fare.breakdown.minimum_applied);

        let fare = calculator.fare(20.0, 40.0, VehicleType::Standard);
        // (50 + 300 + 80) * 1.5 = 645
        assert_eq!(fare.amount, 645.0);
        assert_eq!(fare.breakdown.surge_multiplier, 1.5);
    }

    #[test]
    fn test_surge_below_one_is_rejected() {
        assert!(FareCalculator::new(Vec::new(), 0.9, 0.0, "INR").is_err());
        assert!(FareCalculator::new(Vec::new(), f64::NAN, 0.0, "INR").is_err());
    }

    #[test]
    fn test_rate_override() {
        let card = RateCard {
            base: 10.0,
            per_km: 1.0,
            per_minute: 0.0,
        };
        let calculator =
            FareCalculator::new(vec![(VehicleType::Share, card)], 1.0, 0.0, "USD").unwrap();
        let fare = calculator.fare(5.0, 30.0, VehicleType::Share);
        assert_eq!(fare.amount, 15.0);
        assert_eq!(fare.currency, "USD");
        // Other classes keep their defaults
        assert_eq!(
            calculator.rate_card(VehicleType::Premium),
            RateCard::default_for(VehicleType::Premium)
        );
    }
}
