use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::domain::quote::{Quote, QuoteLine};
use crate::domain::request::{ServiceType, UrgencyLevel};

/// Price schedule for the catalog. Carried as a value so deployments can
/// supply their own table; `Default` holds the documented standard rates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingTable {
    base_prices: BTreeMap<ServiceType, Decimal>,
    routine_factor: Decimal,
    urgent_factor: Decimal,
    emergency_factor: Decimal,
    /// (minimum distinct services, discount rate), ascending. Rates must be
    /// non-decreasing in the service count.
    discount_steps: Vec<(usize, Decimal)>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let base_prices = [
            (ServiceType::AcRepair, Decimal::new(22_500, 2)),
            (ServiceType::HeatingRepair, Decimal::new(25_000, 2)),
            (ServiceType::PlumbingRepair, Decimal::new(17_500, 2)),
            (ServiceType::ElectricalRepair, Decimal::new(30_000, 2)),
            (ServiceType::ThermostatInstall, Decimal::new(20_000, 2)),
            (ServiceType::FilterReplacement, Decimal::new(2_500, 2)),
            (ServiceType::DuctCleaning, Decimal::new(30_000, 2)),
            (ServiceType::MaintenancePlan, Decimal::new(15_000, 2)),
            (ServiceType::GeneralService, Decimal::new(9_500, 2)),
        ]
        .into_iter()
        .collect();

        Self {
            base_prices,
            routine_factor: Decimal::new(100, 2),
            urgent_factor: Decimal::new(115, 2),
            emergency_factor: Decimal::new(135, 2),
            discount_steps: vec![
                (1, Decimal::ZERO),
                (2, Decimal::new(15, 2)),
                (3, Decimal::new(20, 2)),
            ],
        }
    }
}

impl PricingTable {
    pub fn new(
        base_prices: BTreeMap<ServiceType, Decimal>,
        urgency_factors: (Decimal, Decimal, Decimal),
        discount_steps: Vec<(usize, Decimal)>,
    ) -> Self {
        let (routine_factor, urgent_factor, emergency_factor) = urgency_factors;
        Self { base_prices, routine_factor, urgent_factor, emergency_factor, discount_steps }
    }

    pub fn base_price(&self, service: ServiceType) -> Decimal {
        self.base_prices
            .get(&service)
            .copied()
            .unwrap_or_else(|| self.base_prices[&ServiceType::GeneralService])
    }

    pub fn urgency_factor(&self, urgency: UrgencyLevel) -> Decimal {
        match urgency {
            UrgencyLevel::Routine => self.routine_factor,
            UrgencyLevel::Urgent => self.urgent_factor,
            UrgencyLevel::Emergency => self.emergency_factor,
        }
    }

    /// Bundle discount as a step function of the number of distinct
    /// services: the highest step whose threshold the count reaches.
    pub fn discount_rate(&self, distinct_services: usize) -> Decimal {
        self.discount_steps
            .iter()
            .take_while(|(threshold, _)| *threshold <= distinct_services)
            .map(|(_, rate)| *rate)
            .last()
            .unwrap_or(Decimal::ZERO)
    }
}

pub trait PricingEngine: Send + Sync {
    fn quote(&self, service_types: &BTreeSet<ServiceType>, urgency: UrgencyLevel) -> Quote;
}

#[derive(Clone, Debug, Default)]
pub struct DeterministicPricingEngine {
    table: PricingTable,
}

impl DeterministicPricingEngine {
    pub fn new(table: PricingTable) -> Self {
        Self { table }
    }
}

impl PricingEngine for DeterministicPricingEngine {
    /// Pure: the full quote is derived from the complete service set on
    /// every call. The urgency factor applies per line; the bundle discount
    /// applies to the post-surcharge subtotal.
    fn quote(&self, service_types: &BTreeSet<ServiceType>, urgency: UrgencyLevel) -> Quote {
        let factor = self.table.urgency_factor(urgency);

        let lines: Vec<QuoteLine> = service_types
            .iter()
            .map(|&service| {
                let base_price = self.table.base_price(service);
                QuoteLine {
                    service,
                    base_price,
                    adjusted_price: (base_price * factor).round_dp(2),
                }
            })
            .collect();

        let subtotal: Decimal = lines.iter().map(|line| line.adjusted_price).sum();
        let discount_rate = self.table.discount_rate(service_types.len());
        let discount_total = (subtotal * discount_rate).round_dp(2);
        let total = subtotal - discount_total;

        Quote { lines, urgency, subtotal, discount_rate, discount_total, total }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::{DeterministicPricingEngine, PricingEngine, PricingTable};
    use crate::domain::request::{ServiceType, UrgencyLevel};

    fn services(list: &[ServiceType]) -> BTreeSet<ServiceType> {
        list.iter().copied().collect()
    }

    #[test]
    fn quote_is_pure_for_identical_inputs() {
        let engine = DeterministicPricingEngine::default();
        let set = services(&[ServiceType::AcRepair, ServiceType::ThermostatInstall]);

        let first = engine.quote(&set, UrgencyLevel::Urgent);
        let second = engine.quote(&set, UrgencyLevel::Urgent);
        assert_eq!(first, second);
    }

    #[test]
    fn single_service_gets_no_bundle_discount() {
        let engine = DeterministicPricingEngine::default();
        let quote = engine.quote(&services(&[ServiceType::AcRepair]), UrgencyLevel::Routine);

        assert_eq!(quote.discount_rate, Decimal::ZERO);
        assert_eq!(quote.total, Decimal::new(22_500, 2));
    }

    #[test]
    fn discount_rate_is_monotone_in_service_count() {
        let table = PricingTable::default();
        let mut previous = Decimal::MIN;
        for count in 1..=6 {
            let rate = table.discount_rate(count);
            assert!(rate >= previous, "rate decreased at count {count}");
            previous = rate;
        }
    }

    #[test]
    fn bundle_total_beats_sum_of_independent_quotes() {
        let engine = DeterministicPricingEngine::default();
        let bundle = engine.quote(
            &services(&[ServiceType::AcRepair, ServiceType::ThermostatInstall]),
            UrgencyLevel::Urgent,
        );
        let ac = engine.quote(&services(&[ServiceType::AcRepair]), UrgencyLevel::Urgent);
        let thermostat =
            engine.quote(&services(&[ServiceType::ThermostatInstall]), UrgencyLevel::Urgent);

        assert!(bundle.total < ac.total + thermostat.total);
        assert_eq!(bundle.discount_rate, Decimal::new(15, 2));
        assert!(bundle.savings() > Decimal::ZERO);
    }

    #[test]
    fn urgency_factor_raises_the_total() {
        let engine = DeterministicPricingEngine::default();
        let set = services(&[ServiceType::HeatingRepair]);

        let routine = engine.quote(&set, UrgencyLevel::Routine);
        let urgent = engine.quote(&set, UrgencyLevel::Urgent);
        let emergency = engine.quote(&set, UrgencyLevel::Emergency);

        assert!(routine.total < urgent.total);
        assert!(urgent.total < emergency.total);
        assert_eq!(emergency.total, Decimal::new(33_750, 2));
    }

    #[test]
    fn three_or_more_services_reach_the_top_discount_step() {
        let engine = DeterministicPricingEngine::default();
        let quote = engine.quote(
            &services(&[
                ServiceType::AcRepair,
                ServiceType::ThermostatInstall,
                ServiceType::DuctCleaning,
            ]),
            UrgencyLevel::Routine,
        );

        assert_eq!(quote.discount_rate, Decimal::new(20, 2));
        let expected_subtotal = Decimal::new(22_500 + 20_000 + 30_000, 2);
        assert_eq!(quote.subtotal, expected_subtotal);
        assert_eq!(quote.total, expected_subtotal - quote.discount_total);
    }
}
