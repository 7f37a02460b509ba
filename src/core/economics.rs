use serde::Deserialize;

pub const DEFAULT_HOURLY_RATE: f64 = 45.; // EUR/h

/// Financial boundary conditions of the evaluation (VDI 2067).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EconomicParameters {
    /// interest factor q = 1 + i/100
    pub interest_factor: f64,
    /// price change factor r = 1 + p/100
    pub price_change_factor: f64,
    /// evaluation period T, years
    pub period_years: u32,
    /// labour cost for operation, EUR/h
    pub hourly_rate: f64,
    /// whether the BEW subsidy scheme applies to eligible generators
    pub subsidy: bool,
}

impl EconomicParameters {
    pub fn from_rates(
        interest_rate_percent: f64,
        inflation_rate_percent: f64,
        period_years: u32,
        hourly_rate: f64,
    ) -> Self {
        Self {
            interest_factor: 1. + interest_rate_percent / 100.,
            price_change_factor: 1. + inflation_rate_percent / 100.,
            period_years,
            hourly_rate,
            subsidy: false,
        }
    }

    pub fn with_subsidy(mut self, subsidy: bool) -> Self {
        self.subsidy = subsidy;
        self
    }
}

impl Default for EconomicParameters {
    fn default() -> Self {
        Self::from_rates(5., 3., 20, DEFAULT_HOURLY_RATE)
    }
}

/// Energy prices in EUR/MWh.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Prices {
    pub gas: f64,
    pub electricity: f64,
    pub wood: f64,
}

impl Default for Prices {
    fn default() -> Self {
        Self {
            gas: 70.,
            electricity: 150.,
            wood: 50.,
        }
    }
}

/// Cost parameters of one investment item for the annuity calculation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Investment {
    /// initial investment A0, EUR
    pub capital: f64,
    /// technical lifetime TN, years
    pub lifetime_years: u32,
    /// annual installation (repair) cost, % of A0
    pub installation_percent: f64,
    /// annual servicing and inspection cost, % of A0
    pub inspection_percent: f64,
    /// annual operating effort, h
    pub operating_hours: f64,
}

impl Investment {
    pub fn new(
        capital: f64,
        lifetime_years: u32,
        installation_percent: f64,
        inspection_percent: f64,
    ) -> Self {
        Self {
            capital,
            lifetime_years,
            installation_percent,
            inspection_percent,
            operating_hours: 0.,
        }
    }

    pub fn with_capital(self, capital: f64) -> Self {
        Self { capital, ..self }
    }
}

/// Annual energy flows priced into the annuity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnnualEnergy {
    /// energy bought per year, MWh
    pub demand: f64,
    /// price of the bought energy, EUR/MWh
    pub price: f64,
    /// revenue earned per year (e.g. electricity sales), EUR
    pub revenue: f64,
}

impl AnnualEnergy {
    pub fn purchased(demand: f64, price: f64) -> Self {
        Self {
            demand,
            price,
            revenue: 0.,
        }
    }

    pub fn with_revenue(mut self, revenue: f64) -> Self {
        self.revenue = revenue;
        self
    }
}

/// Net annual cost of an investment per VDI 2067, EUR/a.
///
/// Sums the capital-related annuity (with reinvestment every `TN` years inside `T` and a
/// residual-value credit for the last partial cycle), the demand-related annuity, and the
/// operation-related annuity, and subtracts the revenue annuity.
pub fn annuity(
    investment: &Investment,
    energy: &AnnualEnergy,
    parameters: &EconomicParameters,
) -> f64 {
    let q = parameters.interest_factor;
    let r = parameters.price_change_factor;
    let t = parameters.period_years;
    let tn = investment.lifetime_years;
    let a0 = investment.capital;

    let n = if t > tn { t / tn } else { 0 };

    let annuity_factor = (q - 1.) / (1. - q.powi(-(t as i32)));
    let price_dynamic_factor = (1. - (r / q).powi(t as i32)) / (q - r);

    // every replacement is priced at the last reinvestment date
    let reinvestment_years = (n * tn) as i32;
    let replacement = a0 * r.powi(reinvestment_years) / q.powi(reinvestment_years);
    let capital_with_reinvestment = a0 + n as f64 * replacement;

    let residual_value = a0
        * r.powi(reinvestment_years)
        * (((n + 1) * tn) as f64 - t as f64)
        / tn as f64
        / q.powi(t as i32);
    let capital_related = (capital_with_reinvestment - residual_value) * annuity_factor;

    let demand_related = energy.demand * energy.price * annuity_factor * price_dynamic_factor;

    let operation_related = investment.operating_hours
        * parameters.hourly_rate
        * annuity_factor
        * price_dynamic_factor
        + a0 * (investment.installation_percent + investment.inspection_percent) / 100.
            * annuity_factor
            * price_dynamic_factor;

    let revenue = energy.revenue * annuity_factor * price_dynamic_factor;

    capital_related + demand_related + operation_related - revenue
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[fixture]
    fn parameters() -> EconomicParameters {
        EconomicParameters::default()
    }

    #[rstest]
    fn should_derive_factors_from_rates(parameters: EconomicParameters) {
        assert_relative_eq!(parameters.interest_factor, 1.05);
        assert_relative_eq!(parameters.price_change_factor, 1.03);
        assert_eq!(parameters.period_years, 20);
        assert_relative_eq!(parameters.hourly_rate, 45.);
        assert!(!parameters.subsidy);
    }

    #[rstest]
    fn should_calc_annuity_without_reinvestment(parameters: EconomicParameters) {
        // gas boiler: 100 kW at 30 EUR/kW, lifetime equal to the period, 973.33 MWh gas at 70 EUR/MWh
        let investment = Investment::new(3000., 20, 1., 2.);
        let energy = AnnualEnergy::purchased(973.3333333333334, 70.);

        let a = 0.05 / (1. - 1.05f64.powi(-20));
        let b = (1. - (1.03f64 / 1.05).powi(20)) / (1.05 - 1.03);
        // no replacement, residual value is zero when T equals TN
        let expected = 3000. * a + 973.3333333333334 * 70. * a * b + 3000. * 0.03 * a * b;

        assert_relative_eq!(
            annuity(&investment, &energy, &parameters),
            expected,
            max_relative = 1e-12
        );
        assert_relative_eq!(a, 0.0802426, max_relative = 1e-6);
    }

    #[rstest]
    fn should_calc_annuity_with_reinvestment_and_residual_value(parameters: EconomicParameters) {
        // CHP: lifetime 15 years within a 20 year period, one reinvestment
        let investment = Investment::new(150_000., 15, 6., 2.);
        let energy = AnnualEnergy::purchased(1000., 70.).with_revenue(20_000.);

        let q: f64 = 1.05;
        let r: f64 = 1.03;
        let a = (q - 1.) / (1. - q.powi(-20));
        let b = (1. - (r / q).powi(20)) / (q - r);
        let replacement = 150_000. * r.powi(15) / q.powi(15);
        let residual = 150_000. * r.powi(15) * ((30. - 20.) / 15.) / q.powi(20);
        let expected = (150_000. + replacement - residual) * a
            + 1000. * 70. * a * b
            + 150_000. * 0.08 * a * b
            - 20_000. * a * b;

        assert_relative_eq!(
            annuity(&investment, &energy, &parameters),
            expected,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_use_final_reinvestment_date_for_every_replacement(parameters: EconomicParameters) {
        // three replacements of a 6 year asset in 20 years are all discounted to year 18
        let parameters = EconomicParameters {
            period_years: 20,
            ..parameters
        };
        let investment = Investment::new(1000., 6, 0., 0.);
        let q: f64 = 1.05;
        let r: f64 = 1.03;
        let a = (q - 1.) / (1. - q.powi(-20));
        let replacement = 1000. * r.powi(18) / q.powi(18);
        let residual = 1000. * r.powi(18) * ((24. - 20.) / 6.) / q.powi(20);

        assert_relative_eq!(
            annuity(&investment, &AnnualEnergy::default(), &parameters),
            (1000. + 3. * replacement - residual) * a,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_be_deterministic(parameters: EconomicParameters) {
        let investment = Investment::new(42_000., 20, 0.5, 1.);
        let energy = AnnualEnergy::purchased(120., 150.);
        assert_eq!(
            annuity(&investment, &energy, &parameters),
            annuity(&investment, &energy, &parameters)
        );
    }

    #[rstest]
    fn should_charge_operating_hours_at_hourly_rate(parameters: EconomicParameters) {
        let investment = Investment {
            operating_hours: 10.,
            ..Investment::new(0., 20, 0., 0.)
        };
        let a = 0.05 / (1. - 1.05f64.powi(-20));
        let b = (1. - (1.03f64 / 1.05).powi(20)) / (1.05 - 1.03);

        assert_relative_eq!(
            annuity(&investment, &AnnualEnergy::default(), &parameters),
            10. * 45. * a * b,
            max_relative = 1e-12
        );
    }
}
