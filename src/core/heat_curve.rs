use serde::{Deserialize, Serialize};

/// Supply and return temperatures (deg C) for one hour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowTemperatures {
    pub supply: f64,
    pub return_: f64,
}

/// Heating curve of one building: full supply temperature at and below the design outdoor
/// temperature, reduced linearly above it, with a constant spread to the return.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildingHeatCurve {
    /// maximum supply temperature, deg C
    pub max_supply_temperature: f64,
    /// return temperature at maximum supply, deg C
    pub max_return_temperature: f64,
    /// K of supply temperature reduction per K of outdoor temperature above the design point
    pub slope: f64,
    /// design (standard) outdoor temperature, deg C
    pub design_outdoor_temperature: f64,
}

impl BuildingHeatCurve {
    pub fn temperatures(&self, outdoor_temperature: f64) -> FlowTemperatures {
        let supply = if outdoor_temperature <= self.design_outdoor_temperature {
            self.max_supply_temperature
        } else {
            self.max_supply_temperature
                - self.slope * (outdoor_temperature - self.design_outdoor_temperature)
        };

        FlowTemperatures {
            supply,
            return_: supply - (self.max_supply_temperature - self.max_return_temperature),
        }
    }

    pub fn series(&self, outdoor_temperatures: &[f64]) -> Vec<FlowTemperatures> {
        outdoor_temperatures
            .iter()
            .map(|&temperature| self.temperatures(temperature))
            .collect()
    }
}

/// Network supply temperature control mode.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum NetworkSupplyCurve {
    Static {
        supply_temperature: f64,
    },
    Sliding {
        max_supply_temperature: f64,
        min_supply_temperature: f64,
        /// outdoor temperature at and below which the maximum applies
        min_air_temperature: f64,
        /// outdoor temperature at and above which the minimum applies
        max_air_temperature: f64,
    },
}

impl NetworkSupplyCurve {
    pub fn supply_temperature(&self, outdoor_temperature: f64) -> f64 {
        match *self {
            Self::Static { supply_temperature } => supply_temperature,
            Self::Sliding {
                max_supply_temperature,
                min_supply_temperature,
                min_air_temperature,
                max_air_temperature,
            } => {
                if outdoor_temperature <= min_air_temperature {
                    max_supply_temperature
                } else if outdoor_temperature >= max_air_temperature {
                    min_supply_temperature
                } else {
                    let slope = (max_supply_temperature - min_supply_temperature)
                        / (min_air_temperature - max_air_temperature);
                    max_supply_temperature + slope * (outdoor_temperature - min_air_temperature)
                }
            }
        }
    }

    pub fn series(&self, outdoor_temperatures: &[f64]) -> Vec<f64> {
        outdoor_temperatures
            .iter()
            .map(|&temperature| self.supply_temperature(temperature))
            .collect()
    }

    /// Highest supply temperature the curve can ask for.
    pub fn max_supply_temperature(&self) -> f64 {
        match *self {
            Self::Static { supply_temperature } => supply_temperature,
            Self::Sliding {
                max_supply_temperature,
                ..
            } => max_supply_temperature,
        }
    }

    /// Lowest supply temperature the curve can ask for.
    pub fn min_supply_temperature(&self) -> f64 {
        match *self {
            Self::Static { supply_temperature } => supply_temperature,
            Self::Sliding {
                min_supply_temperature,
                ..
            } => min_supply_temperature,
        }
    }
}
