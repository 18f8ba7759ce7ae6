use std::{
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};

use bon::Builder;
use serde::Deserialize;
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::quantity::{energy::WattHours, percent::Percent, power::Watts};

/// Energy manager operating mode, reported and configured as a numeric code.
///
/// Deserializes from the bare number, the string form is handled by [`BatteryStatus`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(from = "u16")]
pub enum OperatingMode {
    /// External setpoints are obeyed.
    Manual,

    /// Self-consumption optimisation by the battery itself.
    Automatic,

    ExtensionModule,
    TimeOfUse,
    Other(u16),
}

impl OperatingMode {
    pub const fn code(self) -> u16 {
        match self {
            Self::Manual => 1,
            Self::Automatic => 2,
            Self::ExtensionModule => 6,
            Self::TimeOfUse => 10,
            Self::Other(code) => code,
        }
    }
}

impl From<u16> for OperatingMode {
    fn from(code: u16) -> Self {
        match code {
            1 => Self::Manual,
            2 => Self::Automatic,
            6 => Self::ExtensionModule,
            10 => Self::TimeOfUse,
            _ => Self::Other(code),
        }
    }
}

impl FromStr for OperatingMode {
    type Err = ParseIntError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        code.trim().parse::<u16>().map(Self::from)
    }
}

impl Display for OperatingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Battery status snapshot as returned by the status endpoint.
#[serde_as]
#[derive(Clone, Debug, Builder, Deserialize)]
#[must_use]
pub struct BatteryStatus {
    #[serde(rename = "OperatingMode")]
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub operating_mode: OperatingMode,

    /// Relative state of charge within the usable range.
    #[serde(rename = "RSOC")]
    pub relative_state_of_charge: Percent,

    /// User state of charge.
    #[serde(rename = "USOC")]
    #[builder(default)]
    pub user_state_of_charge: Percent,

    /// Usable remaining capacity.
    #[serde(rename = "RemainingCapacity_Wh")]
    pub remaining_capacity: WattHours,

    /// House consumption, measured directly.
    #[serde(rename = "Consumption_W")]
    #[builder(default)]
    pub consumption: Watts,

    /// Inverter AC power: positive when discharging, negative when charging.
    #[serde(rename = "Pac_total_W")]
    #[builder(default)]
    pub ac_power: Watts,

    #[serde(rename = "BatteryDischarging")]
    #[builder(default)]
    pub is_discharging: bool,

    #[serde(rename = "BatteryCharging", default)]
    #[builder(default)]
    pub is_charging: bool,

    #[serde(rename = "Production_W", default)]
    #[builder(default)]
    pub production: Watts,

    /// Positive when feeding into the grid, negative when consuming from it.
    #[serde(rename = "GridFeedIn_W", default)]
    #[builder(default)]
    pub grid_feed_in: Watts,

    #[serde(rename = "SystemStatus", default)]
    #[builder(default)]
    pub system_status: String,

    #[serde(rename = "Timestamp", default)]
    #[builder(default)]
    pub timestamp: String,

    #[serde(rename = "Uac", default)]
    #[builder(default)]
    pub ac_voltage: f64,

    #[serde(rename = "Ubat", default)]
    #[builder(default)]
    pub battery_voltage: f64,

    #[serde(rename = "Fac", default)]
    #[builder(default)]
    pub frequency: f64,

    #[serde(rename = "dischargeNotAllowed", default)]
    #[builder(default)]
    pub is_discharge_not_allowed: bool,
}
