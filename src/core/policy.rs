use bon::Builder;
use chrono::{DateTime, TimeZone};

use crate::{
    core::{status::BatteryStatus, window::is_within_window},
    quantity::{energy::WattHours, percent::Percent, power::Watts},
};

/// Per-battery discharge settings, fixed for the lifetime of the process.
#[derive(Clone, Debug, Builder)]
#[must_use]
pub struct DischargePolicy {
    #[builder(into)]
    pub battery: String,

    pub is_enabled: bool,

    /// Discharge only while the remaining capacity stays above this.
    pub capacity_limit: WattHours,

    /// Discharging power to request.
    pub power_limit: Watts,

    /// Discharge only while the relative state of charge stays above this.
    pub soc_limit: Percent,

    #[builder(into)]
    pub start_time: String,

    #[builder(into)]
    pub stop_time: String,
}

impl DischargePolicy {
    pub fn readiness<Tz: TimeZone>(&self, status: &BatteryStatus, now: &DateTime<Tz>) -> Readiness {
        Readiness {
            is_enabled: self.is_enabled,
            has_capacity: status.remaining_capacity > self.capacity_limit,
            has_charge: status.relative_state_of_charge > self.soc_limit,
            is_within_window: is_within_window(now, &self.start_time, &self.stop_time),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub struct Readiness {
    pub is_enabled: bool,
    pub has_capacity: bool,
    pub has_charge: bool,
    pub is_within_window: bool,
}

impl Readiness {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        self.is_enabled && self.has_capacity && self.has_charge && self.is_within_window
    }
}
