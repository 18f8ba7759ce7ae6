use std::{
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    time::Duration,
};

use itertools::Itertools;
use reqwest::Url;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    api::sonnen,
    core::{policy::DischargePolicy, window::DischargeWindow},
    logging::Environment,
    prelude::*,
    quantity::{energy::WattHours, percent::Percent, power::Watts},
};

#[serde_as]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
#[must_use]
pub struct Config {
    #[serde(default)]
    pub env: Environment,

    /// How often each battery gets polled.
    #[serde(default = "Config::default_polling_interval")]
    #[serde_as(as = "DisplayFromStr")]
    pub polling_interval: humantime::Duration,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub batteries: Vec<BatteryConfig>,
}

impl Config {
    fn default_polling_interval() -> humantime::Duration {
        Duration::from_secs(10).into()
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let this: Self =
            toml::from_str(&text).with_context(|| format!("failed to parse `{}`", path.display()))?;
        this.validate()?;
        Ok(this)
    }

    fn validate(&self) -> Result {
        ensure!(!self.polling_interval.is_zero(), "the polling interval must be positive");
        if let Some(name) = self.batteries.iter().map(|battery| &battery.name).duplicates().next() {
            bail!("battery `{name}` is configured more than once");
        }
        for battery in &self.batteries {
            ensure!(
                battery.power_limit.is_finite()
                    && battery.capacity_limit.is_finite()
                    && battery.soc_limit.is_finite(),
                "the limits of `{}` must be finite numbers",
                battery.name,
            );
            ensure!(
                battery.power_limit > Watts::ZERO,
                "the power limit of `{}` must be positive",
                battery.name,
            );
            ensure!(
                battery.capacity_limit >= WattHours::ZERO,
                "the capacity limit of `{}` must not be negative",
                battery.name,
            );
            ensure!(
                (Percent::ZERO..=Percent(100.0)).contains(&battery.soc_limit),
                "the state-of-charge limit of `{}` must be within 0..=100",
                battery.name,
            );
        }
        Ok(())
    }

    pub fn enabled_batteries(&self) -> impl Iterator<Item = &BatteryConfig> {
        self.batteries.iter().filter(|battery| battery.is_enabled)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default, rename = "enabled")]
    pub is_enabled: bool,

    #[serde(default = "MetricsConfig::default_bind")]
    pub bind: IpAddr,

    #[serde(default = "MetricsConfig::default_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { is_enabled: false, bind: Self::default_bind(), port: Self::default_port() }
    }
}

impl MetricsConfig {
    const fn default_bind() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    const fn default_port() -> u16 {
        5001
    }

    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Single battery, the token is never logged.
#[serde_as]
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryConfig {
    #[serde(default = "BatteryConfig::default_name")]
    pub name: String,

    /// Base URL of the local API, for example `http://192.168.1.10/api/v2`.
    #[serde_as(as = "DisplayFromStr")]
    pub url: Url,

    pub token: String,

    /// Disabled batteries are not polled at all.
    #[serde(default = "BatteryConfig::default_true", rename = "enabled")]
    pub is_enabled: bool,

    /// Enabled batteries are polled regardless, but only discharged when this is set.
    #[serde(default, rename = "discharge")]
    pub is_discharge_enabled: bool,

    #[serde(default = "BatteryConfig::default_capacity_limit")]
    pub capacity_limit: WattHours,

    #[serde(default = "BatteryConfig::default_power_limit")]
    pub power_limit: Watts,

    #[serde(default = "BatteryConfig::default_soc_limit")]
    pub soc_limit: Percent,

    #[serde(default = "BatteryConfig::default_start_time")]
    pub start_time: String,

    #[serde(default = "BatteryConfig::default_stop_time")]
    pub stop_time: String,
}

impl BatteryConfig {
    fn default_name() -> String {
        "battery1".to_owned()
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_capacity_limit() -> WattHours {
        WattHours(20000.0)
    }

    const fn default_power_limit() -> Watts {
        Watts(1000.0)
    }

    const fn default_soc_limit() -> Percent {
        Percent(50.0)
    }

    fn default_start_time() -> String {
        "18:00".to_owned()
    }

    fn default_stop_time() -> String {
        "22:00".to_owned()
    }

    pub fn policy(&self) -> DischargePolicy {
        match DischargeWindow::parse(&self.start_time, &self.stop_time) {
            Ok(window) => debug!(battery = %self.name, %window, "parsed the window"),
            Err(error) => {
                warn!(battery = %self.name, "the battery will never discharge: {error:#}");
            }
        }
        DischargePolicy::builder()
            .battery(&self.name)
            .is_enabled(self.is_discharge_enabled)
            .capacity_limit(self.capacity_limit)
            .power_limit(self.power_limit)
            .soc_limit(self.soc_limit)
            .start_time(&self.start_time)
            .stop_time(&self.stop_time)
            .build()
    }

    pub fn connect(&self) -> Result<sonnen::Client> {
        sonnen::Client::try_new(&self.url, &self.token)
            .with_context(|| format!("failed to create the client for `{}`", self.name))
    }
}
