pub mod server;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::{
    core::{observer::StatusObserver, status::BatteryStatus},
    prelude::*,
};

/// Prometheus gauges of the polled battery statuses, labelled by battery name.
pub struct Metrics {
    registry: Registry,
    relative_state_of_charge: GaugeVec,
    user_state_of_charge: GaugeVec,
    remaining_capacity: GaugeVec,
    consumption: GaugeVec,
    ac_power: GaugeVec,
    is_discharging: GaugeVec,
    operating_mode: GaugeVec,
}

impl Metrics {
    pub fn try_new() -> Result<Self> {
        let registry = Registry::new();
        let gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let gauge = GaugeVec::new(Opts::new(name, help).namespace("battery"), &["name"])?;
            registry
                .register(Box::new(gauge.clone()))
                .with_context(|| format!("failed to register `{name}`"))?;
            Ok(gauge)
        };
        Ok(Self {
            relative_state_of_charge: gauge("rsoc_percent", "Relative state of charge")?,
            user_state_of_charge: gauge("usoc_percent", "User state of charge")?,
            remaining_capacity: gauge("remaining_capacity_wh", "Remaining capacity")?,
            consumption: gauge("consumption_w", "House consumption, direct measurement")?,
            ac_power: gauge(
                "ac_power_w",
                "AC power: positive when discharging, negative when charging",
            )?,
            is_discharging: gauge("discharging", "1 when discharging, 0 otherwise")?,
            operating_mode: gauge("operating_mode", "Operating mode: 1 is manual, 2 is automatic")?,
            registry,
        })
    }

    /// Render the registry in the text exposition format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode the metrics")?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl StatusObserver for Metrics {
    fn observe(&self, battery: &str, status: &BatteryStatus) {
        let labels = &[battery];
        self.relative_state_of_charge
            .with_label_values(labels)
            .set(status.relative_state_of_charge.0);
        self.user_state_of_charge.with_label_values(labels).set(status.user_state_of_charge.0);
        self.remaining_capacity.with_label_values(labels).set(status.remaining_capacity.0);
        self.consumption.with_label_values(labels).set(status.consumption.0);
        self.ac_power.with_label_values(labels).set(status.ac_power.0);
        self.is_discharging
            .with_label_values(labels)
            .set(if status.is_discharging { 1.0 } else { 0.0 });
        self.operating_mode
            .with_label_values(labels)
            .set(f64::from(status.operating_mode.code()));
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        core::status::OperatingMode,
        quantity::{energy::WattHours, percent::Percent, power::Watts},
    };

    fn status() -> BatteryStatus {
        BatteryStatus::builder()
            .operating_mode(OperatingMode::Manual)
            .relative_state_of_charge(Percent(61.0))
            .user_state_of_charge(Percent(57.0))
            .remaining_capacity(WattHours(6077.0))
            .consumption(Watts(2101.0))
            .ac_power(Watts(795.0))
            .is_discharging(true)
            .build()
    }

    #[test]
    fn observe_ok() -> Result {
        let metrics = Metrics::try_new()?;
        metrics.observe("battery1", &status());

        let labels = &["battery1"];
        assert_abs_diff_eq!(metrics.relative_state_of_charge.with_label_values(labels).get(), 61.0);
        assert_abs_diff_eq!(metrics.user_state_of_charge.with_label_values(labels).get(), 57.0);
        assert_abs_diff_eq!(metrics.remaining_capacity.with_label_values(labels).get(), 6077.0);
        assert_abs_diff_eq!(metrics.consumption.with_label_values(labels).get(), 2101.0);
        assert_abs_diff_eq!(metrics.ac_power.with_label_values(labels).get(), 795.0);
        assert_abs_diff_eq!(metrics.is_discharging.with_label_values(labels).get(), 1.0);
        assert_abs_diff_eq!(metrics.operating_mode.with_label_values(labels).get(), 1.0);
        Ok(())
    }

    #[test]
    fn batteries_are_labelled_separately() -> Result {
        let metrics = Metrics::try_new()?;
        metrics.observe("battery1", &status());
        metrics.observe(
            "battery2",
            &BatteryStatus { remaining_capacity: WattHours(100.0), ..status() },
        );

        let encoded = metrics.encode()?;
        assert!(encoded.contains(r#"battery_remaining_capacity_wh{name="battery1"} 6077"#));
        assert!(encoded.contains(r#"battery_remaining_capacity_wh{name="battery2"} 100"#));
        assert!(encoded.contains("# TYPE battery_discharging gauge"));
        Ok(())
    }
}
