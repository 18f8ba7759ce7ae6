use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    core::status::{BatteryStatus, OperatingMode},
    prelude::*,
    quantity::power::Watts,
};

/// Battery capabilities the discharge controller relies upon.
#[async_trait]
pub trait Device: Send + Sync {
    async fn status(&self) -> Result<BatteryStatus>;

    /// Start discharging with the specified power, or adjust the power of an ongoing discharge.
    async fn start_discharge(&self, power: Watts) -> Result;

    async fn stop_discharge(&self) -> Result;

    /// Switch to the manual mode, unless the `current` mode is already manual.
    async fn switch_to_manual(&self, current: OperatingMode) -> Result;

    /// Switch back to the automatic mode, unless the `current` mode is already automatic.
    async fn switch_to_automatic(&self, current: OperatingMode) -> Result;
}

#[async_trait]
impl<D: Device + ?Sized> Device for Arc<D> {
    async fn status(&self) -> Result<BatteryStatus> {
        (**self).status().await
    }

    async fn start_discharge(&self, power: Watts) -> Result {
        (**self).start_discharge(power).await
    }

    async fn stop_discharge(&self) -> Result {
        (**self).stop_discharge().await
    }

    async fn switch_to_manual(&self, current: OperatingMode) -> Result {
        (**self).switch_to_manual(current).await
    }

    async fn switch_to_automatic(&self, current: OperatingMode) -> Result {
        (**self).switch_to_automatic(current).await
    }
}
