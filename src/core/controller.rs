//! Per-battery discharge state machine.

use std::{sync::Arc, time::Duration};

use bon::Builder;
use chrono::{DateTime, Local, TimeZone};
use tokio::time::{MissedTickBehavior, interval};

use crate::{
    core::{
        device::Device,
        observer::StatusObserver,
        policy::{DischargePolicy, Readiness},
        status::{BatteryStatus, OperatingMode},
    },
    prelude::*,
};

/// What the controller believes it has commanded.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DischargeState {
    #[default]
    Idle,

    /// Our own discharge command is in effect.
    Discharging,
}

/// Outcome of a single tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    /// The status could not be polled, nothing else has been done.
    PollFailed,

    /// Discharging is disabled for the battery.
    Disabled,

    /// Readiness matches the current state, no commands have been sent.
    Hold(DischargeState),

    Started,
    StartFailed,

    /// The battery stopped discharging on its own and the setpoint has been sent again.
    Restarted,

    RestartFailed,

    Stopped {
        /// Whether the automatic mode has been restored after stopping.
        is_mode_restored: bool,
    },

    StopFailed,
}

#[derive(Default)]
pub struct ControllerState {
    /// Latest successfully polled status.
    pub status: Option<BatteryStatus>,

    pub discharge: DischargeState,
}

#[derive(Builder)]
pub struct Controller<D> {
    policy: DischargePolicy,
    device: D,
    observer: Arc<dyn StatusObserver>,

    #[builder(skip)]
    state: ControllerState,
}

impl<D: Device> Controller<D> {
    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Tick forever.
    #[instrument(skip_all, fields(battery = %self.policy.battery))]
    pub async fn run(mut self, period: Duration) {
        info!(
            ?period,
            start_time = %self.policy.start_time,
            stop_time = %self.policy.stop_time,
            capacity_limit = %self.policy.capacity_limit,
            soc_limit = %self.policy.soc_limit,
            power_limit = %self.policy.power_limit,
            is_enabled = self.policy.is_enabled,
            "running…",
        );
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let decision = self.tick(Local::now).await;
            debug!(?decision, state = ?self.state().discharge, "ticked");
        }
    }

    /// Poll the battery, publish the status, and issue the commands if the readiness has changed.
    ///
    /// `now` is only evaluated after the status is polled, so that slow retries do not skew the window check.
    #[instrument(skip_all, fields(battery = %self.policy.battery))]
    pub async fn tick<Tz, F>(&mut self, now: F) -> Decision
    where
        Tz: TimeZone,
        F: FnOnce() -> DateTime<Tz> + Send,
    {
        let status = match self.device.status().await {
            Ok(status) => status,
            Err(error) => {
                let last_remaining_capacity =
                    self.state.status.as_ref().map(|status| status.remaining_capacity);
                warn!(
                    ?last_remaining_capacity,
                    state = ?self.state.discharge,
                    "failed to poll the status, skipping: {error:#}",
                );
                return Decision::PollFailed;
            }
        };
        info!(
            remaining_capacity = %status.remaining_capacity,
            state_of_charge = %status.relative_state_of_charge,
            consumption = %status.consumption,
            ac_power = %status.ac_power,
            is_discharging = status.is_discharging,
            operating_mode = %status.operating_mode,
            "polled",
        );
        debug!(
            production = %status.production,
            grid_feed_in = %status.grid_feed_in,
            is_charging = status.is_charging,
            is_discharge_not_allowed = status.is_discharge_not_allowed,
            system_status = %status.system_status,
            timestamp = %status.timestamp,
            ac_voltage = status.ac_voltage,
            battery_voltage = status.battery_voltage,
            frequency = status.frequency,
        );
        self.observer.observe(&self.policy.battery, &status);

        let decision = if self.policy.is_enabled {
            let readiness = self.policy.readiness(&status, &now());
            self.transition(&status, readiness).await
        } else {
            Decision::Disabled
        };
        self.state.status = Some(status);
        decision
    }

    async fn transition(&mut self, status: &BatteryStatus, readiness: Readiness) -> Decision {
        debug!(
            readiness.has_capacity,
            readiness.has_charge,
            readiness.is_within_window,
            state = ?self.state.discharge,
        );
        match (readiness.is_ready(), self.state.discharge) {
            (true, DischargeState::Idle) => self.start(status).await,
            (true, DischargeState::Discharging) if !status.is_discharging => {
                self.restart(status).await
            }
            (false, DischargeState::Discharging) => self.stop(status).await,
            (_, state) => Decision::Hold(state),
        }
    }

    async fn start(&mut self, status: &BatteryStatus) -> Decision {
        if let Err(error) = self.command_discharge(status).await {
            error!("failed to start discharging: {error:#}");
            return Decision::StartFailed;
        }
        self.state.discharge = DischargeState::Discharging;
        info!(power = %self.policy.power_limit, "started discharging");
        Decision::Started
    }

    /// The battery has dropped our setpoint, for example after a reboot.
    async fn restart(&mut self, status: &BatteryStatus) -> Decision {
        warn!(
            operating_mode = %status.operating_mode,
            "the battery does not report discharging, re-issuing the setpoint…",
        );
        if let Err(error) = self.command_discharge(status).await {
            error!("failed to restart discharging, will retry: {error:#}");
            return Decision::RestartFailed;
        }
        info!(power = %self.policy.power_limit, "restarted discharging");
        Decision::Restarted
    }

    /// Switch to the manual mode and send the setpoint.
    async fn command_discharge(&self, status: &BatteryStatus) -> Result {
        self.device
            .switch_to_manual(status.operating_mode)
            .await
            .context("failed to switch to the manual mode")?;
        if let Err(error) = self.device.start_discharge(self.policy.power_limit).await {
            // Only revert the switch made just above.
            if status.operating_mode != OperatingMode::Manual
                && let Err(error) = self.device.switch_to_automatic(OperatingMode::Manual).await
            {
                warn!("failed to restore the automatic mode: {error:#}");
            }
            return Err(error);
        }
        Ok(())
    }

    async fn stop(&mut self, status: &BatteryStatus) -> Decision {
        if let Err(error) = self.device.stop_discharge().await {
            error!("failed to stop discharging, will retry: {error:#}");
            return Decision::StopFailed;
        }
        self.state.discharge = DischargeState::Idle;
        info!("stopped discharging");

        let is_mode_restored = match self.device.switch_to_automatic(status.operating_mode).await {
            Ok(()) => true,
            Err(error) => {
                error!("failed to switch back to the automatic mode: {error:#}");
                false
            }
        };
        Decision::Stopped { is_mode_restored }
    }
}
