use chrono::{DateTime, TimeZone};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::core::{policy::DischargePolicy, status::BatteryStatus};

pub fn build_status_table<Tz: TimeZone>(
    batteries: &[(DischargePolicy, BatteryStatus)],
    now: &DateTime<Tz>,
) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec![
        "Battery", "Mode", "SoC", "Remaining", "AC power", "Window", "Discharge", "Ready",
    ]);
    for (policy, status) in batteries {
        let readiness = policy.readiness(status, now);
        table.add_row(vec![
            Cell::new(&policy.battery).add_attribute(Attribute::Bold),
            Cell::new(status.operating_mode).add_attribute(Attribute::Dim),
            Cell::new(status.relative_state_of_charge)
                .set_alignment(CellAlignment::Right)
                .fg(flag_color(readiness.has_charge)),
            Cell::new(status.remaining_capacity)
                .set_alignment(CellAlignment::Right)
                .fg(flag_color(readiness.has_capacity)),
            Cell::new(status.ac_power).set_alignment(CellAlignment::Right),
            Cell::new(format!("{}–{}", policy.start_time, policy.stop_time))
                .fg(flag_color(readiness.is_within_window)),
            Cell::new(if policy.is_enabled { "enabled" } else { "disabled" })
                .fg(flag_color(readiness.is_enabled)),
            Cell::new(if readiness.is_ready() { "yes" } else { "no" })
                .fg(flag_color(readiness.is_ready())),
        ]);
    }
    table
}

const fn flag_color(flag: bool) -> Color {
    if flag { Color::Green } else { Color::Red }
}
