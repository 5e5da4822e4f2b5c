use energy_client::{timestamp, Measurement};

/// Fixed decimal rendering used by the progress line and dashboard readouts.
pub fn format_value(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

pub fn progress_line(m: &Measurement) -> String {
    format!(
        "{}     Voltage: {}V     Current: {}A     Power: {}W     Energy: {}kWh     Freq: {}Hz     Power Factor: {}     Cost: €{}",
        timestamp::format(m.timestamp),
        format_value(m.voltage, 2),
        format_value(m.current, 3),
        format_value(m.power, 2),
        format_value(m.energy, 3),
        format_value(m.frequency, 2),
        format_value(m.pf, 2),
        format_value(m.cost, 4),
    )
}
