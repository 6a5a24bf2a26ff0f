// src/hardware/temperature.rs - Temperature telemetry extracted from firmware responses
use serde::{Deserialize, Serialize};

/// Marker the firmware prints while it is working through a long command.
const BUSY_MARKER: &str = "busy";

/// Current and target temperature of one heater, truncated to whole degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaterReading {
    pub current: i32,
    pub set: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    pub hotend: HeaterReading,
    pub heatbed: HeaterReading,
}

impl Telemetry {
    pub fn apply(&mut self, report: &TemperatureReport) {
        match *report {
            TemperatureReport::WithSetpoint { hotend, heatbed } => {
                self.hotend = hotend;
                self.heatbed = heatbed;
            }
            TemperatureReport::CurrentOnly { hotend, heatbed } => {
                self.hotend.current = hotend;
                self.heatbed.current = heatbed;
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The two report shapes a temperature line can update telemetry with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureReport {
    WithSetpoint { hotend: HeaterReading, heatbed: HeaterReading },
    CurrentOnly { hotend: i32, heatbed: i32 },
}

/// One `<label>:<current> [/<setpoint>]` match inside a line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeaterMatch {
    current: f64,
    set: Option<f64>,
}

/// Scans whitespace separated tokens for `label:` followed by a number, and an
/// optional `/number` token directly after it.
fn find_heater(line: &str, label: &str) -> Option<HeaterMatch> {
    let mut tokens = line.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let Some(rest) = token.strip_prefix(label).and_then(|r| r.strip_prefix(':')) else {
            continue;
        };
        // "T:205.1/210.0" is not a Marlin shape, the setpoint is its own token
        let Some(current) = parse_degrees(rest) else {
            continue;
        };
        let set = tokens
            .peek()
            .and_then(|next| next.strip_prefix('/'))
            .and_then(parse_degrees);
        return Some(HeaterMatch { current, set });
    }
    None
}

fn parse_degrees(text: &str) -> Option<f64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if !digits.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn truncate(degrees: f64) -> i32 {
    degrees.trunc() as i32
}

/// Parses a firmware line into a temperature report.
///
/// Both hotend (`T:`) and heatbed (`B:`) must be present. When both carry a
/// setpoint the full report is returned, otherwise only current values.
pub fn parse_temperature_report(line: &str) -> Option<TemperatureReport> {
    let hotend = find_heater(line, "T")?;
    let heatbed = find_heater(line, "B")?;
    match (hotend.set, heatbed.set) {
        (Some(hotend_set), Some(heatbed_set)) => Some(TemperatureReport::WithSetpoint {
            hotend: HeaterReading {
                current: truncate(hotend.current),
                set: truncate(hotend_set),
            },
            heatbed: HeaterReading {
                current: truncate(heatbed.current),
                set: truncate(heatbed_set),
            },
        }),
        _ => Some(TemperatureReport::CurrentOnly {
            hotend: truncate(hotend.current),
            heatbed: truncate(heatbed.current),
        }),
    }
}

/// True when the line carries any hotend or heatbed reading.
pub fn contains_temperature_report(line: &str) -> bool {
    find_heater(line, "T").is_some() || find_heater(line, "B").is_some()
}

/// Lines that are parsed but kept out of the operator console.
pub fn is_console_noise(line: &str) -> bool {
    line.contains(BUSY_MARKER) || contains_temperature_report(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_report_is_truncated() {
        let report = parse_temperature_report("ok T:205.12 /210.00 B:59.80 /60.00").unwrap();
        let mut telemetry = Telemetry::default();
        telemetry.apply(&report);
        assert_eq!(
            telemetry,
            Telemetry {
                hotend: HeaterReading { current: 205, set: 210 },
                heatbed: HeaterReading { current: 59, set: 60 },
            }
        );
    }

    #[test]
    fn hotend_alone_is_not_a_report() {
        assert_eq!(parse_temperature_report("T:205.12"), None);
        assert_eq!(parse_temperature_report("ok T:205.12 /210.00"), None);
        assert!(contains_temperature_report("T:205.12"));
    }

    #[test]
    fn current_only_keeps_setpoints() {
        let mut telemetry = Telemetry {
            hotend: HeaterReading { current: 20, set: 200 },
            heatbed: HeaterReading { current: 20, set: 60 },
        };
        let report = parse_temperature_report("T:180.5 B:40.2").unwrap();
        assert_eq!(report, TemperatureReport::CurrentOnly { hotend: 180, heatbed: 40 });
        telemetry.apply(&report);
        assert_eq!(telemetry.hotend, HeaterReading { current: 180, set: 200 });
        assert_eq!(telemetry.heatbed, HeaterReading { current: 40, set: 60 });
    }

    #[test]
    fn mixed_shapes_fall_back_to_current_only() {
        let report = parse_temperature_report("T:210.0 /210.0 B:60.0").unwrap();
        assert_eq!(report, TemperatureReport::CurrentOnly { hotend: 210, heatbed: 60 });
    }

    #[test]
    fn marlin_m105_with_power_fields() {
        let report =
            parse_temperature_report("ok T:21.80 /0.00 B:22.10 /0.00 @:0 B@:0").unwrap();
        assert_eq!(
            report,
            TemperatureReport::WithSetpoint {
                hotend: HeaterReading { current: 21, set: 0 },
                heatbed: HeaterReading { current: 22, set: 0 },
            }
        );
    }

    #[test]
    fn busy_lines_are_noise() {
        assert!(is_console_noise("echo:busy: processing"));
        assert!(is_console_noise("T:200.00 /200.00 B:60.00 /60.00"));
        assert!(!is_console_noise("ok"));
        assert!(!is_console_noise("echo:Unknown command: \"X1\""));
    }

    #[test]
    fn unmatched_input_never_panics() {
        for line in ["", "T:", "B:abc", "T:/ B:/", "T:. B:.", "ok", "T:-5.0 B:-3.9"] {
            let _ = parse_temperature_report(line);
        }
        let report = parse_temperature_report("T:-5.0 B:-3.9").unwrap();
        assert_eq!(report, TemperatureReport::CurrentOnly { hotend: -5, heatbed: -3 });
    }
}
