//! Command sequences behind the manual control operations.
use crate::communication::Command;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    /// Operator wording used in console messages ("moving 10 left").
    pub fn describe(self, distance: f64) -> &'static str {
        match (self, distance < 0.0) {
            (Axis::X, false) => "right",
            (Axis::X, true) => "left",
            (Axis::Y, false) => "back",
            (Axis::Y, true) => "forward",
            (Axis::Z, false) => "up",
            (Axis::Z, true) => "down",
        }
    }
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

pub fn home_xy() -> Vec<Command> {
    vec![Command::new("G28 X Y")]
}

pub fn home_z() -> Vec<Command> {
    vec![Command::new("G28 Z")]
}

/// Relative move wrapped in G91/G90 so absolute positioning is restored afterwards.
pub fn jog(axis: Axis, distance: f64, feedrate: Option<f64>) -> Vec<Command> {
    let mut moves = format!("G1 {}{}", axis.letter(), distance);
    if let Some(feedrate) = feedrate {
        moves.push_str(&format!(" F{}", feedrate));
    }
    relative(moves)
}

/// Positive lengths extrude, negative lengths retract.
pub fn extrude(length: f64) -> Vec<Command> {
    relative(format!("G1 E{}", length))
}

pub fn fan_on(speed: u8) -> Vec<Command> {
    vec![Command::new(format!("M106 S{}", speed))]
}

pub fn fan_off() -> Vec<Command> {
    vec![Command::new("M107")]
}

pub fn set_hotend_temperature(target: i32) -> Vec<Command> {
    vec![Command::new(format!("M104 S{}", target))]
}

pub fn set_heatbed_temperature(target: i32) -> Vec<Command> {
    vec![Command::new(format!("M140 S{}", target))]
}

fn relative(line: String) -> Vec<Command> {
    vec![Command::new("G91"), Command::new(line), Command::new("G90")]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(commands: Vec<Command>) -> Vec<String> {
        commands.into_iter().map(|c| c.text).collect()
    }

    #[test]
    fn jog_is_bracketed_by_relative_positioning() {
        assert_eq!(texts(jog(Axis::X, -10.0, None)), vec!["G91", "G1 X-10", "G90"]);
        assert_eq!(texts(jog(Axis::Z, 0.5, Some(600.0))), vec!["G91", "G1 Z0.5 F600", "G90"]);
    }

    #[test]
    fn retract_is_negative_extrusion() {
        assert_eq!(texts(extrude(-2.5)), vec!["G91", "G1 E-2.5", "G90"]);
    }

    #[test]
    fn temperature_and_fan_commands() {
        assert_eq!(texts(set_hotend_temperature(210)), vec!["M104 S210"]);
        assert_eq!(texts(set_heatbed_temperature(60)), vec!["M140 S60"]);
        assert_eq!(texts(fan_on(255)), vec!["M106 S255"]);
        assert_eq!(texts(fan_off()), vec!["M107"]);
    }

    #[test]
    fn axis_parsing_and_wording() {
        assert_eq!("Y".parse::<Axis>().unwrap(), Axis::Y);
        assert!("e".parse::<Axis>().is_err());
        assert_eq!(Axis::X.describe(-1.0), "left");
        assert_eq!(Axis::Z.describe(1.0), "up");
    }
}
