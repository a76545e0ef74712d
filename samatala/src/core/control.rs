//! Actuator control commands.
//!
//! A control sequence is the optimizer's output: one `(pitch, vertical)`
//! pair per actuator push. It is handed to the simulator as a small text
//! artifact with one `"<pitch>,<vertical>"` line per command.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Number of actuator commands in the reference configuration.
pub const DEFAULT_ACTUATORS: usize = 2;

/// One blade command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlCommand {
    /// Blade pitch
    pub pitch: f32,
    /// Blade vertical offset
    pub vertical: f32,
}

impl ControlCommand {
    pub fn new(pitch: f32, vertical: f32) -> Self {
        Self { pitch, vertical }
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.vertical.is_finite()
    }
}

/// Ordered actuator commands.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlSequence {
    commands: Vec<ControlCommand>,
}

impl ControlSequence {
    pub fn new(commands: Vec<ControlCommand>) -> Self {
        Self { commands }
    }

    /// Reshape a flat `[p1, v1, p2, v2, ...]` array into `actuators` commands.
    ///
    /// Rejects arrays of the wrong length and non-finite entries; both mean
    /// the optimizer produced something that must not reach the simulator.
    pub fn from_flat(values: &[f32], actuators: usize) -> Result<Self> {
        if values.len() != actuators * 2 {
            return Err(Error::OptimizationDivergence(format!(
                "expected {} control values ({}x2), got {}",
                actuators * 2,
                actuators,
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(Error::OptimizationDivergence(format!(
                "non-finite control value {}",
                bad
            )));
        }
        Ok(Self {
            commands: values
                .chunks_exact(2)
                .map(|pair| ControlCommand::new(pair[0], pair[1]))
                .collect(),
        })
    }

    pub fn commands(&self) -> &[ControlCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// (commands, 2)
    pub fn shape(&self) -> (usize, usize) {
        (self.commands.len(), 2)
    }

    pub fn flatten(&self) -> Vec<f32> {
        self.commands
            .iter()
            .flat_map(|c| [c.pitch, c.vertical])
            .collect()
    }

    /// Text artifact: one `"<pitch>,<vertical>\n"` line per command.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.commands.len() * 24);
        for cmd in &self.commands {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{},{}", cmd.pitch, cmd.vertical);
        }
        out
    }

    /// Parse the text artifact back. Blank lines are ignored.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut commands = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 2 {
                return Err(format!(
                    "line {}: expected 2 fields, found {}",
                    idx + 1,
                    fields.len()
                ));
            }
            let parse = |s: &str| {
                s.parse::<f32>()
                    .map_err(|_| format!("line {}: invalid number {:?}", idx + 1, s))
            };
            commands.push(ControlCommand::new(parse(fields[0])?, parse(fields[1])?));
        }
        Ok(Self { commands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat_reshapes_pairs() {
        let seq = ControlSequence::from_flat(&[0.1, 0.2, 0.3, 0.4], 2).unwrap();
        assert_eq!(seq.shape(), (2, 2));
        assert_eq!(seq.commands()[0], ControlCommand::new(0.1, 0.2));
        assert_eq!(seq.commands()[1], ControlCommand::new(0.3, 0.4));
        assert_eq!(seq.flatten(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_from_flat_rejects_wrong_shape() {
        let err = ControlSequence::from_flat(&[0.1, 0.2, 0.3], 2).unwrap_err();
        assert!(matches!(err, Error::OptimizationDivergence(_)));
        assert!(ControlSequence::from_flat(&[0.1; 6], 2).is_err());
    }

    #[test]
    fn test_from_flat_rejects_nan() {
        let err = ControlSequence::from_flat(&[0.1, f32::NAN, 0.3, 0.4], 2).unwrap_err();
        assert!(matches!(err, Error::OptimizationDivergence(_)));
    }

    #[test]
    fn test_text_format() {
        let seq = ControlSequence::new(vec![
            ControlCommand::new(0.5, -0.25),
            ControlCommand::new(1.0, 2.0),
        ]);
        assert_eq!(seq.to_text(), "0.5,-0.25\n1,2\n");
    }

    #[test]
    fn test_parse_text() {
        let seq = ControlSequence::parse("0.5,-0.25\n\n 1.5 , 2 \n").unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.commands()[1], ControlCommand::new(1.5, 2.0));
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(ControlSequence::parse("0.5\n").is_err());
        assert!(ControlSequence::parse("0.5,abc\n").is_err());
        assert!(ControlSequence::parse("1,2,3\n").is_err());
    }

    #[test]
    fn test_text_reparses_to_same_values() {
        let seq = ControlSequence::from_flat(&[0.123_456_7, -3.5, 1e-7, 42.0], 2).unwrap();
        let parsed = ControlSequence::parse(&seq.to_text()).unwrap();
        assert_eq!(parsed, seq);
    }
}
