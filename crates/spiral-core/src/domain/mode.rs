//! Weighting profiles ("modes") and their fixed coefficient table.

use serde::{Deserialize, Serialize};

/// Named weighting profile controlling how metrics map to scores.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Verification,
    Creative,
    #[default]
    Balanced,
}

/// Coefficient pair selected by a [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeCoefficients {
    pub confidence: f64,
    pub success: f64,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Verification, Mode::Creative, Mode::Balanced];

    /// Closed coefficient table. Verification leans on confidence, creative on
    /// success, balanced weighs both equally.
    pub const fn coefficients(self) -> ModeCoefficients {
        match self {
            Mode::Verification => ModeCoefficients {
                confidence: 1.0,
                success: 0.6,
            },
            Mode::Creative => ModeCoefficients {
                confidence: 0.6,
                success: 1.0,
            },
            Mode::Balanced => ModeCoefficients {
                confidence: 0.8,
                success: 0.8,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Verification => "VERIFICATION",
            Mode::Creative => "CREATIVE",
            Mode::Balanced => "BALANCED",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Mode::Verification => "Prioritizes accuracy and confidence",
            Mode::Creative => "Encourages innovation and complexity",
            Mode::Balanced => "Balances verification and creativity",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VERIFICATION" => Ok(Mode::Verification),
            "CREATIVE" => Ok(Mode::Creative),
            "BALANCED" => Ok(Mode::Balanced),
            other => Err(format!(
                "unknown mode '{other}' (expected VERIFICATION, CREATIVE or BALANCED)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_biases_confidence_creative_biases_success() {
        let v = Mode::Verification.coefficients();
        let c = Mode::Creative.coefficients();
        let b = Mode::Balanced.coefficients();
        assert!(v.confidence > v.success);
        assert!(c.success > c.confidence);
        assert_eq!(b.confidence, b.success);
    }

    #[test]
    fn test_mode_serializes_uppercase() {
        let json = serde_json::to_string(&Mode::Verification).expect("serialize");
        assert_eq!(json, "\"VERIFICATION\"");
        let back: Mode = serde_json::from_str("\"CREATIVE\"").expect("deserialize");
        assert_eq!(back, Mode::Creative);
    }

    #[test]
    fn test_mode_from_str_is_case_insensitive() {
        assert_eq!("balanced".parse::<Mode>(), Ok(Mode::Balanced));
        assert!("FAST".parse::<Mode>().is_err());
    }

    #[test]
    fn test_default_mode_is_balanced() {
        assert_eq!(Mode::default(), Mode::Balanced);
    }
}
