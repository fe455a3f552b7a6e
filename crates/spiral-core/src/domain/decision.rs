//! Per-iteration verdicts.

use serde::{Deserialize, Serialize};

/// Orchestrator verdict for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    Iterate,
    ForceAccept,
    Reject,
}

impl Decision {
    /// ACCEPT, FORCE_ACCEPT and REJECT end the run.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Decision::Iterate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::Iterate => "ITERATE",
            Decision::ForceAccept => "FORCE_ACCEPT",
            Decision::Reject => "REJECT",
        }
    }

    /// Multiplier applied to a stored result's importance.
    pub fn importance_weight(self) -> f64 {
        match self {
            Decision::Accept => 1.0,
            Decision::Iterate => 0.8,
            Decision::Reject => 0.6,
            Decision::ForceAccept => 1.2,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ACCEPT" => Ok(Decision::Accept),
            "ITERATE" => Ok(Decision::Iterate),
            "FORCE_ACCEPT" => Ok(Decision::ForceAccept),
            "REJECT" => Ok(Decision::Reject),
            other => Err(format!(
                "unknown decision '{other}' (expected ACCEPT, ITERATE, FORCE_ACCEPT or REJECT)"
            )),
        }
    }
}
