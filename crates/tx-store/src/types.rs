use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Result of a partner step or of a whole transaction.
///
/// The string forms are durable: they are what lands in the `result`
/// columns and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The operation definitely applied.
    Success,
    /// The operation definitely did not apply.
    Fail,
    /// The caller cannot know whether the operation applied; retry later.
    Uncertain,
}

impl Outcome {
    /// Returns the durable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Fail => "fail",
            Outcome::Uncertain => "uncertain",
        }
    }

    /// Returns true for `Success` and `Fail`.
    ///
    /// Only definite outcomes may be written as a transaction's terminal
    /// result; `Uncertain` keeps the transaction in the retry index.
    pub fn is_definite(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Fail)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = ParseWireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "fail" => Ok(Outcome::Fail),
            "uncertain" => Ok(Outcome::Uncertain),
            other => Err(ParseWireError {
                kind: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// Phase of a partner step within a transaction.
///
/// Together with the transaction id and the partner's offset this keys a
/// durable [`PartnerResultRecord`](crate::PartnerResultRecord). The string
/// forms are durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Prepare across the normal partners.
    #[serde(rename = "do-normal")]
    DoNormal,
    /// Prepare of the single optional uncertain partner.
    #[serde(rename = "do-uncertain")]
    DoUncertain,
    /// Commit across normal, certain and async partners.
    #[serde(rename = "doNext")]
    DoNext,
    /// Compensation across the normal partners, in reverse.
    #[serde(rename = "undo")]
    Undo,
}

impl Phase {
    /// Returns the durable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DoNormal => "do-normal",
            Phase::DoUncertain => "do-uncertain",
            Phase::DoNext => "doNext",
            Phase::Undo => "undo",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseWireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "do-normal" => Ok(Phase::DoNormal),
            "do-uncertain" => Ok(Phase::DoUncertain),
            "doNext" => Ok(Phase::DoNext),
            "undo" => Ok(Phase::Undo),
            other => Err(ParseWireError {
                kind: "phase",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored string did not match any known wire value.
#[derive(Debug, Clone)]
pub struct ParseWireError {
    kind: &'static str,
    value: String,
}

impl std::fmt::Display for ParseWireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseWireError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_wire_strings_are_stable() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Fail.as_str(), "fail");
        assert_eq!(Outcome::Uncertain.as_str(), "uncertain");
    }

    #[test]
    fn outcome_roundtrips_through_from_str() {
        for outcome in [Outcome::Success, Outcome::Fail, Outcome::Uncertain] {
            assert_eq!(outcome.as_str().parse::<Outcome>().unwrap(), outcome);
        }
        assert!("done".parse::<Outcome>().is_err());
    }

    #[test]
    fn outcome_serde_uses_wire_strings() {
        assert_eq!(
            serde_json::to_string(&Outcome::Uncertain).unwrap(),
            "\"uncertain\""
        );
        let parsed: Outcome = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(parsed, Outcome::Fail);
    }

    #[test]
    fn only_definite_outcomes_are_terminal() {
        assert!(Outcome::Success.is_definite());
        assert!(Outcome::Fail.is_definite());
        assert!(!Outcome::Uncertain.is_definite());
    }

    #[test]
    fn phase_wire_strings_are_stable() {
        assert_eq!(Phase::DoNormal.as_str(), "do-normal");
        assert_eq!(Phase::DoUncertain.as_str(), "do-uncertain");
        assert_eq!(Phase::DoNext.as_str(), "doNext");
        assert_eq!(Phase::Undo.as_str(), "undo");
    }

    #[test]
    fn phase_roundtrips_through_from_str() {
        for phase in [Phase::DoNormal, Phase::DoUncertain, Phase::DoNext, Phase::Undo] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("commit".parse::<Phase>().is_err());
    }
}
