//! Debate records: typed stage outputs, the finished record and its signature
//!
//! - Opening arguments from the bull (advocate) and bear (skeptic)
//! - Cross-examination with rebuttals aimed at each side
//! - Final defenses answering those rebuttals
//! - Synthesis with the judged verdict

pub mod memory;
pub mod prompts;
pub mod sanitize;
pub mod store;

pub use memory::MemoryDebateStore;
pub use prompts::DebatePrompts;
pub use store::{PgDebateStore, ResultStore, StoreOutcome};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::trading::selection::{SelectedTicker, Track};
use crate::trading::signals::{MaWindow, Signal};

/// The two opposing sides of a debate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bull,
    Bear,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Bull => write!(f, "bull"),
            Role::Bear => write!(f, "bear"),
        }
    }
}

/// Who speaks in a stage call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    Bull,
    Bear,
    Examiner,
    Judge,
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Participant::Bull => write!(f, "bull"),
            Participant::Bear => write!(f, "bear"),
            Participant::Examiner => write!(f, "examiner"),
            Participant::Judge => write!(f, "judge"),
        }
    }
}

/// Structured payload expected from one stage call
pub trait StagePayload: serde::de::DeserializeOwned {
    /// Semantic checks beyond what deserialization enforces
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("'{}' must not be empty", field))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningArgument {
    pub thesis: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl StagePayload for OpeningArgument {
    fn validate(&self) -> Result<(), String> {
        non_empty("thesis", &self.thesis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rebuttal {
    /// The opponent's point being answered
    pub target: String,
    pub rebuttal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossExamination {
    /// Rebuttals directed at the bull's opening
    #[serde(default)]
    pub against_bull: Vec<Rebuttal>,
    /// Rebuttals directed at the bear's opening
    #[serde(default)]
    pub against_bear: Vec<Rebuttal>,
}

impl CrossExamination {
    pub fn against(&self, role: Role) -> &[Rebuttal] {
        match role {
            Role::Bull => &self.against_bull,
            Role::Bear => &self.against_bear,
        }
    }
}

impl StagePayload for CrossExamination {
    fn validate(&self) -> Result<(), String> {
        if self.against_bull.is_empty() && self.against_bear.is_empty() {
            return Err("cross-examination produced no rebuttals".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDefense {
    pub defense: String,
    #[serde(default)]
    pub maintained_points: Vec<String>,
    #[serde(default)]
    pub concessions: Vec<String>,
}

impl StagePayload for FinalDefense {
    fn validate(&self) -> Result<(), String> {
        non_empty("defense", &self.defense)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    StrongBuy,
    Neutral,
    Short,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::StrongBuy => "Strong Buy",
            Verdict::Neutral => "Neutral",
            Verdict::Short => "Short",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    /// Accepts "Strong Buy", "STRONG_BUY", "strong-buy" and similar spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "strongbuy" => Ok(Verdict::StrongBuy),
            "neutral" => Ok(Verdict::Neutral),
            "short" => Ok(Verdict::Short),
            _ => Err(format!("unknown verdict '{}'", s)),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Judge output as returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub verdict: Verdict,
    /// 0 to 100
    pub confidence: f64,
    #[serde(default)]
    pub consensus: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl StagePayload for SynthesisOutput {
    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0..=100", self.confidence));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub verdict: Verdict,
    pub confidence: f64,
    pub consensus: Vec<String>,
    pub summary: String,
    pub reasoning: Option<String>,
    pub synthesized_at: DateTime<Utc>,
}

impl Synthesis {
    pub fn from_output(output: SynthesisOutput, reasoning: Option<String>, synthesized_at: DateTime<Utc>) -> Self {
        Self {
            verdict: output.verdict,
            confidence: output.confidence,
            consensus: output.consensus,
            summary: output.summary,
            reasoning,
            synthesized_at,
        }
    }
}

/// Wall-clock milliseconds spent in each stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub opening_ms: u64,
    pub cross_examination_ms: u64,
    pub final_defense_ms: u64,
    pub synthesis_ms: u64,
}

/// Market context shared by every stage of one ticker's debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateContext {
    pub ticker: String,
    pub name: String,
    pub trigger_date: NaiveDate,
    pub track: Track,
    pub trigger_type: MaWindow,
    pub active_signals: Vec<MaWindow>,
    pub signal: Signal,
}

impl DebateContext {
    pub fn from_selected(selected: &SelectedTicker) -> Self {
        Self {
            ticker: selected.ticker.clone(),
            name: selected.name.clone(),
            trigger_date: selected.signal.signal_date,
            track: selected.track,
            trigger_type: selected.trigger_type,
            active_signals: selected.active_signals.clone(),
            signal: selected.signal.clone(),
        }
    }
}

/// Finished debate, keyed by (ticker, trigger_date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub ticker: String,
    pub trigger_date: NaiveDate,
    pub context: DebateContext,
    pub bull_opening: OpeningArgument,
    pub bear_opening: OpeningArgument,
    pub cross_examination: CrossExamination,
    pub bull_defense: FinalDefense,
    pub bear_defense: FinalDefense,
    pub synthesis: Synthesis,
    pub signature: String,
    pub stage_timings: StageTimings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Derived content added after creation, e.g. a translated report
    #[serde(default)]
    pub enrichment: Option<serde_json::Value>,
}

impl DebateRecord {
    /// Copy of this record carrying `enrichment`, for `ResultStore::update`
    pub fn with_enrichment(&self, enrichment: serde_json::Value) -> Self {
        Self {
            enrichment: Some(enrichment),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Deterministic signature of a completed debate: hex SHA-256 over ticker,
/// trigger date and synthesis time, truncated to 32 characters.
pub fn debate_signature(ticker: &str, trigger_date: NaiveDate, synthesized_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticker.to_ascii_uppercase().as_bytes());
    hasher.update(b"|");
    hasher.update(trigger_date.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(synthesized_at.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_verdict_spellings() {
        assert_eq!("Strong Buy".parse::<Verdict>().unwrap(), Verdict::StrongBuy);
        assert_eq!("STRONG_BUY".parse::<Verdict>().unwrap(), Verdict::StrongBuy);
        assert_eq!("neutral".parse::<Verdict>().unwrap(), Verdict::Neutral);
        assert_eq!("Short".parse::<Verdict>().unwrap(), Verdict::Short);
        assert!("Buy".parse::<Verdict>().is_err());
    }

    #[test]
    fn test_verdict_serializes_display_form() {
        assert_eq!(serde_json::to_string(&Verdict::StrongBuy).unwrap(), "\"Strong Buy\"");
        let parsed: Verdict = serde_json::from_str("\"strong buy\"").unwrap();
        assert_eq!(parsed, Verdict::StrongBuy);
    }

    #[test]
    fn test_signature_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 20, 22, 5, 0).unwrap();

        let a = debate_signature("NVDA", date, at);
        let b = debate_signature("nvda", date, at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let later = debate_signature("NVDA", date, at + chrono::Duration::milliseconds(1));
        assert_ne!(a, later);
        assert_ne!(a, debate_signature("AMD", date, at));
    }

    #[test]
    fn test_synthesis_confidence_bounds() {
        let mut output = SynthesisOutput {
            verdict: Verdict::Neutral,
            confidence: 55.0,
            consensus: vec![],
            summary: String::new(),
        };
        assert!(output.validate().is_ok());
        output.confidence = 140.0;
        assert!(output.validate().is_err());
        output.confidence = f64::NAN;
        assert!(output.validate().is_err());
    }

    #[test]
    fn test_cross_examination_routes_rebuttals() {
        let cross = CrossExamination {
            against_bull: vec![Rebuttal {
                target: "AI demand".to_string(),
                rebuttal: "already priced in".to_string(),
            }],
            against_bear: vec![],
        };
        assert_eq!(cross.against(Role::Bull).len(), 1);
        assert!(cross.against(Role::Bear).is_empty());
        assert!(cross.validate().is_ok());
    }

    #[test]
    fn test_opening_requires_thesis() {
        let opening: OpeningArgument = serde_json::from_str(r#"{"thesis": "  "}"#).unwrap();
        assert!(opening.validate().is_err());
        assert!(opening.key_points.is_empty());
    }
}
