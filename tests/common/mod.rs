//! Shared fixtures: a scripted text generator and market/record builders
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use debatedesk::data::{IndexMember, PriceRow};
use debatedesk::debate::{
    debate_signature, CrossExamination, DebateContext, DebatePrompts, DebateRecord, FinalDefense,
    OpeningArgument, Participant, Rebuttal, StageTimings, Synthesis, Verdict,
};
use debatedesk::llm::{Generation, LlmError, RetryPolicy, TextGenerator};
use debatedesk::orchestrator::DebateStage;
use debatedesk::trading::selection::{RankInputs, SelectedTicker, Track};
use debatedesk::trading::signals::{Direction, MaWindow, Signal};

pub fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 20).expect("valid date")
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_unit: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

/// Failure injected for a matching call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    RateLimited,
    ServerError,
    Garbage,
}

#[derive(Debug, Clone)]
struct Rule {
    ticker: Option<String>,
    stage: DebateStage,
    participant: Participant,
    fault: Fault,
    remaining: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub ticker: String,
    pub stage: DebateStage,
    pub participant: Participant,
}

#[derive(Default)]
struct Activity {
    in_flight: HashMap<String, usize>,
    max_tickers_in_flight: usize,
}

/// Answers every stage with well-formed JSON unless a rule injects a fault
#[derive(Default)]
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
    activity: Mutex<Activity>,
    delay: Option<Duration>,
}

fn participant_of(system: Option<&str>) -> Participant {
    let prompts = DebatePrompts;
    [Participant::Bull, Participant::Bear, Participant::Examiner, Participant::Judge]
        .into_iter()
        .find(|p| system == Some(prompts.system(*p)))
        .expect("known system prompt")
}

fn stage_of(prompt: &str) -> DebateStage {
    if prompt.contains("\"verdict\"") {
        DebateStage::Synthesis
    } else if prompt.contains("\"against_bull\"") {
        DebateStage::CrossExamination
    } else if prompt.contains("\"defense\"") {
        DebateStage::FinalDefense
    } else {
        DebateStage::Opening
    }
}

fn ticker_of(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Ticker: "))
        .unwrap_or("?")
        .trim()
        .to_string()
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits this long before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Inject `fault` into the next `times` matching calls
    pub fn fail(
        &self,
        ticker: Option<&str>,
        stage: DebateStage,
        participant: Participant,
        fault: Fault,
        times: usize,
    ) {
        self.rules.lock().expect("rules lock").push(Rule {
            ticker: ticker.map(str::to_string),
            stage,
            participant,
            fault,
            remaining: times,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, stage: DebateStage, participant: Participant) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.stage == stage && c.participant == participant)
            .count()
    }

    pub fn count_for(&self, ticker: &str, stage: DebateStage) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.ticker == ticker && c.stage == stage)
            .count()
    }

    pub fn max_tickers_in_flight(&self) -> usize {
        self.activity.lock().expect("activity lock").max_tickers_in_flight
    }

    fn take_fault(&self, call: &Call) -> Option<Fault> {
        let mut rules = self.rules.lock().expect("rules lock");
        let rule = rules.iter_mut().find(|r| {
            r.remaining > 0
                && r.stage == call.stage
                && r.participant == call.participant
                && r.ticker.as_deref().map_or(true, |t| t == call.ticker)
        })?;
        rule.remaining -= 1;
        Some(rule.fault)
    }

    fn enter(&self, ticker: &str) {
        let mut activity = self.activity.lock().expect("activity lock");
        *activity.in_flight.entry(ticker.to_string()).or_default() += 1;
        let active = activity.in_flight.values().filter(|n| **n > 0).count();
        activity.max_tickers_in_flight = activity.max_tickers_in_flight.max(active);
    }

    fn leave(&self, ticker: &str) {
        let mut activity = self.activity.lock().expect("activity lock");
        if let Some(n) = activity.in_flight.get_mut(ticker) {
            *n = n.saturating_sub(1);
        }
    }

    async fn respond(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError> {
        let call = Call {
            ticker: ticker_of(prompt),
            stage: stage_of(prompt),
            participant: participant_of(system),
        };
        self.calls.lock().expect("calls lock").push(call.clone());

        self.enter(&call.ticker);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.leave(&call.ticker);

        match self.take_fault(&call) {
            Some(Fault::RateLimited) => return Err(LlmError::RateLimited { retry_after: None }),
            Some(Fault::ServerError) => {
                return Err(LlmError::Api {
                    status_code: 500,
                    message: "upstream exploded".to_string(),
                })
            }
            Some(Fault::Garbage) => return Ok("I would rather not answer in JSON today.".to_string()),
            None => {}
        }

        let body = match call.stage {
            DebateStage::Opening => format!(
                r#"{{"thesis": "{} case for {}", "key_points": ["{} point"]}}"#,
                call.participant, call.ticker, call.participant
            ),
            DebateStage::CrossExamination => r#"{"against_bull": [{"target": "bull point", "rebuttal": "priced in"}], "against_bear": [{"target": "bear point", "rebuttal": "trend is intact"}]}"#.to_string(),
            DebateStage::FinalDefense => format!(
                r#"{{"defense": "{} stands firm", "maintained_points": ["core thesis"], "concessions": []}}"#,
                call.participant
            ),
            DebateStage::Synthesis => "After weighing both sides:\n```json\n{\"verdict\": \"Strong Buy\", \"confidence\": 72, \"consensus\": [\"momentum is real\"], \"summary\": \"Bull case prevails.\"}\n```".to_string(),
        };
        Ok(body)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError> {
        self.respond(prompt, system).await
    }

    async fn generate_with_reasoning(&self, prompt: &str, system: Option<&str>) -> Result<Generation, LlmError> {
        let text = self.respond(prompt, system).await?;
        Ok(Generation {
            text,
            reasoning: Some("weighed momentum against valuation".to_string()),
        })
    }
}

pub fn signal(ticker: &str, pct: f64, ma20: Direction, ma60: Direction, ma250: Direction) -> Signal {
    Signal {
        ticker: ticker.to_string(),
        signal_date: trade_date(),
        close_price: 100.0 + pct,
        prev_close_price: 100.0,
        price_change_pct: pct,
        ma20_direction: ma20,
        ma60_direction: ma60,
        ma250_direction: ma250,
        generated_at: Utc::now(),
    }
}

pub fn selected(ticker: &str, track: Track) -> SelectedTicker {
    let signal = signal(ticker, 2.0, Direction::CrossAbove, Direction::None, Direction::None);
    SelectedTicker {
        ticker: ticker.to_string(),
        name: format!("{} Holdings", ticker),
        track,
        trigger_type: MaWindow::Ma20,
        active_signals: vec![MaWindow::Ma20],
        rank_inputs: RankInputs {
            signal_count: 1,
            price_change_pct: 2.0,
            weight: 0.0,
        },
        signal,
    }
}

pub fn member(ticker: &str, weight: f64) -> IndexMember {
    IndexMember {
        ticker: ticker.to_string(),
        name: format!("{} Holdings", ticker),
        weight,
    }
}

/// Price row whose close crosses above the 20-day average only
pub fn crossing_row(ticker: &str) -> PriceRow {
    PriceRow {
        ticker: ticker.to_string(),
        close: 102.0,
        prev_close: 99.0,
        ma20: Some(100.0),
        ma60: Some(90.0),
        ma250: Some(80.0),
    }
}

/// Price row with no crossover
pub fn flat_row(ticker: &str) -> PriceRow {
    PriceRow {
        ticker: ticker.to_string(),
        close: 120.0,
        prev_close: 119.0,
        ma20: Some(100.0),
        ma60: Some(100.0),
        ma250: Some(100.0),
    }
}

/// A finished debate built without running the workflow
pub fn sample_record(ticker: &str, trigger_date: NaiveDate, minute: u32) -> DebateRecord {
    let synthesized_at = Utc
        .with_ymd_and_hms(2026, 1, 20, 22, minute, 0)
        .single()
        .expect("valid timestamp");
    let mut context = DebateContext::from_selected(&selected(ticker, Track::Broad));
    context.trigger_date = trigger_date;

    let opening = |thesis: &str| OpeningArgument {
        thesis: thesis.to_string(),
        key_points: vec![],
    };
    let defense = FinalDefense {
        defense: "holds".to_string(),
        maintained_points: vec![],
        concessions: vec![],
    };

    DebateRecord {
        ticker: ticker.to_string(),
        trigger_date,
        context,
        bull_opening: opening("up"),
        bear_opening: opening("down"),
        cross_examination: CrossExamination {
            against_bull: vec![Rebuttal {
                target: "up".to_string(),
                rebuttal: "no".to_string(),
            }],
            against_bear: vec![],
        },
        bull_defense: defense.clone(),
        bear_defense: defense,
        synthesis: Synthesis {
            verdict: Verdict::Neutral,
            confidence: 50.0,
            consensus: vec![],
            summary: "split".to_string(),
            reasoning: None,
            synthesized_at,
        },
        signature: debate_signature(ticker, trigger_date, synthesized_at),
        stage_timings: StageTimings::default(),
        created_at: synthesized_at,
        updated_at: synthesized_at,
        enrichment: None,
    }
}
