//! Four-stage debate workflow for one ticker
//!
//! Each stage consumes the previous stage's typed result, so the order
//! Opening -> CrossExamination -> FinalDefense -> Synthesis is fixed at compile
//! time. Opening and FinalDefense run both sides concurrently behind
//! `join_both`; one failed side fails the whole run at that barrier.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::join::join_both;
use crate::debate::{
    debate_signature, CrossExamination, DebateContext, DebatePrompts, DebateRecord, FinalDefense,
    OpeningArgument, Participant, Role, StagePayload, StageTimings, Synthesis, SynthesisOutput,
};
use crate::llm::{parse_structured_result, with_retry, LlmError, ParseError, RetryPolicy, TextGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStage {
    Opening,
    CrossExamination,
    FinalDefense,
    Synthesis,
}

impl std::fmt::Display for DebateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebateStage::Opening => write!(f, "opening"),
            DebateStage::CrossExamination => write!(f, "cross_examination"),
            DebateStage::FinalDefense => write!(f, "final_defense"),
            DebateStage::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Ticker-fatal failure of a debate run
#[derive(Error, Debug)]
pub enum DebateError {
    #[error("{stage} stage: {participant} generation failed: {source}")]
    Generation {
        stage: DebateStage,
        participant: Participant,
        source: LlmError,
    },

    #[error("{stage} stage: {participant} returned malformed output: {source}")]
    Malformed {
        stage: DebateStage,
        participant: Participant,
        source: ParseError,
    },
}

impl DebateError {
    pub fn stage(&self) -> DebateStage {
        match self {
            DebateError::Generation { stage, .. } | DebateError::Malformed { stage, .. } => *stage,
        }
    }

    pub fn participant(&self) -> Participant {
        match self {
            DebateError::Generation { participant, .. } | DebateError::Malformed { participant, .. } => {
                *participant
            }
        }
    }
}

/// Both openings in hand
#[derive(Debug, Clone)]
pub struct Opened {
    pub context: DebateContext,
    pub bull: OpeningArgument,
    pub bear: OpeningArgument,
    pub timings: StageTimings,
}

#[derive(Debug, Clone)]
pub struct CrossExamined {
    pub opened: Opened,
    pub cross: CrossExamination,
}

#[derive(Debug, Clone)]
pub struct Defended {
    pub examined: CrossExamined,
    pub bull_defense: FinalDefense,
    pub bear_defense: FinalDefense,
}

impl Defended {
    fn conclude(self, synthesis: Synthesis, synthesis_ms: u64) -> DebateRecord {
        let CrossExamined { opened, cross } = self.examined;
        let mut timings = opened.timings;
        timings.synthesis_ms = synthesis_ms;

        let signature = debate_signature(
            &opened.context.ticker,
            opened.context.trigger_date,
            synthesis.synthesized_at,
        );
        let stored_at = synthesis.synthesized_at;

        DebateRecord {
            ticker: opened.context.ticker.clone(),
            trigger_date: opened.context.trigger_date,
            context: opened.context,
            bull_opening: opened.bull,
            bear_opening: opened.bear,
            cross_examination: cross,
            bull_defense: self.bull_defense,
            bear_defense: self.bear_defense,
            synthesis,
            signature,
            stage_timings: timings,
            created_at: stored_at,
            updated_at: stored_at,
            enrichment: None,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn parse_stage<T: StagePayload>(stage: DebateStage, participant: Participant, text: &str) -> Result<T, DebateError> {
    let payload: T = parse_structured_result(text).map_err(|source| DebateError::Malformed {
        stage,
        participant,
        source,
    })?;
    payload.validate().map_err(|message| DebateError::Malformed {
        stage,
        participant,
        source: ParseError::Invalid(message),
    })?;
    Ok(payload)
}

pub struct DebateWorkflow {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    prompts: DebatePrompts,
}

impl DebateWorkflow {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self {
            generator,
            retry,
            prompts: DebatePrompts,
        }
    }

    /// Run all four stages. Nothing is persisted here.
    pub async fn run(&self, context: DebateContext) -> Result<DebateRecord, DebateError> {
        info!(ticker = %context.ticker, trigger = %context.trigger_type, "Debate started");

        let opened = self.open(context).await?;
        let examined = self.cross_examine(opened).await?;
        let defended = self.defend(examined).await?;
        let record = self.synthesize(defended).await?;

        info!(
            ticker = %record.ticker,
            verdict = %record.synthesis.verdict,
            confidence = record.synthesis.confidence,
            signature = %record.signature,
            "Debate concluded"
        );
        Ok(record)
    }

    /// One stage call: retried generation, then parse. Parse failures are never retried.
    async fn ask<T: StagePayload>(
        &self,
        stage: DebateStage,
        participant: Participant,
        prompt: String,
    ) -> Result<T, DebateError> {
        let system = self.prompts.system(participant);
        let label = format!("{}:{}", stage, participant);

        let text = with_retry(&self.retry, &label, || self.generator.generate(&prompt, Some(system)))
            .await
            .map_err(|source| DebateError::Generation {
                stage,
                participant,
                source,
            })?;

        debug!(call = %label, chars = text.len(), "Stage output received");
        parse_stage(stage, participant, &text)
    }

    pub async fn open(&self, context: DebateContext) -> Result<Opened, DebateError> {
        let started = Instant::now();
        let bull_prompt = self.prompts.opening(&context, Role::Bull);
        let bear_prompt = self.prompts.opening(&context, Role::Bear);

        let (bull, bear) = join_both(
            self.ask::<OpeningArgument>(DebateStage::Opening, Participant::Bull, bull_prompt),
            self.ask::<OpeningArgument>(DebateStage::Opening, Participant::Bear, bear_prompt),
        )
        .await
        .map_err(|failure| {
            warn!(ticker = %context.ticker, branch = ?failure.branch, "Opening barrier failed");
            failure.error
        })?;

        let timings = StageTimings {
            opening_ms: elapsed_ms(started),
            ..StageTimings::default()
        };
        debug!(ticker = %context.ticker, elapsed_ms = timings.opening_ms, "Openings complete");

        Ok(Opened {
            context,
            bull,
            bear,
            timings,
        })
    }

    pub async fn cross_examine(&self, opened: Opened) -> Result<CrossExamined, DebateError> {
        let started = Instant::now();
        let prompt = self
            .prompts
            .cross_examination(&opened.context, &opened.bull, &opened.bear);

        let cross: CrossExamination = self
            .ask(DebateStage::CrossExamination, Participant::Examiner, prompt)
            .await?;

        let mut opened = opened;
        opened.timings.cross_examination_ms = elapsed_ms(started);
        Ok(CrossExamined { opened, cross })
    }

    pub async fn defend(&self, examined: CrossExamined) -> Result<Defended, DebateError> {
        let started = Instant::now();
        let ctx = &examined.opened.context;
        let bull_prompt = self.prompts.final_defense(
            ctx,
            Role::Bull,
            &examined.opened.bull,
            examined.cross.against(Role::Bull),
        );
        let bear_prompt = self.prompts.final_defense(
            ctx,
            Role::Bear,
            &examined.opened.bear,
            examined.cross.against(Role::Bear),
        );

        let (bull_defense, bear_defense) = join_both(
            self.ask::<FinalDefense>(DebateStage::FinalDefense, Participant::Bull, bull_prompt),
            self.ask::<FinalDefense>(DebateStage::FinalDefense, Participant::Bear, bear_prompt),
        )
        .await
        .map_err(|failure| {
            warn!(ticker = %ctx.ticker, branch = ?failure.branch, "Final defense barrier failed");
            failure.error
        })?;

        let mut examined = examined;
        examined.opened.timings.final_defense_ms = elapsed_ms(started);
        Ok(Defended {
            examined,
            bull_defense,
            bear_defense,
        })
    }

    pub async fn synthesize(&self, defended: Defended) -> Result<DebateRecord, DebateError> {
        let started = Instant::now();
        let opened = &defended.examined.opened;
        let prompt = self.prompts.synthesis(
            &opened.context,
            &opened.bull,
            &opened.bear,
            &defended.examined.cross,
            &defended.bull_defense,
            &defended.bear_defense,
        );
        let system = self.prompts.system(Participant::Judge);
        let label = format!("{}:{}", DebateStage::Synthesis, Participant::Judge);

        let generation = with_retry(&self.retry, &label, || {
            self.generator.generate_with_reasoning(&prompt, Some(system))
        })
        .await
        .map_err(|source| DebateError::Generation {
            stage: DebateStage::Synthesis,
            participant: Participant::Judge,
            source,
        })?;

        let output: SynthesisOutput = parse_stage(DebateStage::Synthesis, Participant::Judge, &generation.text)?;
        let synthesis = Synthesis::from_output(output, generation.reasoning, Utc::now());

        Ok(defended.conclude(synthesis, elapsed_ms(started)))
    }
}
