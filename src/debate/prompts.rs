//! Prompt construction for the four debate stages
//!
//! Every prompt ends with the exact JSON shape the stage parser expects.

use super::sanitize::{sanitize_argument, sanitize_name};
use super::{CrossExamination, DebateContext, FinalDefense, OpeningArgument, Participant, Rebuttal, Role};
use crate::trading::signals::MaWindow;

const OPENING_SCHEMA: &str = r#"{"thesis": "one-paragraph thesis", "key_points": ["point", "..."]}"#;
const CROSS_SCHEMA: &str = r#"{"against_bull": [{"target": "bull point", "rebuttal": "why it fails"}], "against_bear": [{"target": "bear point", "rebuttal": "why it fails"}]}"#;
const DEFENSE_SCHEMA: &str = r#"{"defense": "closing defense", "maintained_points": ["..."], "concessions": ["..."]}"#;
const SYNTHESIS_SCHEMA: &str = r#"{"verdict": "Strong Buy | Neutral | Short", "confidence": 0-100, "consensus": ["point both sides accept"], "summary": "two or three sentences"}"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct DebatePrompts;

impl DebatePrompts {
    pub fn system(&self, participant: Participant) -> &'static str {
        match participant {
            Participant::Bull => {
                "You are a bullish equity analyst. Argue for buying the stock using only the \
                 technical facts provided. Respond with a single JSON object and nothing else."
            }
            Participant::Bear => {
                "You are a skeptical equity analyst. Argue against buying the stock using only the \
                 technical facts provided. Respond with a single JSON object and nothing else."
            }
            Participant::Examiner => {
                "You are a neutral cross-examiner. Attack the weakest points of both analysts \
                 evenly. Respond with a single JSON object and nothing else."
            }
            Participant::Judge => {
                "You are the investment committee chair. Weigh both sides and issue exactly one \
                 verdict: Strong Buy, Neutral or Short. Respond with a single JSON object and nothing else."
            }
        }
    }

    fn context_block(&self, ctx: &DebateContext) -> String {
        let windows: Vec<String> = ctx
            .active_signals
            .iter()
            .map(|w| format!("{} ({})", w.label(), ctx.signal.direction(*w)))
            .collect();
        let trigger_note = match ctx.trigger_type {
            MaWindow::Ma250 => "long-term trend change",
            MaWindow::Ma60 => "medium-term trend change",
            MaWindow::Ma20 => "short-term momentum change",
        };

        format!(
            "Ticker: {ticker}\nCompany: {name}\nTrigger date: {date}\nSelection track: {track}\n\
             Close: {close:.2} (previous {prev:.2}, change {pct:+.2}%)\n\
             Moving-average crossovers: {windows}\nPrimary trigger: {trigger} ({note})\n",
            ticker = ctx.ticker,
            name = sanitize_name(&ctx.name),
            date = ctx.trigger_date,
            track = ctx.track,
            close = ctx.signal.close_price,
            prev = ctx.signal.prev_close_price,
            pct = ctx.signal.price_change_pct,
            windows = windows.join(", "),
            trigger = ctx.trigger_type.label(),
            note = trigger_note,
        )
    }

    fn opening_block(&self, label: &str, opening: &OpeningArgument) -> String {
        let mut block = format!("{} thesis: {}\n", label, sanitize_argument(&opening.thesis));
        for point in &opening.key_points {
            block.push_str(&format!("- {}\n", sanitize_argument(point)));
        }
        block
    }

    fn rebuttal_block(&self, rebuttals: &[Rebuttal]) -> String {
        if rebuttals.is_empty() {
            return "(no rebuttals were raised)\n".to_string();
        }
        rebuttals
            .iter()
            .map(|r| {
                format!(
                    "- On \"{}\": {}\n",
                    sanitize_argument(&r.target),
                    sanitize_argument(&r.rebuttal)
                )
            })
            .collect()
    }

    fn defense_block(&self, label: &str, defense: &FinalDefense) -> String {
        let mut block = format!("{} defense: {}\n", label, sanitize_argument(&defense.defense));
        if !defense.maintained_points.is_empty() {
            let maintained: Vec<String> = defense.maintained_points.iter().map(|p| sanitize_argument(p)).collect();
            block.push_str(&format!("Maintained: {}\n", maintained.join("; ")));
        }
        if !defense.concessions.is_empty() {
            let conceded: Vec<String> = defense.concessions.iter().map(|c| sanitize_argument(c)).collect();
            block.push_str(&format!("Conceded: {}\n", conceded.join("; ")));
        }
        block
    }

    pub fn opening(&self, ctx: &DebateContext, role: Role) -> String {
        let stance = match role {
            Role::Bull => "Make the strongest case that this crossover is a buying opportunity.",
            Role::Bear => "Make the strongest case that this crossover is a trap or should be shorted.",
        };
        format!(
            "{}\n{}\nReply with JSON: {}",
            self.context_block(ctx),
            stance,
            OPENING_SCHEMA
        )
    }

    pub fn cross_examination(&self, ctx: &DebateContext, bull: &OpeningArgument, bear: &OpeningArgument) -> String {
        format!(
            "{}\n{}\n{}\nChallenge the specific points of each side.\nReply with JSON: {}",
            self.context_block(ctx),
            self.opening_block("Bull", bull),
            self.opening_block("Bear", bear),
            CROSS_SCHEMA
        )
    }

    pub fn final_defense(
        &self,
        ctx: &DebateContext,
        role: Role,
        own_opening: &OpeningArgument,
        rebuttals: &[Rebuttal],
    ) -> String {
        format!(
            "{}\nYour opening:\n{}\nRebuttals raised against you:\n{}\n\
             Defend what still holds and concede what does not.\nReply with JSON: {}",
            self.context_block(ctx),
            self.opening_block(if role == Role::Bull { "Bull" } else { "Bear" }, own_opening),
            self.rebuttal_block(rebuttals),
            DEFENSE_SCHEMA
        )
    }

    pub fn synthesis(
        &self,
        ctx: &DebateContext,
        bull: &OpeningArgument,
        bear: &OpeningArgument,
        cross: &CrossExamination,
        bull_defense: &FinalDefense,
        bear_defense: &FinalDefense,
    ) -> String {
        format!(
            "{}\n{}\n{}\nRebuttals against the bull:\n{}\nRebuttals against the bear:\n{}\n{}\n{}\n\
             Issue the committee verdict.\nReply with JSON: {}",
            self.context_block(ctx),
            self.opening_block("Bull", bull),
            self.opening_block("Bear", bear),
            self.rebuttal_block(cross.against(Role::Bull)),
            self.rebuttal_block(cross.against(Role::Bear)),
            self.defense_block("Bull", bull_defense),
            self.defense_block("Bear", bear_defense),
            SYNTHESIS_SCHEMA
        )
    }
}
