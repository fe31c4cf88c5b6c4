use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PlayerId = u32;
pub type MatchId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Hard,
    Clay,
    Grass,
    Carpet,
}

impl Surface {
    pub const ALL: [Surface; 4] = [Surface::Hard, Surface::Clay, Surface::Grass, Surface::Carpet];

    /// Accepts the common spellings used by data providers ("hard court", "terre battue", ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hard" | "hard court" | "dur" | "indoor hard" | "outdoor hard" => Some(Surface::Hard),
            "clay" | "terre battue" | "red clay" | "green clay" => Some(Surface::Clay),
            "grass" | "gazon" => Some(Surface::Grass),
            "carpet" | "moquette" | "indoor carpet" => Some(Surface::Carpet),
            _ => None,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Surface::Hard => "hard",
            Surface::Clay => "clay",
            Surface::Grass => "grass",
            Surface::Carpet => "carpet",
        };
        f.write_str(s)
    }
}

/// Tournament tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    GrandSlam,
    Masters,
    Tour500,
    Tour250,
    Challenger,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Round {
    Qualifying,
    First,
    Second,
    Third,
    Fourth,
    QuarterFinal,
    SemiFinal,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// One prediction request. Identifiers are resolved against the data source before any
/// signal is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub match_id: MatchId,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub surface: Option<Surface>,
    pub category: Category,
    pub round: Round,
    /// Expected match length; drives the injury duration multiplier.
    pub expected_duration_min: u32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl MatchRequest {
    pub fn new(match_id: impl Into<MatchId>, player_a: PlayerId, player_b: PlayerId) -> Self {
        Self {
            match_id: match_id.into(),
            player_a,
            player_b,
            surface: None,
            category: Category::Tour250,
            round: Round::First,
            expected_duration_min: 100,
            scheduled_at: None,
        }
    }

    pub fn on(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn at(mut self, category: Category, round: Round) -> Self {
        self.category = category;
        self.round = round;
        self
    }

    pub fn lasting(mut self, minutes: u32) -> Self {
        self.expected_duration_min = minutes;
        self
    }

    pub fn player(&self, side: Side) -> PlayerId {
        match side {
            Side::A => self.player_a,
            Side::B => self.player_b,
        }
    }
}

/// A finished match as reported by the results feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedMatch {
    pub match_id: MatchId,
    pub winner: PlayerId,
    pub loser: PlayerId,
    pub surface: Option<Surface>,
    pub category: Category,
    pub round: Round,
    pub played_at: DateTime<Utc>,
}

/// Keys of the aggregator's factor breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Elo,
    HeadToHead,
    Form,
    Injury,
    Market,
    Environment,
    /// Informational entry, never weighted: ELO and market point in different directions.
    EloMarketDisagreement,
}

impl Factor {
    pub const WEIGHTED: [Factor; 6] = [
        Factor::Elo,
        Factor::HeadToHead,
        Factor::Form,
        Factor::Injury,
        Factor::Market,
        Factor::Environment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Factor::Elo => "elo",
            Factor::HeadToHead => "head_to_head",
            Factor::Form => "form",
            Factor::Injury => "injury",
            Factor::Market => "market",
            Factor::Environment => "environment",
            Factor::EloMarketDisagreement => "elo_market_disagreement",
        }
    }
}

/// Explicit replacement for save-time hooks: writers call `finalize` after every state change
/// so derived fields are recomputed in one visible place.
pub trait Finalize: Sized {
    fn finalize(self) -> Self;
}

pub(crate) fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}
