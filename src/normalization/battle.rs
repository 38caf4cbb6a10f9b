use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnknownCardError;
use crate::normalization::card_index::CardIndex;

pub const DECK_SIZE: usize = 8;

/// One side's participant as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParticipant {
    pub tag: String,
    pub deck_cards: Vec<String>,
    pub crowns: u32,
}

/// One match as returned by the provider, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBattle {
    pub team: Vec<RawParticipant>,
    pub opponent: Vec<RawParticipant>,
}

/// A deck slot: an index into the card index, or the card name in
/// human-readable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardRef {
    Index(u32),
    Name(String),
}

impl CardRef {
    /// The deck encoding that writes this kind of slot.
    pub fn encoding(&self) -> DeckEncoding {
        match self {
            CardRef::Index(_) => DeckEncoding::Indexed,
            CardRef::Name(_) => DeckEncoding::HumanReadable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeckEncoding {
    #[default]
    Indexed,
    HumanReadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleResult {
    Win,
    Loss,
    Draw,
}

impl BattleResult {
    pub fn from_crowns(team: u32, opponent: u32) -> Self {
        match team.cmp(&opponent) {
            Ordering::Greater => BattleResult::Win,
            Ordering::Less => BattleResult::Loss,
            Ordering::Equal => BattleResult::Draw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub tag: String,
    pub deck: [CardRef; DECK_SIZE],
    pub crowns: u32,
}

/// Canonical persisted form of one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub team_player: PlayerRecord,
    pub opponent_player: PlayerRecord,
    pub result: BattleResult,
}

impl BattleRecord {
    /// Every deck slot, team first.
    pub fn cards(&self) -> impl Iterator<Item = &CardRef> {
        self.team_player.deck.iter().chain(self.opponent_player.deck.iter())
    }
}

/// Why a battle was skipped without being an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TeamSize(usize),
    OpponentSize(usize),
    DeckSize { tag: String, len: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TeamSize(n) => write!(f, "team side has {n} participants"),
            Rejection::OpponentSize(n) => write!(f, "opponent side has {n} participants"),
            Rejection::DeckSize { tag, len } => {
                write!(f, "deck of {tag} has {len} cards, expected {DECK_SIZE}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Record(BattleRecord),
    Rejected(Rejection),
}

/// Turn a provider battle into a [`BattleRecord`].
///
/// Only 1v1 battles with full decks are kept; anything else is `Rejected`.
/// A card name missing from `index` drops the whole battle via `Err`.
pub fn normalize(
    raw: &RawBattle,
    index: &CardIndex,
    encoding: DeckEncoding,
) -> Result<Normalized, UnknownCardError> {
    let team = match raw.team.as_slice() {
        [one] => one,
        other => return Ok(Normalized::Rejected(Rejection::TeamSize(other.len()))),
    };
    let opponent = match raw.opponent.as_slice() {
        [one] => one,
        other => return Ok(Normalized::Rejected(Rejection::OpponentSize(other.len()))),
    };

    let team_player = match encode_player(team, index, encoding)? {
        Ok(p) => p,
        Err(rejection) => return Ok(Normalized::Rejected(rejection)),
    };
    let opponent_player = match encode_player(opponent, index, encoding)? {
        Ok(p) => p,
        Err(rejection) => return Ok(Normalized::Rejected(rejection)),
    };

    Ok(Normalized::Record(BattleRecord {
        result: BattleResult::from_crowns(team.crowns, opponent.crowns),
        team_player,
        opponent_player,
    }))
}

fn encode_player(
    participant: &RawParticipant,
    index: &CardIndex,
    encoding: DeckEncoding,
) -> Result<Result<PlayerRecord, Rejection>, UnknownCardError> {
    if participant.deck_cards.len() != DECK_SIZE {
        return Ok(Err(Rejection::DeckSize {
            tag: participant.tag.clone(),
            len: participant.deck_cards.len(),
        }));
    }

    let mut deck: [CardRef; DECK_SIZE] = std::array::from_fn(|_| CardRef::Index(0));
    for (slot, name) in deck.iter_mut().zip(&participant.deck_cards) {
        let idx = index
            .index_of(name)
            .ok_or_else(|| UnknownCardError { name: name.clone() })?;
        *slot = match encoding {
            DeckEncoding::Indexed => CardRef::Index(idx),
            DeckEncoding::HumanReadable => CardRef::Name(name.clone()),
        };
    }

    Ok(Ok(PlayerRecord {
        tag: participant.tag.clone(),
        deck,
        crowns: participant.crowns,
    }))
}
