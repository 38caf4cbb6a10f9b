pub mod battle;
pub mod card_index;

pub use battle::{
    normalize, BattleRecord, BattleResult, CardRef, DeckEncoding, Normalized, PlayerRecord,
    RawBattle, RawParticipant, Rejection, DECK_SIZE,
};
pub use card_index::{CardDescriptor, CardIndex};
