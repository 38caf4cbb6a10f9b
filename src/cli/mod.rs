pub mod cards;
pub mod clan_tags;
pub mod harvest;
