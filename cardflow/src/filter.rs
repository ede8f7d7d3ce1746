//! Card filtering and dashboard aggregation

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::card::{Card, CardStatus, CardType};
use crate::error::{Error, Result};

/// Either every value or one exact value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<T> {
    All,
    Only(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: PartialEq> Selection<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(expected) => expected == value,
        }
    }
}

impl<T: FromStr<Err = Error>> FromStr for Selection<T> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Selection::All)
        } else {
            s.parse().map(Selection::Only)
        }
    }
}

impl<T: fmt::Display> fmt::Display for Selection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("all"),
            Selection::Only(value) => value.fmt(f),
        }
    }
}

/// Status/type filter pair applied to the card collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardFilter {
    pub status: Selection<CardStatus>,
    pub card_type: Selection<CardType>,
}

impl CardFilter {
    pub fn new(status: Selection<CardStatus>, card_type: Selection<CardType>) -> Self {
        Self { status, card_type }
    }

    /// Parse from the `"all"`-or-exact string form used by filter controls
    pub fn parse(status: &str, card_type: &str) -> Result<Self> {
        Ok(Self {
            status: status.parse()?,
            card_type: card_type.parse()?,
        })
    }

    pub fn matches(&self, card: &Card) -> bool {
        self.status.matches(&card.status) && self.card_type.matches(&card.card_type)
    }

    /// Matching cards in their original order
    pub fn apply(&self, cards: &[Card]) -> Vec<Card> {
        cards.iter().filter(|card| self.matches(card)).cloned().collect()
    }
}

/// Summary counts for dashboard tiles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStats {
    pub total_cards: usize,
    pub active_cards: usize,
    pub virtual_cards: usize,
    pub physical_cards: usize,
    /// Raw sum of balances, currencies are not converted
    pub total_balance: Decimal,
}

impl CardStats {
    pub fn from_cards(cards: &[Card]) -> Self {
        cards.iter().fold(Self::default(), |mut stats, card| {
            stats.total_cards += 1;
            if card.status == CardStatus::Active {
                stats.active_cards += 1;
            }
            match card.card_type {
                CardType::Virtual => stats.virtual_cards += 1,
                CardType::Physical => stats.physical_cards += 1,
            }
            stats.total_balance += card.balance;
            stats
        })
    }
}
