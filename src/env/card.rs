use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Card features fed to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub has_image: bool,
    pub has_content: bool,
}

impl Card {
    pub fn new(id: impl Into<String>, has_image: bool, has_content: bool) -> Self {
        Self {
            id: id.into(),
            has_image,
            has_content,
        }
    }

    /// `[has_image, has_content]` as floats
    pub fn features(&self) -> [f32; 2] {
        [
            if self.has_image { 1.0 } else { 0.0 },
            if self.has_content { 1.0 } else { 0.0 },
        ]
    }
}

/// Card row as stored by the diary service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl From<CardRecord> for Card {
    fn from(record: CardRecord) -> Self {
        let present = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());
        Card {
            has_image: present(&record.image_url),
            has_content: present(&record.content),
            id: record.id,
        }
    }
}

/// card id -> features
pub type CardLookup = HashMap<String, Card>;

/// Build a lookup from a list of stored cards
pub fn card_lookup(records: impl IntoIterator<Item = CardRecord>) -> CardLookup {
    records
        .into_iter()
        .map(Card::from)
        .map(|card| (card.id.clone(), card))
        .collect()
}

/// User features fed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// Mean satisfaction in [0, 1]
    pub average_satisfaction: f32,
    pub total_diaries: u32,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            average_satisfaction: 0.5,
            total_diaries: 1,
        }
    }
}

impl UserProfile {
    /// Diary count is scaled assuming about a hundred diaries per user
    pub fn features(&self) -> [f32; 2] {
        [self.average_satisfaction, self.total_diaries as f32 / 100.0]
    }
}
