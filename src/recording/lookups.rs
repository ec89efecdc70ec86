//! JSON lookup files used to resolve sessions during replay.
//!
//! - `profiles.json`: `{ "<user_id>": { "average_satisfaction": .., "total_diaries": .. } }`
//! - `cards.json`: `[ { "id": .., "image_url": .., "content": .. }, .. ]`
//! - layout files: a [`Suggestion`] or a bare `{ "<card_id>": { "row": .., "col": .., "order_index": .. } }`

use crate::env::card::{card_lookup, CardLookup, CardRecord, UserProfile};
use crate::env::placement::Layout;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub type ProfileLookup = HashMap<String, UserProfile>;

pub fn load_profiles<P: AsRef<Path>>(path: P) -> Result<ProfileLookup> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let profiles: ProfileLookup = serde_json::from_str(&raw)?;
    log::info!("📂 Loaded {} user profiles from {}", profiles.len(), path.as_ref().display());
    Ok(profiles)
}

pub fn load_cards<P: AsRef<Path>>(path: P) -> Result<CardLookup> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let records: Vec<CardRecord> = serde_json::from_str(&raw)?;
    let lookup = card_lookup(records);
    log::info!("📂 Loaded {} cards from {}", lookup.len(), path.as_ref().display());
    Ok(lookup)
}

/// A suggested layout and the session it was made for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub session_id: String,
    pub layout: Layout,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LayoutFile {
    Wrapped { layout: Layout },
    Bare(Layout),
}

/// Read a layout saved as a [`Suggestion`] or as a bare layout map
pub fn load_layout<P: AsRef<Path>>(path: P) -> Result<Layout> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let layout = match serde_json::from_str::<LayoutFile>(&raw)? {
        LayoutFile::Wrapped { layout } | LayoutFile::Bare(layout) => layout,
    };
    log::debug!("📂 Loaded layout of {} cards from {}", layout.len(), path.as_ref().display());
    Ok(layout)
}
