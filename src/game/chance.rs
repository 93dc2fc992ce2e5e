use log::trace;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Read-only view of the player's upgrade levels, owned by the caller.
pub trait LevelSource {
    fn level(&self, upgrade_id: &str) -> i32;
}

impl<F> LevelSource for F
where
    F: Fn(&str) -> i32,
{
    fn level(&self, upgrade_id: &str) -> i32 {
        self(upgrade_id)
    }
}

/// Static level table; unknown ids are level 0.
#[derive(Clone, Debug, Default)]
pub struct LevelTable(FxHashMap<String, i32>);

impl LevelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, upgrade_id: impl Into<String>, level: i32) {
        self.0.insert(upgrade_id.into(), level);
    }
}

impl FromIterator<(String, i32)> for LevelTable {
    fn from_iter<T: IntoIterator<Item = (String, i32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl LevelSource for LevelTable {
    fn level(&self, upgrade_id: &str) -> i32 {
        self.0.get(upgrade_id).copied().unwrap_or(0)
    }
}

/// A missing source reads as level 0 for every id.
#[inline(always)]
pub fn level_of(levels: Option<&dyn LevelSource>, upgrade_id: &str) -> i32 {
    levels.map_or(0, |l| l.level(upgrade_id))
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChanceMode {
    /// `base + level * per_level_add`
    #[default]
    LinearPerLevel,
    /// `base + sum(additive_table[..level])`
    AdditiveTable,
    /// `final_table[level]`, the row replaces the base outright.
    FinalTable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequirement {
    pub source_id: String,
    pub min_level: i32,
}

/// One gate in the chained bonus roll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusSlot {
    pub id: String,
    #[serde(default)]
    pub always_unlocked: bool,
    #[serde(default)]
    pub unlock: Option<UnlockRequirement>,
    pub base_chance: f32,
    /// Upgrade whose level feeds the chance curve. `None` pins the slot to
    /// its base chance.
    #[serde(default)]
    pub chance_source: Option<String>,
    #[serde(default)]
    pub chance_mode: ChanceMode,
    #[serde(default)]
    pub per_level_add: f32,
    #[serde(default)]
    pub additive_table: Vec<f32>,
    #[serde(default)]
    pub final_table: Vec<f32>,
    /// Upper bound for the resolved chance; `None` means 100%.
    #[serde(default)]
    pub max_chance: Option<f32>,
}

impl BonusSlot {
    pub fn new(id: impl Into<String>, base_chance: f32) -> Self {
        Self {
            id: id.into(),
            always_unlocked: true,
            unlock: None,
            base_chance,
            chance_source: None,
            chance_mode: ChanceMode::LinearPerLevel,
            per_level_add: 0.0,
            additive_table: Vec::new(),
            final_table: Vec::new(),
            max_chance: None,
        }
    }

    #[inline(always)]
    fn cap(&self) -> f32 {
        match self.max_chance {
            Some(m) if m.is_finite() => m.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }
}

#[inline(always)]
fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

/// Final chance for `slot` at upgrade `level`, always within
/// `[0, max_chance]` and `[0, 1]`.
///
/// Only the final value is clamped: a long additive table can sum past 1.0
/// on its own and is cut back here, never along the way.
pub fn resolve(slot: &BonusSlot, level: i32) -> f32 {
    let base = finite_or_zero(slot.base_chance);
    let raw = if level <= 0 || slot.chance_source.is_none() {
        base
    } else {
        match slot.chance_mode {
            ChanceMode::LinearPerLevel => {
                base + (level as f32 * finite_or_zero(slot.per_level_add)).max(0.0)
            }
            ChanceMode::AdditiveTable => {
                let take = (level as usize).min(slot.additive_table.len());
                base + slot.additive_table[..take]
                    .iter()
                    .map(|&v| finite_or_zero(v).max(0.0))
                    .sum::<f32>()
            }
            ChanceMode::FinalTable => {
                let last = slot.final_table.len().saturating_sub(1);
                slot.final_table
                    .get((level as usize).min(last))
                    .copied()
                    .map_or(base, finite_or_zero)
            }
        }
    };
    let chance = raw.clamp(0.0, slot.cap()).clamp(0.0, 1.0);
    trace!("Slot '{}' level {level}: raw={raw:.4}, chance={chance:.4}", slot.id);
    chance
}

/// [`resolve`] with the level read from the slot's chance source.
pub fn resolve_with(slot: &BonusSlot, levels: Option<&dyn LevelSource>) -> f32 {
    let level = slot
        .chance_source
        .as_deref()
        .map_or(0, |id| level_of(levels, id));
    resolve(slot, level)
}
