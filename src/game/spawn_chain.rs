use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::chance::{BonusSlot, LevelSource, level_of, resolve_with};

/// Session-wide gate checked before any slot is looked at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainGate {
    pub unlock_id: String,
    pub min_level: i32,
}

impl ChainGate {
    pub fn is_open(&self, levels: Option<&dyn LevelSource>) -> bool {
        level_of(levels, &self.unlock_id) >= self.min_level
    }
}

pub fn is_unlocked(slot: &BonusSlot, levels: Option<&dyn LevelSource>) -> bool {
    if slot.always_unlocked {
        return true;
    }
    match &slot.unlock {
        Some(req) => level_of(levels, &req.source_id) >= req.min_level,
        None => false,
    }
}

/// Rolls the dependent slot chain once and returns how many slots in a row
/// succeeded from the front.
///
/// Slot `i` is only rolled after slot `i - 1` succeeded. The first locked,
/// zero-chance or lost slot ends the chain; later slots are never rolled and
/// never consume randomness.
pub fn roll_chain_count<R>(
    slots: &[BonusSlot],
    gate: Option<&ChainGate>,
    levels: Option<&dyn LevelSource>,
    rng: &mut R,
) -> usize
where
    R: Rng,
{
    if let Some(gate) = gate
        && !gate.is_open(levels)
    {
        info!(
            "Bonus chain gated: '{}' below level {}",
            gate.unlock_id, gate.min_level
        );
        return 0;
    }

    let mut successes = 0;
    for slot in slots {
        if !is_unlocked(slot, levels) {
            debug!("Slot '{}' locked; chain stops at {successes}", slot.id);
            break;
        }
        let chance = resolve_with(slot, levels);
        if chance <= 0.0 {
            debug!("Slot '{}' has zero chance; chain stops at {successes}", slot.id);
            break;
        }
        let sample: f32 = rng.random();
        let hit = sample <= chance;
        debug!(
            "Slot '{}': chance={chance:.4}, sample={sample:.4}, hit={hit}",
            slot.id
        );
        if !hit {
            break;
        }
        successes += 1;
    }
    info!("Bonus chain rolled {successes}/{} slots", slots.len());
    successes
}

#[cfg(test)]
mod tests {
    use super::{ChainGate, is_unlocked, roll_chain_count};
    use crate::game::chance::{BonusSlot, LevelTable, UnlockRequirement};
    use rand::rngs::StdRng;
    use rand::{Rng, RngCore, SeedableRng};

    /// Counts draws so tests can see which slots were actually rolled.
    struct CountingRng<R> {
        inner: R,
        draws: usize,
    }

    impl<R: RngCore> RngCore for CountingRng<R> {
        fn next_u32(&mut self) -> u32 {
            self.draws += 1;
            self.inner.next_u32()
        }
        fn next_u64(&mut self) -> u64 {
            self.draws += 1;
            self.inner.next_u64()
        }
        fn fill_bytes(&mut self, dst: &mut [u8]) {
            self.draws += 1;
            self.inner.fill_bytes(dst);
        }
    }

    fn certain(id: &str) -> BonusSlot {
        BonusSlot::new(id, 1.0)
    }

    #[test]
    fn certain_chain_succeeds_fully() {
        let slots = vec![certain("a"), certain("b"), certain("c")];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(roll_chain_count(&slots, None, None, &mut rng), 3);
    }

    #[test]
    fn zero_chance_slot_stops_chain_without_rolling() {
        let slots = vec![certain("a"), BonusSlot::new("b", 0.0), certain("c")];
        let mut rng = CountingRng {
            inner: StdRng::seed_from_u64(2),
            draws: 0,
        };
        assert_eq!(roll_chain_count(&slots, None, None, &mut rng), 1);
        assert_eq!(rng.draws, 1, "only the first slot may consume randomness");
    }

    #[test]
    fn locked_slot_stops_chain() {
        let mut locked = certain("b");
        locked.always_unlocked = false;
        locked.unlock = Some(UnlockRequirement {
            source_id: "drill".to_string(),
            min_level: 2,
        });
        let slots = vec![certain("a"), locked.clone(), certain("c")];

        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(roll_chain_count(&slots, None, None, &mut rng), 1);

        let mut levels = LevelTable::new();
        levels.set("drill", 2);
        assert!(is_unlocked(&locked, Some(&levels)));
        assert_eq!(roll_chain_count(&slots, None, Some(&levels), &mut rng), 3);
    }

    #[test]
    fn closed_gate_short_circuits_everything() {
        let slots = vec![certain("a"), certain("b")];
        let gate = ChainGate {
            unlock_id: "bonus".to_string(),
            min_level: 1,
        };
        let mut rng = CountingRng {
            inner: StdRng::seed_from_u64(4),
            draws: 0,
        };
        assert_eq!(roll_chain_count(&slots, Some(&gate), None, &mut rng), 0);
        assert_eq!(rng.draws, 0);

        let mut levels = LevelTable::new();
        levels.set("bonus", 1);
        assert_eq!(roll_chain_count(&slots, Some(&gate), Some(&levels), &mut rng), 2);
    }

    #[test]
    fn same_seed_same_count() {
        let slots: Vec<_> = (0..6).map(|i| BonusSlot::new(format!("s{i}"), 0.6)).collect();
        let a = roll_chain_count(&slots, None, None, &mut StdRng::seed_from_u64(77));
        let b = roll_chain_count(&slots, None, None, &mut StdRng::seed_from_u64(77));
        assert_eq!(a, b);
    }

    #[test]
    fn count_is_bounded_and_prefix_shaped() {
        let mut rng = StdRng::seed_from_u64(0xC4A1);
        for _ in 0..2_000 {
            let len = rng.random_range(0..8);
            let slots: Vec<_> = (0..len)
                .map(|i| BonusSlot::new(format!("s{i}"), rng.random_range(-0.2..1.2)))
                .collect();
            let mut roll_rng = CountingRng {
                inner: StdRng::seed_from_u64(rng.next_u64()),
                draws: 0,
            };
            let count = roll_chain_count(&slots, None, None, &mut roll_rng);
            assert!(count <= slots.len());
            // Every success consumed one draw and at most one losing draw follows.
            assert!(roll_rng.draws >= count && roll_rng.draws <= count + 1);
            assert!(slots[..count].iter().all(|s| s.base_chance > 0.0));
        }
    }
}
