//! Combat resolution - hits, blocks, guard breaks and clashes

use tracing::debug;

use super::fighter::{
    AttackKind, AttackStats, Fighter, FighterState, CHIP_HITSTOP, HIT_HITSTOP,
    PERFECT_BLOCK_HITSTOP,
};

/// What an attack contact turned into
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitOutcome {
    Miss,
    PerfectBlock,
    GuardBreak,
    /// Light attack into a regular block
    Chip,
    Hit { damage: f32, killed: bool },
}

/// Contact classification before anything is mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    PerfectBlock,
    GuardBreak,
    Chip,
    Hit,
}

/// A contact decided against pre-tick state, applied afterwards
#[derive(Debug, Clone, Copy)]
pub struct PendingHit {
    pub kind: ContactKind,
    pub attack_id: u32,
    pub attack_kind: AttackKind,
    pub stats: AttackStats,
    /// Knockback direction, attacker toward defender
    pub direction: f32,
}

/// Stateless hit resolution
pub struct HitResolver;

impl HitResolver {
    /// Decide whether the attacker's live attack connects and how.
    ///
    /// Only the hurtbox band matching the attack's locked stance is checked,
    /// so a stance that hides that band makes the attack whiff.
    pub fn evaluate(attacker: &Fighter, defender: &Fighter) -> Option<PendingHit> {
        if attacker.is_dead() || defender.is_dead() {
            return None;
        }

        let attack = attacker.current_attack.as_ref()?;
        if !attack.is_live() {
            return None;
        }

        let hitbox = attacker.attack_hitbox()?;
        let hurtbox = defender.hurtbox(attack.stance)?;
        if !hitbox.intersects(&hurtbox) {
            return None;
        }

        let kind = if defender.state == FighterState::Block {
            if defender.perfect_block_open() {
                ContactKind::PerfectBlock
            } else if attack.kind == AttackKind::Heavy {
                ContactKind::GuardBreak
            } else {
                ContactKind::Chip
            }
        } else {
            ContactKind::Hit
        };

        let direction = if defender.x > attacker.x {
            1.0
        } else if defender.x < attacker.x {
            -1.0
        } else {
            attacker.facing_sign()
        };

        Some(PendingHit {
            kind,
            attack_id: attack.id,
            attack_kind: attack.kind,
            stats: attack.kind.stats(),
            direction,
        })
    }

    /// Apply a previously evaluated contact
    pub fn apply(pending: &PendingHit, attacker: &mut Fighter, defender: &mut Fighter) -> HitOutcome {
        // The latch may already be gone if the attacker was hit this same tick;
        // the contact still stands as a trade.
        attacker.latch_attack(pending.attack_id);

        match pending.kind {
            ContactKind::PerfectBlock => {
                defender.perfect_block();
                attacker.apply_hitstop(PERFECT_BLOCK_HITSTOP);
                HitOutcome::PerfectBlock
            }
            ContactKind::GuardBreak => {
                defender.guard_break();
                attacker.apply_hitstop(HIT_HITSTOP);
                HitOutcome::GuardBreak
            }
            ContactKind::Chip => {
                defender.chip_block();
                attacker.apply_hitstop(CHIP_HITSTOP);
                HitOutcome::Chip
            }
            ContactKind::Hit => {
                let multiplier = attacker.register_combo_hit();
                let damage = pending.stats.damage * multiplier;
                defender.take_hit(
                    damage,
                    pending.stats.hitstun,
                    pending.direction * pending.stats.knockback,
                );
                attacker.apply_hitstop(HIT_HITSTOP);

                let killed = defender.is_dead();
                debug!(
                    attack = ?pending.attack_kind,
                    damage,
                    remaining = defender.health,
                    killed,
                    "Attack landed"
                );
                HitOutcome::Hit { damage, killed }
            }
        }
    }

    /// Evaluate and apply in one go for a single direction
    pub fn resolve(attacker: &mut Fighter, defender: &mut Fighter) -> HitOutcome {
        match Self::evaluate(attacker, defender) {
            Some(pending) => Self::apply(&pending, attacker, defender),
            None => HitOutcome::Miss,
        }
    }

    /// Both fighters have live attacks whose hitboxes overlap
    pub fn is_clash(a: &Fighter, b: &Fighter) -> bool {
        let live = |f: &Fighter| f.current_attack.as_ref().is_some_and(|atk| atk.is_live());
        if !live(a) || !live(b) {
            return false;
        }
        match (a.attack_hitbox(), b.attack_hitbox()) {
            (Some(ha), Some(hb)) => ha.intersects(&hb),
            _ => false,
        }
    }

    /// Cancel both attacks and push the fighters apart
    pub fn apply_clash(a: &mut Fighter, b: &mut Fighter) {
        let push = if a.x < b.x {
            -1.0
        } else if a.x > b.x {
            1.0
        } else {
            -a.facing_sign()
        };
        a.clash_recoil(push);
        b.clash_recoil(-push);
        debug!(a_x = a.x, b_x = b.x, "Attacks clashed");
    }
}
