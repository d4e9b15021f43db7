//! Alert state machine (C7) — sustained-threshold debouncer with
//! an instant-critical override for evidence the system trusts unconditionally
//! (currently only OOM kills).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Ok,
    Inconclusive,
    Degraded,
    Critical,
}

impl Health {
    pub fn from_primary_score(any_evidence_fired: bool, trust_gate_failed: bool, primary_score: f64) -> Self {
        if primary_score <= 0.0 {
            if any_evidence_fired && trust_gate_failed {
                Health::Inconclusive
            } else {
                Health::Ok
            }
        } else if primary_score >= 60.0 {
            Health::Critical
        } else if primary_score >= 25.0 {
            Health::Degraded
        } else {
            Health::Ok
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertState {
    pub current: Health,
    candidate: Health,
    candidate_ticks: u32,
    sustained_required: u32,
}

impl AlertState {
    /// `sustained_required = max(3, ceil(15s / interval_s))`.
    pub fn new(interval_secs: f64) -> Self {
        let interval = interval_secs.max(0.001);
        let sustained_required = (15.0 / interval).ceil().max(3.0) as u32;
        Self {
            current: Health::Ok,
            candidate: Health::Ok,
            candidate_ticks: 0,
            sustained_required,
        }
    }

    /// Applies one tick of health input. Returns the (possibly unchanged)
    /// current health.
    pub fn update(&mut self, health: Health, has_crit_evidence: bool) -> Health {
        if has_crit_evidence && health >= Health::Critical {
            self.current = Health::Critical;
            self.candidate = Health::Critical;
            self.candidate_ticks = 0;
            return self.current;
        }

        if health == self.candidate {
            self.candidate_ticks += 1;
        } else {
            self.candidate = health;
            self.candidate_ticks = 1;
        }

        if self.candidate_ticks >= self.sustained_required && self.candidate != self.current {
            self.current = self.candidate;
        }

        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_required_floors_at_three() {
        assert_eq!(AlertState::new(30.0).sustained_required, 3);
        assert_eq!(AlertState::new(5.0).sustained_required, 3);
        assert_eq!(AlertState::new(1.0).sustained_required, 15);
    }

    #[test]
    fn escalation_requires_sustained_ticks() {
        let mut s = AlertState::new(5.0);
        assert_eq!(s.update(Health::Degraded, false), Health::Ok);
        assert_eq!(s.update(Health::Degraded, false), Health::Ok);
        assert_eq!(s.update(Health::Degraded, false), Health::Degraded);
    }

    #[test]
    fn instant_crit_override_sets_current_in_one_call() {
        let mut s = AlertState::new(5.0);
        assert_eq!(s.update(Health::Critical, true), Health::Critical);
    }

    #[test]
    fn inconclusive_cannot_promote_to_critical_through_sustain_path() {
        let mut s = AlertState::new(5.0);
        for _ in 0..5 {
            assert_ne!(s.update(Health::Inconclusive, false), Health::Critical);
        }
    }

    #[test]
    fn flapping_resets_candidate_ticks() {
        let mut s = AlertState::new(5.0);
        s.update(Health::Degraded, false);
        s.update(Health::Degraded, false);
        assert_eq!(s.update(Health::Ok, false), Health::Ok);
        assert_eq!(s.update(Health::Degraded, false), Health::Ok);
    }
}
