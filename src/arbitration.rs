// ===============================
// src/arbitration.rs
// ===============================
//
// Collapse satu set mandate (satu symbol, satu cycle) menjadi tepat satu Decision.
// Urutan langkah tetap:
//   0) buang mandate yang expired untuk cycle ini
//   1) admissibility filter berdasarkan PositionState
//   2) set kosong                         -> NoAction
//   3) ada EXIT                           -> Exit (short-circuit)
//   4) ambil authority_rank tertinggi
//   5) >1 mandate di rank itu & berbeda   -> NoAction, selain itu tipe mandate tsb
//
use crate::domain::{Decision, ExpiryPolicy, Mandate, MandateType, PositionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger { WindowClose, StateUpdate }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle { pub id: u64, pub trigger: CycleTrigger }

impl Cycle {
    pub fn window_close(id: u64) -> Self { Self { id, trigger: CycleTrigger::WindowClose } }
}

/// Expiry flag, evaluated once per cycle.
pub fn is_expired(m: &Mandate, cycle: &Cycle) -> bool {
    match m.expiry {
        ExpiryPolicy::Immediate => m.cycle != cycle.id,
        ExpiryPolicy::NextCloseOnly => m.cycle != cycle.id || cycle.trigger != CycleTrigger::WindowClose,
    }
}

pub fn is_admissible(kind: MandateType, state: PositionState) -> bool {
    use MandateType::*;
    match state {
        PositionState::Flat => matches!(kind, Entry | Hold | Block),
        PositionState::Entering => matches!(kind, Exit | Hold | Block),
        PositionState::Open => matches!(kind, Exit | Reduce | Hold | Block),
        PositionState::Reducing => matches!(kind, Exit | Hold | Block),
        PositionState::Closing => matches!(kind, Hold | Block),
    }
}

fn to_decision(m: &Mandate) -> Decision {
    match m.kind {
        MandateType::Entry => match m.direction {
            Some(dir) => Decision::Entry(dir),
            // ENTRY tanpa arah tidak bisa dieksekusi
            None => Decision::NoAction,
        },
        MandateType::Exit => Decision::Exit,
        MandateType::Reduce => Decision::Reduce,
        MandateType::Hold => Decision::Hold,
        MandateType::Block => Decision::Block,
    }
}

pub fn arbitrate(mandates: &[Mandate], state: PositionState, cycle: &Cycle) -> Decision {
    let admissible: Vec<&Mandate> = mandates
        .iter()
        .filter(|m| !is_expired(m, cycle))
        .filter(|m| is_admissible(m.kind, state))
        .collect();

    if admissible.is_empty() {
        return Decision::NoAction;
    }

    if admissible.iter().any(|m| m.kind == MandateType::Exit) {
        return Decision::Exit;
    }

    let top_rank = admissible.iter().map(|m| m.authority_rank).max().unwrap_or(i32::MIN);
    let top: Vec<&&Mandate> = admissible.iter().filter(|m| m.authority_rank == top_rank).collect();

    let first = top[0];
    let conflict = top[1..]
        .iter()
        .any(|m| m.kind != first.kind || (m.kind == MandateType::Entry && m.direction != first.direction));
    if conflict {
        return Decision::NoAction;
    }
    to_decision(first)
}
