// ===============================
// src/mandate.rs
// ===============================
//
// Mandate emitter: fungsi murni dari (primitives, position state) untuk satu
// symbol dan satu cycle. Tiap rule meng-emit nol atau satu mandate.
//
//   entry          : promoted && net_flow != 0 && FLAT      -> ENTRY(arah flow)
//   reversal exit  : promoted && arah flow lawan posisi     -> EXIT
//   cascade exit   : liquidation_count >= exit threshold    -> EXIT
//   stress reduce  : liquidation_count >= 1                 -> REDUCE
//   data gap       : trade_count null / 0                   -> BLOCK
//   hold           : bukan FLAT && tidak promoted           -> HOLD
//
// Tidak ada filter legalitas berbasis state selain syarat ENTRY=FLAT;
// admissibility diputuskan di arbitrator.
//
use crate::config::PipelineCfg;
use crate::domain::{Direction, ExpiryPolicy, Mandate, MandateType, PositionState};
use crate::primitives::{PrimitiveSet, LIQUIDATION_COUNT, NET_FLOW, TRADE_COUNT, WINDOW_PROMOTED};

pub struct MandateEmitter {
    exit_liquidation_count: u32,
}

impl MandateEmitter {
    pub fn new(cfg: &PipelineCfg) -> Self {
        Self { exit_liquidation_count: cfg.exit_liquidation_count }
    }

    pub fn emit(
        &self,
        symbol: &str,
        cycle: u64,
        p: &PrimitiveSet,
        state: PositionState,
        held: Option<Direction>,
    ) -> Vec<Mandate> {
        let mut out = Vec::new();
        let promoted = p.get_flag(WINDOW_PROMOTED) == Some(true);
        let flow_dir = p.get_number(NET_FLOW).and_then(Direction::from_flow);
        let liquidations = p.get_number(LIQUIDATION_COUNT);

        if promoted && state == PositionState::Flat {
            if let Some(dir) = flow_dir {
                out.push(Mandate::new(symbol, MandateType::Entry, Some(dir), ExpiryPolicy::NextCloseOnly, cycle));
            }
        }

        let reversal = promoted && matches!((flow_dir, held), (Some(f), Some(h)) if f == h.opposite());
        let cascade = liquidations.is_some_and(|n| n >= self.exit_liquidation_count as f64);
        if reversal || cascade {
            out.push(Mandate::new(symbol, MandateType::Exit, None, ExpiryPolicy::Immediate, cycle));
        }

        if liquidations.is_some_and(|n| n >= 1.0) {
            out.push(Mandate::new(symbol, MandateType::Reduce, None, ExpiryPolicy::Immediate, cycle));
        }

        if p.get_number(TRADE_COUNT).map_or(true, |n| n <= 0.0) {
            out.push(Mandate::new(symbol, MandateType::Block, None, ExpiryPolicy::Immediate, cycle));
        }

        if state != PositionState::Flat && !promoted {
            out.push(Mandate::new(symbol, MandateType::Hold, None, ExpiryPolicy::Immediate, cycle));
        }

        out
    }
}
