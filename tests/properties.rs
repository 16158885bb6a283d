use proptest::prelude::*;

use mandate_bot_rust::arbitration::{arbitrate, is_admissible, Cycle};
use mandate_bot_rust::baseline::BaselineSeries;
use mandate_bot_rust::config::WindowDurations;
use mandate_bot_rust::domain::{Decision, Direction, EventPayload, ExpiryPolicy, Mandate, MandateType, PositionState, RawEvent, Side, StreamKind};
use mandate_bot_rust::normalize::normalize;
use mandate_bot_rust::window::WindowAggregator;

fn mandate_type() -> impl Strategy<Value = MandateType> {
    prop_oneof![
        Just(MandateType::Entry),
        Just(MandateType::Exit),
        Just(MandateType::Reduce),
        Just(MandateType::Hold),
        Just(MandateType::Block),
    ]
}

fn state() -> impl Strategy<Value = PositionState> {
    prop_oneof![
        Just(PositionState::Flat),
        Just(PositionState::Entering),
        Just(PositionState::Open),
        Just(PositionState::Reducing),
        Just(PositionState::Closing),
    ]
}

fn mandate() -> impl Strategy<Value = Mandate> {
    (mandate_type(), any::<bool>()).prop_map(|(kind, long)| {
        let dir = (kind == MandateType::Entry).then(|| if long { Direction::Long } else { Direction::Short });
        Mandate::new("BTCUSDT", kind, dir, ExpiryPolicy::Immediate, 1)
    })
}

fn decision_kind(d: Decision) -> Option<MandateType> {
    match d {
        Decision::Entry(_) => Some(MandateType::Entry),
        Decision::Exit => Some(MandateType::Exit),
        Decision::Reduce => Some(MandateType::Reduce),
        Decision::Hold => Some(MandateType::Hold),
        Decision::Block => Some(MandateType::Block),
        Decision::NoAction => None,
    }
}

proptest! {
    #[test]
    fn decision_comes_from_an_admissible_mandate(ms in prop::collection::vec(mandate(), 0..8), st in state()) {
        let d = arbitrate(&ms, st, &Cycle::window_close(1));
        if let Some(kind) = decision_kind(d) {
            prop_assert!(is_admissible(kind, st));
            prop_assert!(ms.iter().any(|m| m.kind == kind));
        }
    }

    #[test]
    fn admissible_exit_always_wins(ms in prop::collection::vec(mandate(), 0..8), st in state()) {
        let mut ms = ms;
        ms.push(Mandate::new("BTCUSDT", MandateType::Exit, None, ExpiryPolicy::Immediate, 1));
        let d = arbitrate(&ms, st, &Cycle::window_close(1));
        if is_admissible(MandateType::Exit, st) {
            prop_assert_eq!(d, Decision::Exit);
        }
    }

    #[test]
    fn no_entry_while_positioned(ms in prop::collection::vec(mandate(), 0..8), st in state()) {
        prop_assume!(st != PositionState::Flat);
        let d = arbitrate(&ms, st, &Cycle::window_close(1));
        prop_assert!(!matches!(d, Decision::Entry(_)));
    }

    #[test]
    fn stale_mandates_never_count(ms in prop::collection::vec(mandate(), 1..8), st in state()) {
        // semua mandate dari cycle 1, dievaluasi di cycle 2
        prop_assert_eq!(arbitrate(&ms, st, &Cycle::window_close(2)), Decision::NoAction);
    }

    #[test]
    fn ring_keeps_last_capacity_values(values in prop::collection::vec(-1e6f64..1e6, 0..200), cap in 1usize..80) {
        let mut s = BaselineSeries::new(cap);
        for v in &values {
            s.push(*v);
        }
        let kept: Vec<f64> = s.iter().copied().collect();
        let start = values.len().saturating_sub(cap);
        prop_assert_eq!(kept, values[start..].to_vec());
        prop_assert_eq!(s.is_warm(), values.len() >= cap);
    }

    #[test]
    fn percentile_stays_within_contents(values in prop::collection::vec(-1e6f64..1e6, 60), p in 0.0f64..=1.0) {
        let mut s = BaselineSeries::new(60);
        for v in &values {
            s.push(*v);
        }
        let q = s.percentile(p).unwrap();
        let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(q >= lo - 1e-9 && q <= hi + 1e-9);
    }

    #[test]
    fn windows_tile_time_and_keep_every_trade(gaps in prop::collection::vec(0i64..2_500, 1..120)) {
        let allow = vec!["BTCUSDT".to_string()];
        let durations = WindowDurations { trade: 1_000, liquidation: 1_000, kline: 1_000, open_interest: 1_000 };
        let mut agg = WindowAggregator::new("BTCUSDT", durations);
        let mut closed = Vec::new();
        let mut ts = 0i64;
        for g in &gaps {
            ts += g;
            let raw = RawEvent { symbol: "BTCUSDT".into(), ts_ms: ts, payload: EventPayload::Trade { price: 1.0, qty: 1.0, aggressor: Side::Buy } };
            closed.extend(agg.on_event(&normalize(raw, &allow).unwrap()).unwrap());
        }
        for pair in closed.windows(2) {
            prop_assert_eq!(pair[0].end_ts, pair[1].start_ts);
        }
        let open = agg.open_window(StreamKind::Trade).unwrap();
        if let Some(last) = closed.last() {
            prop_assert_eq!(last.end_ts, open.start_ts);
        }
        let count: u64 = closed.iter().chain(std::iter::once(open)).map(|w| w.aggregates.as_trade().unwrap().trade_count).sum();
        prop_assert_eq!(count, gaps.len() as u64);
    }
}
