use mandate_bot_rust::arbitration::{arbitrate, Cycle};
use mandate_bot_rust::baseline::BaselineSeries;
use mandate_bot_rust::config::{Limits, PipelineCfg};
use mandate_bot_rust::domain::{
    ActionType, Constraints, Decision, Direction, EventPayload, ExecStatus, ExecutionAction, ExpiryPolicy, Mandate,
    MandateType, PositionState, RawEvent, Side, StreamKind,
};
use mandate_bot_rust::execution::{self, settle, ExchangeResponse, ExecutionTranslator, Executor};
use mandate_bot_rust::feed::MockMarket;
use mandate_bot_rust::gateway::PaperExecutor;
use mandate_bot_rust::normalize::normalize;
use mandate_bot_rust::pipeline::{CycleOutcome, SymbolPipeline};
use mandate_bot_rust::positions::{Confirmation, PositionLifecycle};
use mandate_bot_rust::window::WindowAggregator;

const SYM: &str = "BTCUSDT";

fn trade(ts: i64, qty: f64, aggressor: Side) -> RawEvent {
    RawEvent { symbol: SYM.into(), ts_ms: ts, payload: EventPayload::Trade { price: 100.0, qty, aggressor } }
}

fn liquidation(ts: i64) -> RawEvent {
    RawEvent { symbol: SYM.into(), ts_ms: ts, payload: EventPayload::Liquidation { price: 100.0, qty: 1.0, side: Side::Sell } }
}

fn kline(ts: i64, open: f64, high: f64, low: f64, close: f64) -> RawEvent {
    RawEvent { symbol: SYM.into(), ts_ms: ts, payload: EventPayload::Kline { open, high, low, close, volume: 10.0 } }
}

fn feed(p: &mut SymbolPipeline, gw: &mut dyn Executor, events: Vec<RawEvent>) -> Vec<CycleOutcome> {
    events.into_iter().flat_map(|ev| p.on_event(ev, &mut *gw).unwrap()).collect()
}

#[test]
fn scenario_a_p90_of_one_to_sixty() {
    let mut s = BaselineSeries::new(60);
    for v in 1..=60 {
        s.push(v as f64);
    }
    assert!((s.p90().unwrap() - 54.1).abs() < 1e-9);
    assert!((s.p95().unwrap() - 57.05).abs() < 1e-9);
}

#[test]
fn baseline_warm_up_boundary() {
    let mut s = BaselineSeries::new(60);
    for v in 1..=59 {
        s.push(v as f64);
    }
    assert!(!s.is_warm());
    s.push(60.0);
    assert!(s.is_warm());
    s.push(61.0);
    let contents: Vec<f64> = s.iter().copied().collect();
    assert_eq!(contents.len(), 60);
    assert_eq!(contents[0], 2.0);
    assert_eq!(contents[59], 61.0);
}

#[test]
fn scenario_b_opposing_entries_cancel() {
    let ms = vec![
        Mandate::new(SYM, MandateType::Entry, Some(Direction::Long), ExpiryPolicy::NextCloseOnly, 1),
        Mandate::new(SYM, MandateType::Entry, Some(Direction::Short), ExpiryPolicy::NextCloseOnly, 1),
    ];
    assert_eq!(arbitrate(&ms, PositionState::Flat, &Cycle::window_close(1)), Decision::NoAction);
}

#[test]
fn scenario_c_exit_beats_reduce_and_closes() {
    let ms = vec![
        Mandate::new(SYM, MandateType::Exit, None, ExpiryPolicy::Immediate, 4),
        Mandate::new(SYM, MandateType::Reduce, None, ExpiryPolicy::Immediate, 4),
    ];
    assert_eq!(arbitrate(&ms, PositionState::Open, &Cycle::window_close(4)), Decision::Exit);

    let mut lc = PositionLifecycle::new(SYM);
    let limits = Constraints { max_order_size: 5.0, max_position_size: 10.0, reduce_only: false };
    let open = ExecutionAction::order(SYM, ActionType::Open, Some(Direction::Long), 1.0, limits.clone());
    lc.apply(&open, &settle(&open, &ExchangeResponse::Filled { qty: 1.0 }).unwrap()).unwrap();
    assert_eq!(lc.state(), PositionState::Open);

    // fill parsial -> berhenti di CLOSING
    let close = ExecutionAction::order(SYM, ActionType::Close, None, 1.0, Constraints { reduce_only: true, ..limits });
    lc.apply(&close, &settle(&close, &ExchangeResponse::Filled { qty: 0.4 }).unwrap()).unwrap();
    assert_eq!(lc.state(), PositionState::Closing);
}

#[test]
fn exit_clipped_by_order_limit_waits_in_closing() {
    let limits = Limits { max_order_size: 5.0, max_position_size: 20.0 };
    let translator = ExecutionTranslator::new(&PipelineCfg::default(), limits);
    let mut lc = PositionLifecycle::new(SYM);

    let open = ExecutionAction::order(SYM, ActionType::Open, Some(Direction::Long), 2.0,
        Constraints { max_order_size: 5.0, max_position_size: 20.0, reduce_only: false });
    lc.apply(&open, &settle(&open, &ExchangeResponse::Filled { qty: 1.0 }).unwrap()).unwrap();
    lc.confirm(Confirmation::EntryFilled { total_size: 8.0 }).unwrap();

    let exit = translator.translate(SYM, Decision::Exit, &lc);
    assert_eq!(exit.action_type, ActionType::Close);
    assert_eq!(exit.size, Some(5.0));

    let res = settle(&exit, &ExchangeResponse::Filled { qty: 5.0 }).unwrap();
    assert_eq!(res.status, ExecStatus::Success);
    lc.apply(&exit, &res).unwrap();
    assert_eq!(lc.state(), PositionState::Closing);
    assert!((lc.size() - 3.0).abs() < 1e-12);

    // CLOSING hanya menerima HOLD/BLOCK; sisa ditutup lewat konfirmasi venue
    assert_eq!(translator.translate(SYM, arbitrate(&[], lc.state(), &Cycle::window_close(9)), &lc).action_type, ActionType::None);
    lc.confirm(Confirmation::CloseCompleted).unwrap();
    assert_eq!(lc.state(), PositionState::Flat);
}

#[test]
fn scenario_d_boundary_event_opens_next_window() {
    let allow = vec![SYM.to_string()];
    let mut agg = WindowAggregator::new(SYM, PipelineCfg::default().windows);
    let mut closed = Vec::new();
    for ts in [1_000, 1_300, 1_999, 2_000] {
        let ev = normalize(trade(ts, 1.0, Side::Buy), &allow).unwrap();
        closed.extend(agg.on_event(&ev).unwrap());
    }
    assert_eq!(closed.len(), 1);
    assert_eq!((closed[0].start_ts, closed[0].end_ts), (1_000, 2_000));
    assert_eq!(closed[0].aggregates.as_trade().unwrap().trade_count, 3);

    let open = agg.open_window(StreamKind::Trade).unwrap();
    assert_eq!(open.start_ts, 2_000);
    assert_eq!(open.aggregates.as_trade().unwrap().trade_count, 1);
}

#[test]
fn promoted_window_enters_and_liquidation_cascade_exits() {
    let mut p = SymbolPipeline::new(SYM, &PipelineCfg::default(), Limits::default());
    let mut gw = PaperExecutor::new("paper");

    // 60 window tenang untuk baseline
    let quiet: Vec<_> = (0..60).map(|i| trade(i * 1_000 + 10, 1.0, Side::Buy)).collect();
    let outs = feed(&mut p, &mut gw, quiet);
    assert_eq!(outs.len(), 59);
    assert!(outs.iter().all(|o| o.decision == Decision::NoAction && o.promotion.event.is_none()));

    // window 60: flow besar + trade besar + kline ekspansi + liquidation
    let outs = feed(&mut p, &mut gw, vec![
        trade(60_010, 5.0, Side::Buy),
        liquidation(60_020),
        kline(60_050, 100.0, 110.0, 99.0, 109.0),
        trade(61_010, 1.0, Side::Buy),
    ]);
    let entry = outs.last().unwrap();
    assert_eq!(entry.cycle, 61);
    assert!(entry.promotion.check.promoted());
    let kinds: Vec<_> = entry.mandates.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MandateType::Entry, MandateType::Reduce]);
    assert_eq!(entry.decision, Decision::Entry(Direction::Long));
    assert_eq!(entry.action.action_type, ActionType::Open);
    assert_eq!(entry.result.as_ref().unwrap().status, ExecStatus::Success);
    assert_eq!(entry.state_after, PositionState::Open);

    // window 61: tiga liquidation -> EXIT menang atas REDUCE dan HOLD
    let outs = feed(&mut p, &mut gw, vec![
        liquidation(61_100),
        liquidation(61_200),
        liquidation(61_300),
        trade(62_010, 1.0, Side::Buy),
    ]);
    let exit = outs.last().unwrap();
    let kinds: Vec<_> = exit.mandates.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MandateType::Exit, MandateType::Reduce, MandateType::Hold]);
    assert_eq!(exit.decision, Decision::Exit);
    assert_eq!(exit.action.action_type, ActionType::Close);
    assert_eq!(exit.state_after, PositionState::Flat);
    assert_eq!(p.position().direction(), None);
}

#[test]
fn identical_event_sequences_give_identical_actions() {
    let run = || {
        let mut market = MockMarket::new(&[SYM], 42, 1_700_000_000_000);
        let mut p = SymbolPipeline::new(SYM, &PipelineCfg::default(), Limits::default());
        let mut gw = PaperExecutor::new("paper");
        let mut actions = Vec::new();
        for _ in 0..20_000 {
            let ev = market.next_event().unwrap();
            if let Ok(outs) = p.on_event(ev, &mut gw) {
                actions.extend(outs.into_iter().map(|o| (o.cycle, o.action)));
            }
        }
        actions
    };
    let a = run();
    assert!(!a.is_empty());
    assert_eq!(a, run());
}

#[test]
fn same_action_same_response_same_result() {
    let action = ExecutionAction::order(SYM, ActionType::Reduce, Some(Direction::Short), 0.5,
        Constraints { max_order_size: 5.0, max_position_size: 10.0, reduce_only: true });
    let mut gw = PaperExecutor::new("paper").with_fill_ratio(0.5);
    let first = execution::execute(&mut gw, &action);
    let second = execution::execute(&mut gw, &action);
    assert_eq!(first, second);
    assert_eq!(first.unwrap().status, ExecStatus::Partial);

    let rejected = ExchangeResponse::Rejected { reason: "margin".into() };
    assert_eq!(settle(&action, &rejected), settle(&action, &rejected));
}
