//! Ingestion Pipeline Integration Tests
//!
//! Drives the coordinator and shutdown controller end to end with a scripted
//! stream source and an in-memory sink.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::timeout;

use market_ingest::application::services::FailureCause;
use market_ingest::infrastructure::persistence::InMemorySink;
use market_ingest::infrastructure::scripted::ScriptedStreamSource;
use market_ingest::{
    DepthEvent, IngestionCoordinator, MarketEvent, PriceLevel, SetupError, ShutdownCause,
    ShutdownState, Side, SourceError, StorageSink, StreamKind, StreamSource, Symbol, TradeEvent,
    WorkerSettings,
};

const WAIT: Duration = Duration::from_secs(2);

fn symbol(raw: &str) -> Symbol {
    Symbol::new(raw).unwrap()
}

fn coordinator(
    source: &Arc<ScriptedStreamSource>,
    sink: &Arc<InMemorySink>,
    settings: WorkerSettings,
) -> IngestionCoordinator {
    let source: Arc<dyn StreamSource> = Arc::clone(source) as Arc<dyn StreamSource>;
    let sink: Arc<dyn StorageSink> = Arc::clone(sink) as Arc<dyn StorageSink>;
    IngestionCoordinator::new(source, sink, settings)
}

fn depth(first_update_id: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> MarketEvent {
    let levels = |raw: &[(&str, &str)]| {
        raw.iter()
            .map(|(price, quantity)| PriceLevel::new(*price, *quantity))
            .collect()
    };
    MarketEvent::Depth(DepthEvent {
        symbol: "ETHBTC".to_string(),
        event_time_ms: 1000,
        first_update_id,
        final_update_id: first_update_id,
        bids: levels(bids),
        asks: levels(asks),
    })
}

fn trade(trade_id: u64, price: &str, quantity: &str) -> MarketEvent {
    MarketEvent::Trade(TradeEvent {
        symbol: "ETHBTC".to_string(),
        event_time_ms: 1999,
        trade_time_ms: 2000,
        trade_id,
        price: price.to_string(),
        quantity: quantity.to_string(),
        buyer_is_maker: false,
    })
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn records_flow_to_sink_until_signal() {
    let source = Arc::new(ScriptedStreamSource::new());
    let sink = Arc::new(InMemorySink::new());
    let coordinator = coordinator(&source, &sink, WorkerSettings::default());
    let eth = symbol("ETHBTC");

    coordinator.process_symbol(&eth).await.unwrap();
    assert_eq!(coordinator.active_workers(), 2);

    let depth_feed = source.handle(&eth, StreamKind::Depth).unwrap();
    let trade_feed = source.handle(&eth, StreamKind::Trade).unwrap();
    depth_feed.send_event(depth(5, &[("0.01", "2.0")], &[("0.02", "1.5")]));
    trade_feed.send_event(trade(42, "0.03", "4"));

    wait_until(|| sink.len() == 3).await;

    let controller = coordinator.into_shutdown();
    let mut state = controller.subscribe_state();
    let outcome = timeout(WAIT, controller.run(std::future::ready(())))
        .await
        .unwrap();

    assert!(matches!(outcome.cause, ShutdownCause::Signal));
    assert_eq!(outcome.ignored_errors, 0);
    assert_eq!(*state.borrow_and_update(), ShutdownState::Stopped);
    assert!(source.stop_requested(&eth, StreamKind::Depth));
    assert!(source.stop_requested(&eth, StreamKind::Trade));

    let records = sink.records();
    let book: Vec<_> = records.iter().filter(|r| !r.is_trade()).collect();
    assert_eq!(book.len(), 2);
    assert_eq!(book[0].side(), Some(Side::Bid));
    assert_eq!(book[0].timestamp(), 1000.0);
    assert_eq!(book[0].sequence(), 5);
    assert_eq!(book[0].price(), Decimal::new(1, 2));
    assert_eq!(book[0].size(), Decimal::new(20, 1));
    assert_eq!(book[1].side(), Some(Side::Ask));
    assert_eq!(book[1].price(), Decimal::new(2, 2));
    assert_eq!(book[1].size(), Decimal::new(15, 1));

    let traded = records.iter().find(|r| r.is_trade()).unwrap();
    assert_eq!(traded.timestamp(), 2000.0);
    assert_eq!(traded.sequence(), 42);
    assert_eq!(traded.price(), Decimal::new(3, 2));
    assert_eq!(traded.size(), Decimal::from(4));
    assert_eq!(traded.side(), None);
}

#[tokio::test]
async fn same_sequence_on_two_symbols_is_stored_per_symbol() {
    let source = Arc::new(ScriptedStreamSource::new());
    let sink = Arc::new(InMemorySink::new());
    let coordinator = coordinator(&source, &sink, WorkerSettings::default());
    let eth = symbol("ETHBTC");
    let bnb = symbol("BNBBTC");

    coordinator.process_symbol(&eth).await.unwrap();
    coordinator.process_symbol(&bnb).await.unwrap();

    for sym in [&eth, &bnb] {
        source
            .handle(sym, StreamKind::Depth)
            .unwrap()
            .send_event(depth(5, &[("0.01", "2.0")], &[]));
    }

    wait_until(|| sink.len() == 2).await;
    timeout(WAIT, coordinator.into_shutdown().run(std::future::ready(())))
        .await
        .unwrap();

    for sym in [&eth, &bnb] {
        let stored = sink.records_for(sym);
        assert_eq!(stored.len(), 1, "{sym}");
        assert_eq!(stored[0].sequence(), 5);
        assert_eq!(stored[0].price(), Decimal::new(1, 2));
    }
}

#[tokio::test]
async fn first_sink_error_stops_every_stream() {
    let source = Arc::new(ScriptedStreamSource::new());
    let rejected = Decimal::new(2, 2);
    let sink = Arc::new(InMemorySink::rejecting(move |record| {
        record.price() == rejected
    }));
    let coordinator = coordinator(&source, &sink, WorkerSettings::default());
    let eth = symbol("ETHBTC");
    let bnb = symbol("BNBBTC");

    coordinator.process_symbol(&eth).await.unwrap();
    coordinator.process_symbol(&bnb).await.unwrap();
    assert_eq!(coordinator.active_workers(), 4);

    let depth_feed = source.handle(&eth, StreamKind::Depth).unwrap();
    depth_feed.send_event(depth(7, &[("0.01", "1"), ("0.02", "1")], &[]));

    let outcome = timeout(WAIT, coordinator.into_shutdown().run(std::future::pending()))
        .await
        .unwrap();

    let ShutdownCause::Error(error) = outcome.cause else {
        panic!("expected error shutdown, got {:?}", outcome.cause);
    };
    assert_eq!(error.symbol, eth);
    assert_eq!(error.stream, StreamKind::Depth);
    assert!(matches!(error.cause, FailureCause::Sink(_)));

    assert_eq!(sink.len(), 1);
    assert_eq!(sink.records()[0].price(), Decimal::new(1, 2));

    for sym in [&eth, &bnb] {
        for kind in StreamKind::ALL {
            assert!(source.stop_requested(sym, kind), "{sym} {kind} not stopped");
        }
    }
}

#[tokio::test]
async fn per_record_errors_keep_stream_alive_until_shutdown() {
    let source = Arc::new(ScriptedStreamSource::new());
    let sink = Arc::new(InMemorySink::new());
    let coordinator = coordinator(&source, &sink, WorkerSettings::default());
    let eth = symbol("ETHBTC");

    coordinator.process_symbol(&eth).await.unwrap();
    let trade_feed = source.handle(&eth, StreamKind::Trade).unwrap();

    trade_feed.send_event(trade(1, "not-a-price", "1"));
    trade_feed.send_error(SourceError::Decode {
        message: "truncated frame".to_string(),
    });
    trade_feed.send_event(trade(2, "0.05", "1"));

    wait_until(|| sink.len() == 1).await;
    assert_eq!(coordinator.active_workers(), 2);

    let outcome = timeout(WAIT, coordinator.into_shutdown().run(std::future::pending()))
        .await
        .unwrap();

    let ShutdownCause::Error(error) = outcome.cause else {
        panic!("expected error shutdown, got {:?}", outcome.cause);
    };
    assert!(matches!(error.cause, FailureCause::Parse(_)));
    assert_eq!(sink.records()[0].sequence(), 2);
}

#[tokio::test]
async fn closed_streams_end_the_session() {
    let source = Arc::new(ScriptedStreamSource::new());
    let sink = Arc::new(InMemorySink::new());
    let coordinator = coordinator(&source, &sink, WorkerSettings::default());
    let eth = symbol("ETHBTC");

    coordinator.process_symbol(&eth).await.unwrap();
    let controller = coordinator.into_shutdown();

    source.handle(&eth, StreamKind::Depth).unwrap().close();
    source.handle(&eth, StreamKind::Trade).unwrap().close();

    let outcome = timeout(WAIT, controller.run(std::future::pending()))
        .await
        .unwrap();

    assert!(matches!(outcome.cause, ShutdownCause::StreamsClosed));
    assert!(!source.stop_requested(&eth, StreamKind::Depth));
}

#[tokio::test]
async fn failed_depth_subscribe_skips_trade_and_aborts() {
    let source = Arc::new(ScriptedStreamSource::new());
    let sink = Arc::new(InMemorySink::new());
    let coordinator = coordinator(&source, &sink, WorkerSettings::default());
    let eth = symbol("ETHBTC");
    let bnb = symbol("BNBBTC");
    source.fail_on(&bnb, StreamKind::Depth);

    coordinator.process_symbol(&eth).await.unwrap();
    let err = coordinator.process_symbol(&bnb).await.unwrap_err();

    assert!(matches!(
        err,
        SetupError::Subscribe {
            stream: StreamKind::Depth,
            ..
        }
    ));
    assert_eq!(
        source.subscriptions(),
        vec![
            (eth.clone(), StreamKind::Depth),
            (eth.clone(), StreamKind::Trade),
            (bnb.clone(), StreamKind::Depth),
        ]
    );
    assert_eq!(coordinator.active_workers(), 2);

    let outcome = timeout(WAIT, coordinator.into_shutdown().abort())
        .await
        .unwrap();

    assert!(matches!(outcome.cause, ShutdownCause::SetupFailed));
    assert!(source.stop_requested(&eth, StreamKind::Depth));
    assert!(source.stop_requested(&eth, StreamKind::Trade));
}

#[tokio::test]
async fn unacknowledged_stop_does_not_block_shutdown() {
    let source = Arc::new(ScriptedStreamSource::new());
    let sink = Arc::new(InMemorySink::new());
    let settings = WorkerSettings {
        stop_ack_timeout: Duration::from_millis(100),
    };
    let coordinator = coordinator(&source, &sink, settings);
    let eth = symbol("ETHBTC");
    source.ignore_stop(&eth, StreamKind::Trade);

    coordinator.process_symbol(&eth).await.unwrap();
    let _held = source.handle(&eth, StreamKind::Trade).unwrap();

    let outcome = timeout(WAIT, coordinator.into_shutdown().run(std::future::ready(())))
        .await
        .unwrap();

    assert!(matches!(outcome.cause, ShutdownCause::Signal));
}
