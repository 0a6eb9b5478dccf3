mod common;

use momentum_screener::analysis::run_scan_with;
use momentum_screener::find_tickers::{list_instruments, list_symbols};
use momentum_screener::klines::fetch_klines;
use momentum_screener::storage_utils::AppConfig;
use momentum_screener::{Interval, ScreenerError, Thresholds};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn query_param<'a>(target: &'a str, key: &str) -> Option<&'a str> {
    target
        .split_once('?')?
        .1
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn instruments(symbols: &[&str]) -> String {
    let list: Vec<_> = symbols
        .iter()
        .map(|s| json!({"symbol": s, "status": "Trading", "quoteCoin": "USDT"}))
        .collect();
    common::ok_envelope(json!({"category": "linear", "list": list, "nextPageCursor": ""}))
}

#[tokio::test]
async fn pair_lister_returns_symbols_in_exchange_order() {
    let base = common::spawn_exchange(|target| {
        assert!(target.starts_with("/v5/market/instruments-info"));
        assert_eq!(query_param(target, "category"), Some("linear"));
        (200, instruments(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]))
    })
    .await;
    let exchange = common::exchange(&base, TIMEOUT);

    let symbols = list_symbols(&exchange).await.unwrap();
    assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
}

#[tokio::test]
async fn pair_lister_surfaces_upstream_status_despite_http_200() {
    let base = common::spawn_exchange(|_| (200, common::error_envelope(10002, "invalid request"))).await;
    let exchange = common::exchange(&base, TIMEOUT);

    match list_instruments(&exchange).await {
        Err(ScreenerError::Upstream { code, message }) => {
            assert_eq!(code, 10002);
            assert_eq!(message, "invalid request");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn envelope_on_http_error_is_still_an_upstream_error() {
    let base = common::spawn_exchange(|_| (403, common::error_envelope(10006, "Too many visits!"))).await;
    let exchange = common::exchange(&base, TIMEOUT);

    let err = list_symbols(&exchange).await.unwrap_err();
    assert!(matches!(err, ScreenerError::Upstream { code: 10006, .. }), "{err}");
}

#[tokio::test]
async fn gateway_error_page_is_a_transport_error() {
    let base = common::spawn_exchange(|_| (502, "<html>Bad Gateway</html>".to_string())).await;
    let exchange = common::exchange(&base, TIMEOUT);

    let err = list_symbols(&exchange).await.unwrap_err();
    assert_eq!(err.kind(), "transport", "{err}");
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let exchange = common::exchange(&base, TIMEOUT);

    let err = list_symbols(&exchange).await.unwrap_err();
    assert!(matches!(err, ScreenerError::Transport(_)), "{err}");
}

#[tokio::test]
async fn slow_exchange_times_out() {
    let base = common::spawn_silent_exchange().await;
    let exchange = common::exchange(&base, Duration::from_millis(200));

    let err = fetch_klines(&exchange, "BTCUSDT", Interval::FiveMinutes, 200)
        .await
        .unwrap_err();
    match err {
        ScreenerError::Transport(e) => assert!(e.is_timeout(), "{e}"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn fetcher_forwards_parameters_and_reorders_newest_first() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_server = seen.clone();
    let base = common::spawn_exchange(move |target| {
        seen_by_server.lock().unwrap().push(target.to_string());
        (200, common::ok_envelope(common::kline_rows(&[10.0, 11.0, 12.5, 12.0], 1500.0)))
    })
    .await;
    let exchange = common::exchange(&base, TIMEOUT);

    let table = fetch_klines(&exchange, "ETHUSDT", Interval::FifteenMinutes, 4).await.unwrap();

    let closes: Vec<f64> = table.closes().collect();
    assert_eq!(closes, vec![10.0, 11.0, 12.5, 12.0]);
    assert!(table.candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(table.candles[0].timestamp.timestamp_millis(), 1_700_000_000_000);
    assert_eq!(table.candles[0].turnover, Some(15_000.0));
    assert_eq!(table.symbol, "ETHUSDT");

    let requests = seen.lock().unwrap();
    let target = &requests[0];
    assert!(target.starts_with("/v5/market/kline"));
    assert_eq!(query_param(target, "category"), Some("linear"));
    assert_eq!(query_param(target, "symbol"), Some("ETHUSDT"));
    assert_eq!(query_param(target, "interval"), Some("15"));
    assert_eq!(query_param(target, "limit"), Some("4"));
}

#[tokio::test]
async fn empty_kline_list_is_an_empty_table_not_an_error() {
    let base = common::spawn_exchange(|_| (200, common::ok_envelope(json!({"category": "linear", "list": []})))).await;
    let exchange = common::exchange(&base, TIMEOUT);

    let table = fetch_klines(&exchange, "NEWUSDT", Interval::OneMinute, 200).await.unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn malformed_row_is_a_data_format_error() {
    let base = common::spawn_exchange(|_| {
        (
            200,
            common::ok_envelope(json!({"list": [["1700000000000", "1", "1"]]})),
        )
    })
    .await;
    let exchange = common::exchange(&base, TIMEOUT);

    let err = fetch_klines(&exchange, "BTCUSDT", Interval::FiveMinutes, 200)
        .await
        .unwrap_err();
    assert!(matches!(err, ScreenerError::DataFormat(_)), "{err}");
}

#[tokio::test]
async fn out_of_range_limit_is_rejected_without_a_request() {
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let base = common::spawn_exchange(move |_| {
        *counter.lock().unwrap() += 1;
        (200, common::ok_envelope(json!({"list": []})))
    })
    .await;
    let exchange = common::exchange(&base, TIMEOUT);

    for limit in [0, 1001] {
        let err = fetch_klines(&exchange, "BTCUSDT", Interval::FiveMinutes, limit)
            .await
            .unwrap_err();
        assert!(matches!(err, ScreenerError::InvalidParameter(_)), "{err}");
    }
    assert_eq!(*calls.lock().unwrap(), 0);
}

fn scan_server(symbols: &'static [&'static str], failing: &'static str) -> impl Fn(&str) -> (u16, String) + Send + Sync + 'static {
    move |target: &str| {
        if target.starts_with("/v5/market/instruments-info") {
            return (200, instruments(symbols));
        }
        let symbol = query_param(target, "symbol").unwrap_or_default();
        if symbol == failing {
            return (200, common::error_envelope(10001, "params error: symbol invalid"));
        }
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        (200, common::ok_envelope(common::kline_rows(&closes, 2_000_000.0)))
    }
}

#[tokio::test]
async fn one_failing_symbol_does_not_abort_the_scan() {
    let base = common::spawn_exchange(scan_server(&["AUSDT", "BUSDT", "CUSDT", "DUSDT"], "BUSDT")).await;
    let exchange = common::exchange(&base, TIMEOUT);
    let mut config = AppConfig::default();
    config.scan.max_symbols_per_scan = 3;

    let report = run_scan_with(&exchange, &config, Thresholds::new(1_000_000.0, 0.5).unwrap())
        .await
        .unwrap();

    assert_eq!(report.total_listed, 4);
    let screened: Vec<&str> = report.results.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(screened, vec!["AUSDT", "CUSDT"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "BUSDT");
    assert_eq!(report.failures[0].kind, "upstream");
    assert!(report.failures[0].message.contains("symbol invalid"));

    let first = &report.results[0];
    assert_eq!(first.candles, 30);
    assert_eq!(first.screening.overbought.len(), 16);
    assert!(first.screening.oversold.is_empty());
    assert_eq!(first.latest.as_ref().unwrap().candle.close, 129.0);
}

#[tokio::test]
async fn concurrent_scan_keeps_symbol_order() {
    let base = common::spawn_exchange(scan_server(&["AUSDT", "BUSDT", "CUSDT", "DUSDT", "EUSDT"], "DUSDT")).await;
    let exchange = common::exchange(&base, TIMEOUT);
    let mut config = AppConfig::default();
    config.scan.concurrency = 4;
    config.scan.filters = HashMap::from([("quoteCoin".to_string(), "USDT".to_string())]);

    let report = run_scan_with(&exchange, &config, Thresholds::default()).await.unwrap();

    let screened: Vec<&str> = report.results.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(screened, vec!["AUSDT", "BUSDT", "CUSDT", "EUSDT"]);
    assert_eq!(report.failures[0].symbol, "DUSDT");
}

#[tokio::test]
async fn failed_pair_listing_fails_the_scan() {
    let base = common::spawn_exchange(|_| (200, common::error_envelope(10016, "server error"))).await;
    let exchange = common::exchange(&base, TIMEOUT);

    let err = run_scan_with(&exchange, &AppConfig::default(), Thresholds::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ScreenerError::Upstream { code: 10016, .. }), "{err}");
}
