#![allow(dead_code)]

use momentum_screener::candles::{Candle, CandleTable, Interval, timestamp_from_epoch};
use momentum_screener::{Category, Exchange};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves canned responses on a loopback port. `respond` gets the request
/// target (path and query) and returns the HTTP status and body.
pub async fn spawn_exchange<F>(respond: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let mut read = 0;
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                    read += n;
                    if n == 0 || read == buf.len() || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let request = String::from_utf8_lossy(&buf[..read]);
                let target = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = (*respond)(&target);
                let response = format!(
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Accepts connections and never answers.
pub async fn spawn_silent_exchange() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

/// Loopback requests must not be routed through a proxy from the environment.
pub fn exchange(base_url: &str, timeout: Duration) -> Exchange {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .unwrap();
    Exchange::with_client(client, base_url, Category::Linear)
}

pub fn ok_envelope(result: serde_json::Value) -> String {
    serde_json::json!({"retCode": 0, "retMsg": "OK", "result": result, "time": 1_700_000_000_000u64}).to_string()
}

pub fn error_envelope(code: i64, message: &str) -> String {
    serde_json::json!({"retCode": code, "retMsg": message, "result": {}, "time": 1_700_000_000_000u64}).to_string()
}

/// Kline rows as the exchange sends them: newest first, every value a string.
pub fn kline_rows(closes: &[f64], volume: f64) -> serde_json::Value {
    let start_ms: i64 = 1_700_000_000_000;
    let rows: Vec<Vec<String>> = closes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, close)| {
            let ts = start_ms + 300_000 * i as i64;
            vec![
                ts.to_string(),
                close.to_string(),
                close.to_string(),
                close.to_string(),
                close.to_string(),
                volume.to_string(),
                (close * volume).to_string(),
            ]
        })
        .collect();
    serde_json::json!({"category": "linear", "symbol": "X", "list": rows})
}

pub fn table(closes: &[f64], volumes: &[f64]) -> CandleTable {
    let candles = closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| Candle {
            timestamp: timestamp_from_epoch(1_700_000_000 + 300 * i as i64).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            turnover: None,
        })
        .collect();
    CandleTable::new("TESTUSDT", Interval::FiveMinutes, candles)
}

/// Deterministic pseudo-random walk (64-bit LCG), always positive.
pub fn random_walk(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    let mut price: f64 = 100.0;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let step = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
            price = (price * (1.0 + step * 0.04)).max(0.01);
            price
        })
        .collect()
}
