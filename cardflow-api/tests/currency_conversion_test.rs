//! Currency context and conversion runner integration tests

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use cardflow::conversion::{ConversionFlow, ConversionStep, RateTable};
use cardflow_api::providers::StaticRateProvider;
use cardflow_api::services::{ConversionRunner, CurrencyContext, TimedExecutor};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn btc_flow() -> ConversionFlow {
    ConversionFlow::new(RateTable::default().quote("BTC", dec("0.5"), "EUR").unwrap())
}

#[tokio::test]
async fn polled_rates_drive_conversion_and_formatting() {
    let mut context = CurrencyContext::new("EUR");
    assert_eq!(context.format_amount(dec("1234.5"), true), "€1,234.50");
    assert_eq!(context.format_amount(dec("1234.5"), false), "1,234.50");

    // Only the base currency is known before polling
    assert!(context.convert(dec("10"), "EUR", "USD").is_err());

    context.start_polling(Arc::new(StaticRateProvider::default()), Duration::from_secs(60));
    let state = context.rates_ready().await.unwrap();
    assert!(state.error.is_none());
    assert!(state.last_updated.is_some());

    assert_eq!(context.convert(dec("92"), "EUR", "USD").unwrap(), dec("100.00"));
    assert_eq!(context.convert(dec("2"), "USD", "JPY").unwrap(), dec("299"));

    context.stop_polling();
    assert!(context.rate_state().is_none());
}

#[tokio::test]
async fn unknown_base_currency_reports_poll_error() {
    let mut context = CurrencyContext::new("CHF");
    context.start_polling(Arc::new(StaticRateProvider::default()), Duration::from_secs(60));

    let state = context.rates_ready().await.unwrap();
    assert!(state.value.is_none());
    assert_eq!(state.error.as_deref(), Some("Not found: No rate for CHF"));
    assert_eq!(context.format_amount(dec("10"), true), "CHF 10.00");
}

#[tokio::test]
async fn conversion_progress_is_published_per_step() {
    let handle = ConversionRunner::start(
        btc_flow(),
        Arc::new(TimedExecutor::new(Duration::from_millis(5))),
    );
    let mut progress = handle.progress();

    let mut seen = Vec::new();
    while progress.changed().await.is_ok() {
        let flow = progress.borrow_and_update().clone();
        seen.push(flow.progress_percent());
        if flow.is_finished() {
            break;
        }
    }

    let done = handle.wait().await.unwrap();
    assert_eq!(done.step(), &ConversionStep::Completed);
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn explicit_cancel_stops_the_conversion() {
    let mut handle = ConversionRunner::start(
        btc_flow(),
        Arc::new(TimedExecutor::new(Duration::from_secs(30))),
    );
    handle.cancel();

    let done = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.step(), &ConversionStep::Cancelled);
    assert_eq!(done.progress_percent(), 0);
}

#[tokio::test]
async fn dropping_the_handle_cancels_the_conversion() {
    let handle = ConversionRunner::start(
        btc_flow(),
        Arc::new(TimedExecutor::new(Duration::from_secs(30))),
    );
    let mut progress = handle.progress();
    drop(handle);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !progress.borrow().is_finished() {
            if progress.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(progress.borrow().step(), &ConversionStep::Cancelled);
}
