#![allow(dead_code)]

pub use testloop_test_utils::builders::{test_app, test_app_with_server, TestApp, TestConfigBuilder};
pub use testloop_test_utils::{init_tracing, with_timeout, FakeLauncher, FakeServer};

use std::time::Duration;

use testloop::app::AppEvent;
use tokio::sync::broadcast::{error::TryRecvError, Receiver};

/// Wait (up to 5s) for the first event matching `pred`; earlier events are
/// discarded.
pub async fn wait_for_event<F>(rx: &mut Receiver<AppEvent>, mut pred: F) -> AppEvent
where
    F: FnMut(&AppEvent) -> bool,
{
    with_timeout(async {
        loop {
            match rx.recv().await {
                Ok(ev) if pred(&ev) => return ev,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
}

/// Everything received so far, without waiting.
pub fn drain(rx: &mut Receiver<AppEvent>) -> Vec<AppEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return out,
        }
    }
}

/// Give spawned tasks a moment to make progress.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
