//! Bounded reconnect behaviour against the simulated adapter

use std::time::Duration;

use obdlog_core::{TelemetryError, TelemetryEvent};
use obdlog_link::{ConnectionState, LinkConfig, SimulatedConfig};
use obdlog_tests::Rig;
use tokio::time::Instant;

const DELAY: Duration = Duration::from_secs(2);

#[tokio::test(start_paused = true)]
async fn test_exhaustion_makes_exactly_n_attempts_and_n_minus_one_waits() {
    for attempts in 1..=4u32 {
        let mut rig = Rig::new(SimulatedConfig::default(), LinkConfig::default());
        rig.controls.fail_all_opens();

        let started = Instant::now();
        let err = rig.link.reconnect(attempts, DELAY).await.unwrap_err();

        assert!(matches!(
            err,
            TelemetryError::ReconnectExhausted { attempts: a, .. } if a == attempts
        ));
        assert_eq!(rig.controls.open_count(), attempts);
        assert_eq!(started.elapsed(), DELAY * (attempts - 1));
        assert_eq!(
            rig.events
                .count(|e| matches!(e, TelemetryEvent::ReconnectWaiting { .. })),
            (attempts - 1) as usize
        );
        assert_eq!(rig.link.state(), ConnectionState::Fatal);
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_on_attempt_k_stops_retrying() {
    let max_attempts = 4;
    for k in 1..=max_attempts {
        let mut rig = Rig::new(SimulatedConfig::default(), LinkConfig::default());
        rig.controls.fail_next_opens(k - 1);

        let started = Instant::now();
        let attempt = rig.link.reconnect(max_attempts, DELAY).await.unwrap();

        assert_eq!(attempt, k);
        assert_eq!(rig.controls.open_count(), k);
        assert_eq!(started.elapsed(), DELAY * (k - 1));
        assert_eq!(rig.link.state(), ConnectionState::Connected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fatal_link_refuses_further_work() {
    let mut rig = Rig::connected(SimulatedConfig::default()).await;
    rig.controls.drop_link();

    assert!(rig.link.reconnect(2, DELAY).await.is_err());
    let opens = rig.controls.open_count();

    assert!(matches!(rig.link.connect().await, Err(TelemetryError::LinkFatal)));
    assert!(matches!(
        rig.link.reconnect(3, DELAY).await,
        Err(TelemetryError::LinkFatal)
    ));
    assert_eq!(rig.controls.open_count(), opens);

    rig.link.disconnect().await;
    assert_eq!(rig.link.state(), ConnectionState::Fatal);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_releases_the_old_channel_first() {
    let mut rig = Rig::connected(SimulatedConfig::default()).await;

    rig.link.reconnect(3, DELAY).await.unwrap();

    assert_eq!(rig.controls.open_count(), 2);
    assert_eq!(rig.controls.close_count(), 1);
    assert!(rig.link.is_connected());
}
