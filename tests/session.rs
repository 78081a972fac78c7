mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::{FakeApi, gios_station, manual_clock, memory_cache, start_time, station_list};
use serde_json::json;
use smogmap::{BoundingBox, FetchStatus, Session, SmogMapConfig};
use tokio::time::sleep;

fn config_without_bootstrap() -> SmogMapConfig {
    let mut config = SmogMapConfig::default();
    config.scheduler.bootstrap_count = 0;
    config
}

fn session(api: &Arc<FakeApi>, config: &SmogMapConfig) -> Session {
    let clock = manual_clock();
    Session::new(config, api.clone(), memory_cache(clock.clone()), clock)
}

fn two_station_api() -> FakeApi {
    FakeApi::new().with_stations(station_list(vec![
        gios_station(1, 50.0, 20.0),
        gios_station(2, 10.0, 10.0),
    ]))
}

#[tokio::test(start_paused = true)]
async fn test_only_stations_in_view_are_fetched() {
    let api = Arc::new(two_station_api());
    let session = session(&api, &config_without_bootstrap());
    session.spawn_viewport_sync();
    session.bootstrap().await.unwrap();

    session.viewport_changed(BoundingBox::new(49.5, 50.5, 19.5, 20.5).unwrap());
    sleep(Duration::from_secs(2)).await;

    let in_view: Vec<String> = session.stations_in_view().into_iter().map(|s| s.id).collect();
    assert_eq!(in_view, vec!["1"]);
    assert_eq!(api.index_calls(), vec!["1"]);
    assert_eq!(session.store().usable_index("1"), Some(1));
    assert_eq!(
        session.store().index_status_by_id().get("2"),
        None,
        "station 2 was never requested"
    );

    // Station 2 enters the view
    session.viewport_changed(BoundingBox::new(9.0, 51.0, 9.0, 21.0).unwrap());
    sleep(Duration::from_secs(2)).await;
    assert_eq!(api.index_calls(), vec!["1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_is_fetched_before_a_viewport_settles() {
    let api = Arc::new(two_station_api());
    let session = session(&api, &config_without_bootstrap());
    session.spawn_viewport_sync();
    session.bootstrap().await.unwrap();

    sleep(Duration::from_secs(2)).await;
    assert!(session.stations_in_view().is_empty());
    assert!(api.index_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_seeds_first_stations_without_viewport() {
    let stations = (1..=15).map(|i| gios_station(i, 50.0, 20.0)).collect();
    let api = Arc::new(FakeApi::new().with_stations(station_list(stations)));
    let session = session(&api, &SmogMapConfig::default());

    session.bootstrap().await.unwrap();
    sleep(Duration::from_millis(299)).await;
    assert!(api.index_calls().is_empty());

    sleep(Duration::from_millis(100)).await;
    let expected: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
    assert_eq!(api.index_calls(), expected);

    // A second bootstrap call does not reload the directory
    session.bootstrap().await.unwrap();
    assert_eq!(api.station_list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_directory_total_failure_leaves_map_empty() {
    let api = Arc::new(FakeApi::new());
    let session = session(&api, &SmogMapConfig::default());

    let err = session.bootstrap().await.unwrap_err();
    assert!(err.is_transport());

    let (status, error) = session.store().stations_status();
    assert_eq!(status, FetchStatus::Failed);
    assert_eq!(error.as_deref(), Some("503 Service Unavailable"));
    assert!(session.store().stations().is_empty());
    assert_eq!(err.user_message(), "The air quality service answered 503 Service Unavailable.");

    // The session keeps serving an empty map
    session.spawn_viewport_sync();
    session.viewport_changed(BoundingBox::new(49.0, 51.0, 19.0, 21.0).unwrap());
    sleep(Duration::from_secs(2)).await;
    assert!(session.viewport().is_some());
    assert!(session.stations_in_view().is_empty());
    assert!(api.index_calls().is_empty());
    assert!(session.select_station(Some("1")).unwrap().await.is_ok());
    assert_eq!(session.store().details_status("1"), FetchStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_index_retry_refetches_failed_station() {
    let api = Arc::new(two_station_api().failing_index("1"));
    let session = session(&api, &config_without_bootstrap());
    session.spawn_viewport_sync();
    session.bootstrap().await.unwrap();

    session.viewport_changed(BoundingBox::new(49.5, 50.5, 19.5, 20.5).unwrap());
    sleep(Duration::from_secs(2)).await;
    assert_eq!(session.store().index_entry("1").status, FetchStatus::Failed);

    session.retry_index("1").unwrap().await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(api.index_calls(), vec!["1", "1"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_bootstrap_station_off_screen_can_be_retried() {
    let api = Arc::new(two_station_api().failing_index("1"));
    let session = session(&api, &SmogMapConfig::default());
    session.spawn_viewport_sync();
    session.bootstrap().await.unwrap();

    // Only station 2 is in view; station 1 was seeded by the bootstrap path
    session.viewport_changed(BoundingBox::new(9.0, 11.0, 9.0, 11.0).unwrap());
    sleep(Duration::from_secs(2)).await;
    assert_eq!(session.store().index_entry("1").status, FetchStatus::Failed);
    assert_eq!(session.store().usable_index("2"), Some(1));

    let retry = session.retry_index("1").unwrap();
    assert_eq!(retry.await.unwrap(), 1);
    sleep(Duration::from_millis(10)).await;

    let fetches_of_1 = api.index_calls().iter().filter(|id| *id == "1").count();
    assert_eq!(fetches_of_1, 2);
    assert_eq!(session.store().index_entry("1").status, FetchStatus::Failed);
}

fn details_api() -> FakeApi {
    let recent = (start_time() - ChronoDuration::hours(1)).to_rfc3339();
    two_station_api()
        .with_sensors(
            "1",
            json!({
                "Lista stanowisk pomiarowych dla podanej stacji": [
                    { "Identyfikator stanowiska": 11, "Wskaźnik - kod": "PM10" }
                ]
            }),
        )
        .with_sensor_data(
            "11",
            json!({
                "Lista danych pomiarowych": [
                    { "Kod stanowiska": "PL0001-PM10-1g", "Data": recent, "Wartość": 42.0 }
                ]
            }),
        )
}

#[tokio::test(start_paused = true)]
async fn test_selected_station_details_load_once() {
    let api = Arc::new(details_api());
    let session = session(&api, &config_without_bootstrap());

    session.select_station(Some("1")).unwrap().await.unwrap();
    assert_eq!(session.store().details_status("1"), FetchStatus::Succeeded);
    let data = session.store().details("1").unwrap();
    assert_eq!(data.pm10.len(), 1);
    assert_eq!(data.pm10[0].value, 42.0);

    // Same selection again, then a round trip through another station
    assert!(session.select_station(Some("1")).is_none());
    session.select_station(None);
    assert!(session.select_station(Some("1")).is_none());
    assert_eq!(api.calls("sensors").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_details_retry_manually() {
    let api = Arc::new(details_api());
    let session = session(&api, &config_without_bootstrap());

    // No sensors scripted for station 2
    session.select_station(Some("2")).unwrap().await.unwrap();
    let entry = session.store().details_entry("2");
    assert_eq!(entry.status, FetchStatus::Failed);
    assert_eq!(entry.error.as_deref(), Some("404 Not Found"));

    // Still selected: the one-shot guard holds
    assert!(session.select_station(Some("2")).is_none());

    session.retry_details().unwrap().await.unwrap();
    assert_eq!(api.calls("sensors").len(), 2);

    // Reselecting after a failure also retries
    session.select_station(Some("1"));
    session.select_station(Some("2")).unwrap().await.unwrap();
    assert_eq!(
        api.calls("sensors")
            .iter()
            .filter(|(id, _)| id == "2")
            .count(),
        3
    );
}
