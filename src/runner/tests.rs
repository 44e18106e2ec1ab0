use super::*;
use crate::capture::CaptureRecord;
use crate::config::{CalibrationConfig, MeapisConfig, RunEnvironment};
use crate::error::MeapisError;
use crate::light::LightController;
use crate::project::{ProjectDescriptor, ProjectStore};
use crate::testing::{DriverProbe, RecordingLine, ScriptedFactory};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

struct Fixture {
    _dir: TempDir,
    runner: Arc<ProjectRunner>,
    probe: DriverProbe,
}

fn create_test_runner() -> Fixture {
    create_test_runner_with(|runner| runner)
}

fn create_test_runner_with(adjust: impl FnOnce(ProjectRunner) -> ProjectRunner) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = ProjectStore::new(dir.path()).with_host("station");
    let factory = ScriptedFactory::new();
    let probe = factory.probe.clone();
    let light = Arc::new(LightController::new(Box::new(RecordingLine::new(&probe))));

    let runner = ProjectRunner::new(
        RunEnvironment::Sim,
        store,
        Arc::new(factory),
        light,
        CalibrationConfig {
            max_autofocus_attempts: 3,
            settle_delay_ms: 0,
        },
    );

    Fixture {
        _dir: dir,
        runner: Arc::new(adjust(runner)),
        probe,
    }
}

impl Fixture {
    async fn add_project(&self, name: &str, interval: u64) {
        let descriptor = ProjectDescriptor {
            camera: 1,
            interval,
            ..ProjectDescriptor::default()
        };
        self.runner
            .store()
            .create_project(name, &descriptor)
            .await
            .unwrap();
    }

    fn pictures(&self, name: &str) -> Vec<String> {
        let dir = self.runner.store().project_dir(name).join("pictures");
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".jpg"))
            .collect();
        names.sort();
        names
    }
}

#[tokio::test]
async fn test_start_reports_active_project() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;

    fixture.runner.start("demo").await.unwrap();
    let status = fixture.runner.status().await;

    assert_eq!(status.env, "sim");
    assert_eq!(status.active_project.as_deref(), Some("demo"));
    assert_eq!(status.interval, Some(3600));
    assert_eq!(
        fixture
            .runner
            .store()
            .read_active_marker()
            .await
            .unwrap()
            .as_deref(),
        Some("demo")
    );

    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_normalizes_name() {
    let fixture = create_test_runner();
    fixture.add_project("my-plant", 3600).await;

    fixture.runner.start("  My Plant ").await.unwrap();

    assert_eq!(
        fixture.runner.active_project().await.as_deref(),
        Some("my-plant")
    );
    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_missing_project_changes_nothing() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;
    fixture.runner.start("demo").await.unwrap();
    let opened = fixture.probe.opened();

    let err = fixture.runner.start("missing").await.unwrap_err();

    assert!(matches!(err, MeapisError::NotFound { .. }));
    assert_eq!(
        fixture.runner.active_project().await.as_deref(),
        Some("demo")
    );
    assert_eq!(fixture.probe.opened(), opened);
    assert_eq!(fixture.probe.closed(), 0);

    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_rejects_invalid_name() {
    let fixture = create_test_runner();

    let err = fixture.runner.start("../etc").await.unwrap_err();

    assert!(matches!(err, MeapisError::InvalidProjectName { .. }));
    assert_eq!(fixture.runner.status().await.active_project, None);
}

#[tokio::test]
async fn test_stop_releases_camera_and_keeps_marker() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 1).await;
    fixture.runner.start("demo").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    fixture.runner.stop().await.unwrap();
    let captures = fixture.probe.captures();
    sleep(Duration::from_millis(1300)).await;

    let status = fixture.runner.status().await;
    assert_eq!(status.active_project, None);
    assert_eq!(status.interval, None);
    assert_eq!(fixture.probe.captures(), captures);
    assert_eq!(fixture.probe.live(), 0);

    // Stopping again is a no-op
    fixture.runner.stop().await.unwrap();
    assert_eq!(fixture.probe.closed(), 1);

    // The stopped project is still the one resumed on the next boot
    assert_eq!(
        fixture
            .runner
            .store()
            .read_active_marker()
            .await
            .unwrap()
            .as_deref(),
        Some("demo")
    );
    fixture.runner.start_initial(None).await.unwrap();
    assert_eq!(
        fixture.runner.active_project().await.as_deref(),
        Some("demo")
    );
    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_answers_while_calibrating() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;
    fixture.probe.delay_captures(Duration::from_millis(200));

    let runner = Arc::clone(&fixture.runner);
    let starting = tokio::spawn(async move { runner.start("demo").await });
    sleep(Duration::from_millis(50)).await;

    let status = timeout(Duration::from_millis(20), fixture.runner.status())
        .await
        .expect("status blocked by calibration");
    assert_eq!(status.active_project, None);
    assert!(matches!(
        timeout(Duration::from_millis(20), fixture.runner.capture_now())
            .await
            .expect("capture_now blocked by calibration"),
        Err(MeapisError::NoActiveProject)
    ));

    starting.await.unwrap().unwrap();
    assert_eq!(
        fixture.runner.active_project().await.as_deref(),
        Some("demo")
    );
    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_closes_previous_camera_first() {
    let fixture = create_test_runner();
    fixture.add_project("first", 3600).await;
    fixture.add_project("second", 3600).await;

    fixture.runner.start("first").await.unwrap();
    fixture.runner.start("second").await.unwrap();

    assert_eq!(fixture.probe.opened(), 2);
    assert_eq!(fixture.probe.closed(), 1);
    assert_eq!(fixture.probe.max_live(), 1);
    assert_eq!(
        fixture.runner.active_project().await.as_deref(),
        Some("second")
    );
    assert_eq!(
        fixture
            .runner
            .store()
            .read_active_marker()
            .await
            .unwrap()
            .as_deref(),
        Some("second")
    );

    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_calibration_runs_once_until_cleared() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;

    fixture.runner.start("demo").await.unwrap();
    let calibration_cycles = fixture.probe.autofocus_calls();
    assert_eq!(calibration_cycles, 2);

    fixture.runner.stop().await.unwrap();
    fixture.runner.start("demo").await.unwrap();
    assert_eq!(fixture.probe.autofocus_calls(), calibration_cycles);

    fixture.runner.stop().await.unwrap();
    assert!(fixture
        .runner
        .store()
        .clear_calibration("demo")
        .await
        .unwrap());
    fixture.runner.start("demo").await.unwrap();
    assert_eq!(fixture.probe.autofocus_calls(), calibration_cycles * 2);

    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_demo_scenario() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 1).await;

    fixture.runner.start("demo").await.unwrap();

    let calibration: Vec<String> = fixture
        .probe
        .events()
        .into_iter()
        .filter(|e| e.starts_with("light") || e == "autofocus" || e == "capture")
        .take(7)
        .collect();
    assert_eq!(
        calibration,
        vec![
            "light-on",
            "autofocus",
            "capture",
            "autofocus",
            "capture",
            "capture",
            "light-off"
        ]
    );
    assert!(fixture
        .runner
        .store()
        .project_dir("demo")
        .join("camera_settings.json")
        .is_file());

    // First capture right away, the next one an interval later
    sleep(Duration::from_millis(300)).await;
    assert_eq!(fixture.pictures("demo").len(), 1);
    sleep(Duration::from_millis(1000)).await;
    fixture.runner.stop().await.unwrap();

    let pictures = fixture.pictures("demo");
    assert_eq!(pictures.len(), 2);

    let records: Vec<CaptureRecord> = pictures
        .iter()
        .map(|name| {
            let path = fixture
                .runner
                .store()
                .project_dir("demo")
                .join("pictures")
                .join(format!("{}.json", name));
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
        })
        .collect();
    assert!(records.iter().all(|r| r.project == "demo"));
    assert!(records[0].timestamp_utc < records[1].timestamp_utc);

    let status = fixture.runner.status().await;
    assert_eq!(status.last_capture.as_ref(), records.last());
}

#[tokio::test]
async fn test_failing_capture_keeps_schedule() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 1).await;
    fixture.runner.start("demo").await.unwrap();
    fixture.probe.fail_next_captures(1);

    sleep(Duration::from_millis(1300)).await;
    fixture.runner.stop().await.unwrap();

    // The immediate tick failed, the next one went through
    assert_eq!(fixture.pictures("demo").len(), 1);
}

#[tokio::test]
async fn test_capture_now() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;

    assert!(matches!(
        fixture.runner.capture_now().await,
        Err(MeapisError::NoActiveProject)
    ));

    fixture.runner.start("demo").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    let metadata = fixture.runner.capture_now().await.unwrap();

    assert_eq!(metadata.record.project, "demo");
    assert_eq!(
        fixture.runner.status().await.last_capture,
        Some(metadata.record.clone())
    );
    assert_eq!(fixture.pictures("demo").len(), 2);
    // Manual captures leave the schedule alone
    assert_eq!(fixture.runner.status().await.interval, Some(3600));

    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_start_leaves_runner_idle() {
    let fixture = create_test_runner();
    fixture.add_project("good", 3600).await;
    fixture.add_project("bad", 3600).await;
    fixture.runner.start("good").await.unwrap();

    fixture.probe.script_autofocus(&[false; 3]);
    let err = fixture.runner.start("bad").await.unwrap_err();

    assert!(matches!(err, MeapisError::Calibration { .. }));
    assert_eq!(fixture.runner.active_project().await, None);
    assert_eq!(fixture.probe.live(), 0);
    assert!(fixture.runner.capture_now().await.is_err());
}

#[tokio::test]
async fn test_resume_from_marker() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;
    fixture
        .runner
        .store()
        .write_active_marker(Some("demo"))
        .await
        .unwrap();

    fixture.runner.start_initial(None).await.unwrap();

    assert_eq!(
        fixture.runner.active_project().await.as_deref(),
        Some("demo")
    );
    fixture.runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_resume_with_stale_marker_stays_idle() {
    let fixture = create_test_runner();
    fixture
        .runner
        .store()
        .write_active_marker(Some("gone"))
        .await
        .unwrap();

    fixture.runner.start_initial(None).await.unwrap();
    assert_eq!(fixture.runner.active_project().await, None);

    // An explicitly requested project must exist
    assert!(fixture
        .runner
        .start_initial(Some("gone"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_shutdown_keeps_marker_and_releases_hardware() {
    let fixture = create_test_runner();
    fixture.add_project("demo", 3600).await;
    fixture.runner.start("demo").await.unwrap();

    let exit_code = fixture.runner.shutdown().await;

    assert_eq!(exit_code, 0);
    assert_eq!(fixture.probe.live(), 0);
    assert!(fixture.runner.light().is_closed());
    assert_eq!(
        fixture.probe.events().last().map(String::as_str),
        Some("light-release")
    );
    assert_eq!(
        fixture
            .runner
            .store()
            .read_active_marker()
            .await
            .unwrap()
            .as_deref(),
        Some("demo")
    );
}

#[tokio::test]
async fn test_shutdown_closes_camera_after_stop_timeout() {
    let fixture =
        create_test_runner_with(|runner| runner.with_stop_timeout(Duration::from_millis(50)));
    fixture.add_project("demo", 3600).await;
    fixture.probe.delay_captures(Duration::from_millis(300));
    fixture.runner.start("demo").await.unwrap();
    // Let the first scheduled capture get under way
    sleep(Duration::from_millis(50)).await;

    let exit_code = fixture.runner.shutdown().await;

    assert_eq!(exit_code, 1);
    assert_eq!(fixture.probe.closed(), 1);
    assert_eq!(fixture.probe.live(), 0);
    assert!(fixture.runner.light().is_closed());

    let events = fixture.probe.events();
    let last_save = events.iter().rposition(|e| e == "save").unwrap();
    let close = events.iter().position(|e| e == "close").unwrap();
    assert!(last_save < close, "{:?}", events);
}

#[tokio::test]
async fn test_shutdown_when_idle() {
    let fixture = create_test_runner();

    assert_eq!(fixture.runner.shutdown().await, 0);
    assert!(fixture.runner.light().is_closed());
}

#[tokio::test]
async fn test_list_projects() {
    let fixture = create_test_runner();
    fixture.add_project("beta", 60).await;
    fixture.add_project("alpha", 60).await;

    assert_eq!(
        fixture.runner.list_projects().await.unwrap(),
        vec!["alpha", "beta"]
    );
}

#[tokio::test]
async fn test_from_config_simulated() {
    let dir = TempDir::new().unwrap();
    let mut config = MeapisConfig::default();
    config.system.data_dir = dir.path().to_path_buf();
    config.calibration.settle_delay_ms = 0;

    let runner = ProjectRunner::from_config(&config).unwrap();
    runner
        .store()
        .create_project("demo", &ProjectDescriptor::default())
        .await
        .unwrap();
    runner.start("demo").await.unwrap();

    assert_eq!(runner.status().await.active_project.as_deref(), Some("demo"));
    assert_eq!(runner.shutdown().await, 0);
}
