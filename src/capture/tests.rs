use super::*;
use crate::config::CalibrationConfig;
use crate::error::MeapisError;
use crate::light::LightController;
use crate::project::{CalibrationSettings, Project, ProjectDescriptor, ProjectStore};
use crate::testing::{RecordingLine, ScriptedFactory};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: ProjectStore,
    project: Arc<Project>,
    factory: ScriptedFactory,
    light: Arc<LightController>,
    calibration: CalibrationConfig,
}

async fn create_fixture(descriptor: ProjectDescriptor) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = ProjectStore::new(dir.path()).with_host("station");
    store.create_project("demo", &descriptor).await.unwrap();
    let project = Arc::new(store.load_project("demo").await.unwrap());
    let factory = ScriptedFactory::new();
    let light = Arc::new(LightController::new(Box::new(RecordingLine::new(
        &factory.probe,
    ))));

    Fixture {
        _dir: dir,
        store,
        project,
        factory,
        light,
        calibration: CalibrationConfig {
            max_autofocus_attempts: 3,
            settle_delay_ms: 0,
        },
    }
}

fn v3_descriptor() -> ProjectDescriptor {
    ProjectDescriptor {
        camera: 1,
        interval: 5,
        ..ProjectDescriptor::default()
    }
}

impl Fixture {
    async fn open(&self) -> crate::error::Result<CaptureController> {
        CaptureController::open(
            Arc::clone(&self.project),
            &self.store,
            &self.factory,
            Arc::clone(&self.light),
            &self.calibration,
        )
        .await
    }

    /// Light, autofocus and capture events only
    fn key_events(&self) -> Vec<String> {
        self.factory
            .probe
            .events()
            .into_iter()
            .filter(|e| e.starts_with("light") || e == "autofocus" || e.starts_with("capture"))
            .collect()
    }

    fn files_in(&self, dir: &std::path::Path, suffix: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(suffix))
            .count()
    }
}

#[tokio::test]
async fn test_open_calibrates_and_persists_settings() {
    let fixture = create_fixture(v3_descriptor()).await;

    let controller = fixture.open().await.unwrap();

    assert_eq!(
        fixture.key_events(),
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

    let saved = fixture
        .store
        .load_calibration(&fixture.project)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        saved,
        CalibrationSettings {
            lens_position: 8.5,
            analogue_gain: 2.0,
            exposure_time: 16_000,
        }
    );

    let picture = controller.picture_profile().configuration();
    assert_eq!(picture.float(crate::camera::Control::LensPosition), Some(8.5));
    assert_eq!(picture.float(crate::camera::Control::AnalogueGain), Some(2.0));

    // Two focus diagnostics and one exposure diagnostic
    assert_eq!(fixture.files_in(&fixture.project.setup_dir, "-focus.jpg"), 2);
    assert_eq!(fixture.files_in(&fixture.project.setup_dir, "-exposure.jpg"), 1);
    assert_eq!(
        fixture.files_in(&fixture.project.setup_dir, "-metadata.json"),
        3
    );
}

#[tokio::test]
async fn test_open_reuses_saved_settings() {
    let fixture = create_fixture(v3_descriptor()).await;
    let settings = CalibrationSettings {
        lens_position: 6.0,
        analogue_gain: 1.25,
        exposure_time: 20_000,
    };
    fixture
        .store
        .save_calibration(&fixture.project, &settings)
        .await
        .unwrap();

    let controller = fixture.open().await.unwrap();

    assert_eq!(fixture.factory.probe.autofocus_calls(), 0);
    assert!(fixture.key_events().is_empty());

    let metadata = controller.take_picture().await.unwrap();
    assert_eq!(metadata.lens_position(), Some(6.0));
    assert_eq!(metadata.analogue_gain(), Some(1.25));
    assert_eq!(metadata.exposure_time(), Some(20_000));
}

#[tokio::test]
async fn test_autofocus_retries_until_success() {
    let fixture = create_fixture(v3_descriptor()).await;
    fixture.factory.probe.script_autofocus(&[false, false]);

    fixture.open().await.unwrap();

    // Two failures, then two successful passes
    assert_eq!(fixture.factory.probe.autofocus_calls(), 4);
    assert_eq!(fixture.files_in(&fixture.project.setup_dir, "-focus.jpg"), 4);
}

#[tokio::test]
async fn test_autofocus_gives_up_after_bound() {
    let fixture = create_fixture(v3_descriptor()).await;
    fixture.factory.probe.script_autofocus(&[false; 3]);

    let err = fixture.open().await.err().unwrap();

    assert!(matches!(err, MeapisError::Calibration { .. }), "{:?}", err);
    assert_eq!(fixture.factory.probe.autofocus_calls(), 3);
    // Device released and light left off
    assert_eq!(fixture.factory.probe.closed(), 1);
    assert_eq!(fixture.factory.probe.live(), 0);
    assert_eq!(
        fixture.key_events().last().map(String::as_str),
        Some("light-off")
    );
    assert!(fixture
        .store
        .load_calibration(&fixture.project)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_exposure_metadata_fails_calibration() {
    let fixture = create_fixture(v3_descriptor()).await;
    fixture.factory.probe.strip_gain(true);

    let err = fixture.open().await.err().unwrap();

    match err {
        MeapisError::Calibration { project, reason } => {
            assert_eq!(project, "demo");
            assert!(reason.contains("AnalogueGain"), "{}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(fixture.factory.probe.live(), 0);
}

#[tokio::test]
async fn test_take_picture_with_light_and_sidecar() {
    let fixture = create_fixture(v3_descriptor()).await;
    let controller = fixture.open().await.unwrap();
    fixture.factory.probe.clear_events();

    let metadata = controller.take_picture().await.unwrap();

    assert_eq!(
        fixture.key_events(),
        vec!["light-on", "capture", "light-off"]
    );
    assert_eq!(metadata.record.project, "demo");
    assert!(metadata.record.path.is_file());

    let sidecar = sidecar_path(&metadata.record.path);
    let record: CaptureRecord =
        serde_json::from_slice(&std::fs::read(&sidecar).unwrap()).unwrap();
    assert_eq!(record, metadata.record);
}

#[tokio::test]
async fn test_take_picture_without_light() {
    let fixture = create_fixture(ProjectDescriptor {
        use_light: false,
        ..v3_descriptor()
    })
    .await;
    let controller = fixture.open().await.unwrap();
    fixture.factory.probe.clear_events();

    controller.take_picture().await.unwrap();

    assert_eq!(fixture.key_events(), vec!["capture"]);
}

#[tokio::test]
async fn test_failed_capture_turns_light_off() {
    let fixture = create_fixture(v3_descriptor()).await;
    let controller = fixture.open().await.unwrap();
    fixture.factory.probe.clear_events();
    fixture.factory.probe.fail_next_captures(1);

    assert!(controller.take_picture().await.is_err());
    assert_eq!(
        fixture.key_events(),
        vec!["light-on", "capture-failed", "light-off"]
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let fixture = create_fixture(v3_descriptor()).await;
    let controller = fixture.open().await.unwrap();

    controller.close().await;
    controller.close().await;

    assert!(controller.is_closed().await);
    assert_eq!(fixture.factory.probe.closed(), 1);
    assert!(controller.take_picture().await.is_err());
}

#[tokio::test]
async fn test_open_failure_leaves_nothing_open() {
    let fixture = create_fixture(v3_descriptor()).await;
    fixture.factory.probe.fail_open(true);

    assert!(fixture.open().await.is_err());
    assert_eq!(fixture.factory.probe.opened(), 0);
    assert!(fixture.key_events().is_empty());
}
