//! Loading configuration documents from disk.

use std::fs;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use sentinel_config::{ConfigDocument, ConfigError, LogFormat, ServicesConfig};

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).expect("write configuration");
        path
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    Workspace { _dir: dir, root }
}

#[rstest]
fn loads_manager_settings_and_services(workspace: Workspace) {
    let path = workspace.write(
        "sentinel.json",
        r#"{
            "port": 7000,
            "home_path": "/srv/app",
            "timeout": 2.5,
            "log_format": "compact",
            "sentinel": {
                "pluggins": [
                    {"name": "a", "module-path": "demo.worker", "run-count": 2, "proc-interval": 0.2}
                ],
                "processes": [
                    {"name": "b", "proc-path": "/bin/sh", "run-count": 1, "manage-port": true, "active": false}
                ]
            }
        }"#,
    );

    let document = ConfigDocument::load(&path).expect("load document");
    assert_eq!(document.config.port, 7000);
    assert_eq!(document.config.home_path, Utf8PathBuf::from("/srv/app"));
    assert_eq!(document.config.log_format, LogFormat::Compact);

    let services = ServicesConfig::from_value(&document.services).expect("services parse");
    assert_eq!(services.pluggins.len(), 1);
    assert_eq!(services.processes.len(), 1);
    let process = services.processes.first().expect("process entry");
    assert!(!process.active, "inactive flag should survive decoding");
}

#[rstest]
fn missing_file_reports_read_error(workspace: Workspace) {
    let error = ConfigDocument::load(&workspace.root.join("absent.json")).expect_err("must fail");
    assert!(matches!(error, ConfigError::Read { .. }));
}

#[rstest]
fn invalid_json_reports_path(workspace: Workspace) {
    let path = workspace.write("broken.json", "{ not json");
    let error = ConfigDocument::load(&path).expect_err("must fail");
    let message = error.to_string();
    assert!(
        message.contains("broken.json"),
        "expected path in message: {message}"
    );
}
