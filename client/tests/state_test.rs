use lumeai_lib::state::{
    CaptureState, ClientConfig, ConfigError, ConfigManager, GlobalConfig, Indicator, Persona,
    StateError, StateManager, StatusBoard,
};
use tempfile::TempDir;
use tokio::time::{Duration, timeout};

#[test]
fn test_state_manager_default() {
    let manager = StateManager::default();
    assert!(manager.current().is_idle());
}

#[tokio::test]
async fn test_capture_lifecycle_is_published() {
    let manager = StateManager::new();
    let mut rx = manager.subscribe();

    manager.transition(CaptureState::RequestingPermission).unwrap();
    manager.transition(CaptureState::Capturing).unwrap();
    manager.transition(CaptureState::Stopping).unwrap();
    manager.transition(CaptureState::Idle).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap());
    }
    assert_eq!(
        seen,
        vec![
            CaptureState::RequestingPermission,
            CaptureState::Capturing,
            CaptureState::Stopping,
            CaptureState::Idle
        ]
    );
}

#[test]
fn test_invalid_transition_keeps_state() {
    let manager = StateManager::new();
    let err = manager.transition(CaptureState::Capturing).unwrap_err();

    assert!(matches!(
        err,
        StateError::InvalidTransition {
            from: CaptureState::Idle,
            to: CaptureState::Capturing
        }
    ));
    assert!(manager.current().is_idle());
}

#[tokio::test]
async fn test_status_board_notifies() {
    let board = StatusBoard::new();
    let mut rx = board.subscribe();

    board.set_message("Listening...");
    board.set_connection(Indicator::Connected, "Connected");
    board.set_error("Connection error - Check your configuration");

    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.message, "Listening...");
    assert!(!first.is_error);

    let second = rx.recv().await.unwrap();
    assert_eq!(second.indicator, Indicator::Connected);

    let third = rx.recv().await.unwrap();
    assert!(third.is_error);
    assert_eq!(third.connection_label, "Connected");

    let snapshot = board.snapshot();
    assert_eq!(snapshot.indicator.class_name(), "status-connected");
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = ClientConfig::default();
    config.set_value("api.assembly_key", "aai-123").unwrap();
    config.set_value("api.gemini_key", "gem-456").unwrap();
    config.set_value("server.base_url", "https://lume.example.com/").unwrap();
    config.set_value("persona", "professor").unwrap();

    ConfigManager::save_to(&path, &config).unwrap();
    let loaded = ConfigManager::load_from(&path).unwrap();

    assert_eq!(loaded, config);
    assert!(loaded.is_ready());
    assert_eq!(loaded.server.base_url, "https://lume.example.com");
    assert_eq!(loaded.server.websocket_base(), "wss://lume.example.com");
    assert_eq!(loaded.persona, Persona::Professor);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"api":{"gemini_key":"g"},"persona":"robot"}"#).unwrap();

    let config = ConfigManager::load_from(&path).unwrap();
    assert_eq!(config.api.gemini_key, "g");
    assert_eq!(config.persona, Persona::Robot);
    assert_eq!(config.audio.frame_size, 4096);

    match config.validate() {
        Err(ConfigError::MissingKeys(keys)) => assert_eq!(keys, vec!["assembly_key"]),
        other => panic!("Expected missing assembly key, got {:?}", other),
    }
}

#[test]
fn test_corrupt_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        ConfigManager::load_from(&path),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn test_global_config_persona_switch() {
    let global = GlobalConfig::new(ClientConfig::default());
    let before = global.get();

    global.set_persona(Persona::Cowboy);

    assert_eq!(global.persona(), Persona::Cowboy);
    assert_eq!(before.persona, Persona::Default);
}

#[test]
fn test_validated_save_and_reset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let mut config = ClientConfig::default();
    config.api.gemini_key = "gem".into();
    assert!(matches!(
        ConfigManager::save_validated_to(&path, &config),
        Err(ConfigError::MissingKeys(_))
    ));
    assert!(!path.exists());

    config.api.assembly_key = "aai".into();
    ConfigManager::save_validated_to(&path, &config).unwrap();
    assert!(ConfigManager::load_from(&path).unwrap().is_ready());

    let reset = ConfigManager::reset_at(&path).unwrap();
    assert_eq!(reset, ClientConfig::default());
    assert!(!ConfigManager::load_from(&path).unwrap().is_ready());
}
