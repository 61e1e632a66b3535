use super::*;
use tempfile::tempdir;

#[test]
fn lazily_creates_one_log_per_project() {
    let dir = tempdir().unwrap();
    let registry = LogRegistry::new(dir.path(), RotationPolicy::default());
    let id = ProjectId::new();

    registry.append(&id, Direction::Client, serde_json::json!("hi")).unwrap();
    let expected_dir = dir.path().join("projects").join(id.as_str()).join("logs");
    assert!(expected_dir.exists());
}

#[test]
fn repeated_lookups_return_the_same_log_handle() {
    let dir = tempdir().unwrap();
    let registry = LogRegistry::new(dir.path(), RotationPolicy::default());
    let id = ProjectId::new();

    registry.append(&id, Direction::Client, serde_json::json!("a")).unwrap();
    registry.append(&id, Direction::Agent, serde_json::json!("b")).unwrap();

    let since = chrono::DateTime::<chrono::Utc>::MIN_UTC;
    let messages = registry.messages_since(&id, since).unwrap();
    assert_eq!(messages.len(), 2);
}

#[test]
fn different_projects_get_independent_logs() {
    let dir = tempdir().unwrap();
    let registry = LogRegistry::new(dir.path(), RotationPolicy::default());
    let a = ProjectId::new();
    let b = ProjectId::new();

    registry.append(&a, Direction::Client, serde_json::json!("for a")).unwrap();

    let since = chrono::DateTime::<chrono::Utc>::MIN_UTC;
    assert_eq!(registry.messages_since(&a, since).unwrap().len(), 1);
    assert!(registry.messages_since(&b, since).unwrap().is_empty());
}
