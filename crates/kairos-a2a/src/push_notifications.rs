use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{PushNotificationConfig, Task};
use uuid::Uuid;

/// `*/pushNotificationConfigs` CRUD (§4.10): create, list/one, delete,
/// operating directly on `Task.push_notification_configs` — the task is the
/// sole owner of its configs (§3).
pub fn create(task: &mut Task, url: String, token: Option<String>) -> PushNotificationConfig {
    let config = PushNotificationConfig {
        id: Uuid::new_v4().to_string(),
        url,
        token,
    };
    task.push_notification_configs.push(config.clone());
    config
}

pub fn list(task: &Task) -> &[PushNotificationConfig] {
    &task.push_notification_configs
}

pub fn get<'a>(task: &'a Task, id: &str) -> Option<&'a PushNotificationConfig> {
    task.push_notification_configs.iter().find(|c| c.id == id)
}

pub fn delete(task: &mut Task, id: &str) -> KairosResult<()> {
    let before = task.push_notification_configs.len();
    task.push_notification_configs.retain(|c| c.id != id);
    if task.push_notification_configs.len() == before {
        return Err(KairosError::not_found(format!(
            "no push notification config {id} on task {}",
            task.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kairos_protocol::ContextId;

    #[test]
    fn create_list_get_delete_round_trip() {
        let mut task = Task::new(ContextId::default(), Utc::now());
        let config = create(&mut task, "https://example.com/hook".to_owned(), None);
        assert_eq!(list(&task).len(), 1);
        assert!(get(&task, &config.id).is_some());
        delete(&mut task, &config.id).unwrap();
        assert!(list(&task).is_empty());
    }

    #[test]
    fn delete_unknown_id_fails() {
        let mut task = Task::new(ContextId::default(), Utc::now());
        assert!(delete(&mut task, "missing").is_err());
    }
}
