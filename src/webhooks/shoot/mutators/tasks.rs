use std::fmt;
use std::str::FromStr;

use kube::ResourceExt;
use tracing::debug;

use crate::resources::shoots::{
    LastOperationState, Shoot, CREATED_BY_ANNOTATION, FAILED_SHOOT_NEEDS_RETRY_OPERATION_ANNOTATION,
    MAINTENANCE_OPERATION_ANNOTATION, OPERATION_ANNOTATION, OPERATION_ROTATE_CREDENTIALS_START,
    OPERATION_ROTATE_CREDENTIALS_START_WITHOUT_WORKERS_ROLLOUT, OPERATION_ROTATE_SSH_KEYPAIR,
    SHOOT_TASKS_ANNOTATION,
};

/// A reconciliation step that must be redone by the next Shoot reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    DeployInfrastructure,
    DeployDnsRecordInternal,
    DeployDnsRecordExternal,
    DeployDnsRecordIngress,
}

impl Task {
    pub const ALL: [Task; 4] = [
        Task::DeployInfrastructure,
        Task::DeployDnsRecordInternal,
        Task::DeployDnsRecordExternal,
        Task::DeployDnsRecordIngress,
    ];

    pub const DNS: [Task; 3] = [
        Task::DeployDnsRecordInternal,
        Task::DeployDnsRecordExternal,
        Task::DeployDnsRecordIngress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Task::DeployInfrastructure => "deployInfrastructure",
            Task::DeployDnsRecordInternal => "deployDNSRecordInternal",
            Task::DeployDnsRecordExternal => "deployDNSRecordExternal",
            Task::DeployDnsRecordIngress => "deployDNSRecordIngress",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown task {0:?}")]
pub struct UnknownTask(String);

impl FromStr for Task {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

/// The ordered contents of the tasks annotation.
///
/// Entries are only ever appended. Anything already present, including names this crate
/// does not know, is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSet {
    entries: Vec<String>,
    changed: bool,
}

impl TaskSet {
    pub fn parse(annotation: Option<&str>) -> Self {
        let mut entries: Vec<String> = Vec::new();
        for entry in annotation.unwrap_or_default().split(',').map(str::trim) {
            if !entry.is_empty() && !entries.iter().any(|e| e == entry) {
                entries.push(entry.to_string());
            }
        }
        Self {
            entries,
            changed: false,
        }
    }

    /// Adds `task` unless it is already present.
    pub fn add(&mut self, task: Task) {
        if !self.contains(task) {
            self.entries.push(task.as_str().to_string());
            self.changed = true;
        }
    }

    pub fn add_all(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            self.add(task);
        }
    }

    pub fn contains(&self, task: Task) -> bool {
        self.entries.iter().any(|e| e == task.as_str())
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

impl fmt::Display for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join(","))
    }
}

fn requests_credentials_rotation(shoot: &Shoot) -> bool {
    let annotations = shoot.annotations();
    [OPERATION_ANNOTATION, MAINTENANCE_OPERATION_ANNOTATION]
        .into_iter()
        .filter_map(|key| annotations.get(key))
        .any(|op| {
            matches!(
                op.as_str(),
                OPERATION_ROTATE_SSH_KEYPAIR
                    | OPERATION_ROTATE_CREDENTIALS_START
                    | OPERATION_ROTATE_CREDENTIALS_START_WITHOUT_WORKERS_ROLLOUT
            )
        })
}

/// Tasks the change from `old` to `new` requires. `old` is `None` on create.
pub fn required_tasks(new: &Shoot, old: Option<&Shoot>, tasks: &mut TaskSet) {
    let Some(old) = old else {
        tasks.add_all(Task::ALL);
        return;
    };

    if old.spec.is_hibernated() && !new.spec.is_hibernated() {
        tasks.add_all(Task::ALL);
    }

    if old.spec.provider.infrastructure_config != new.spec.provider.infrastructure_config
        || old.spec.ip_families() != new.spec.ip_families()
    {
        tasks.add(Task::DeployInfrastructure);
    }

    if old.spec.ssh_access_enabled() != new.spec.ssh_access_enabled() {
        tasks.add(Task::DeployInfrastructure);
    }

    if old.spec.dns != new.spec.dns {
        tasks.add_all(Task::DNS);
    }

    if requests_credentials_rotation(new) {
        tasks.add(Task::DeployInfrastructure);
    }
}

fn needs_retry_operation(new: &Shoot, old: &Shoot) -> bool {
    let last_failed = old
        .status
        .as_ref()
        .and_then(|s| s.last_operation.as_ref())
        .is_some_and(|op| op.state == LastOperationState::Failed);

    new.spec.confines_spec_update_rollout() && last_failed && old.spec != new.spec
}

/// Updates the tasks annotation and the retry marker of `new`.
pub fn add_tasks(new: &mut Shoot, old: Option<&Shoot>) {
    let mut tasks = TaskSet::parse(
        new.annotations()
            .get(SHOOT_TASKS_ANNOTATION)
            .map(String::as_str),
    );
    required_tasks(new, old, &mut tasks);

    if tasks.is_changed() {
        debug!(tasks = %tasks, "Scheduling reconciliation tasks");
        new.annotations_mut()
            .insert(SHOOT_TASKS_ANNOTATION.to_string(), tasks.to_string());
    }

    if old.is_some_and(|old| needs_retry_operation(new, old)) {
        debug!("Marking failed shoot for retry");
        new.annotations_mut().insert(
            FAILED_SHOOT_NEEDS_RETRY_OPERATION_ANNOTATION.to_string(),
            "true".to_string(),
        );
    }
}

/// Records the creating user. Only called on create.
pub fn set_created_by(shoot: &mut Shoot, username: &str) {
    shoot
        .annotations_mut()
        .insert(CREATED_BY_ANNOTATION.to_string(), username.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::shoots::{
        Dns, Hibernation, IpFamily, LastOperation, Maintenance, Networking, ShootSpec, ShootStatus,
        SshAccess, WorkersSettings,
    };
    use k8s_openapi::apimachinery::pkg::runtime::RawExtension;

    fn shoot() -> Shoot {
        let mut spec = ShootSpec::default();
        spec.kubernetes.version = "1.27.3".into();
        Shoot::new("dev", spec)
    }

    fn tasks_of(shoot: &Shoot) -> Option<&str> {
        shoot
            .annotations()
            .get(SHOOT_TASKS_ANNOTATION)
            .map(String::as_str)
    }

    #[test]
    fn create_schedules_every_task() {
        let mut new = shoot();
        add_tasks(&mut new, None);
        assert_eq!(
            tasks_of(&new),
            Some("deployInfrastructure,deployDNSRecordInternal,deployDNSRecordExternal,deployDNSRecordIngress")
        );
    }

    #[test]
    fn unchanged_update_leaves_annotations_untouched() {
        let old = shoot();
        let mut new = old.clone();
        add_tasks(&mut new, Some(&old));
        assert_eq!(new.metadata.annotations, old.metadata.annotations);
    }

    #[test]
    fn waking_up_schedules_every_task() {
        let mut old = shoot();
        old.spec.hibernation = Some(Hibernation {
            enabled: Some(true),
        });
        let mut new = old.clone();
        new.spec.hibernation = Some(Hibernation {
            enabled: Some(false),
        });

        add_tasks(&mut new, Some(&old));

        let tasks = TaskSet::parse(tasks_of(&new));
        assert!(Task::ALL.into_iter().all(|t| tasks.contains(t)));
    }

    #[test]
    fn going_to_sleep_schedules_nothing() {
        let old = shoot();
        let mut new = old.clone();
        new.spec.hibernation = Some(Hibernation {
            enabled: Some(true),
        });
        add_tasks(&mut new, Some(&old));
        assert_eq!(tasks_of(&new), None);
    }

    #[test]
    fn dns_change_schedules_dns_tasks_only() {
        let old = shoot();
        let mut new = old.clone();
        new.spec.dns = Some(Dns {
            domain: Some("dev.example.com".into()),
            providers: None,
        });

        add_tasks(&mut new, Some(&old));
        assert_eq!(
            tasks_of(&new),
            Some("deployDNSRecordInternal,deployDNSRecordExternal,deployDNSRecordIngress")
        );
    }

    #[test]
    fn infrastructure_changes_schedule_infrastructure() {
        let old = shoot();

        let mut ssh_disabled = old.clone();
        ssh_disabled.spec.provider.workers_settings = Some(WorkersSettings {
            ssh_access: Some(SshAccess {
                enabled: Some(false),
            }),
        });

        let mut config_changed = old.clone();
        config_changed.spec.provider.infrastructure_config =
            Some(RawExtension(serde_json::json!({"vpc": {"cidr": "10.0.0.0/16"}})));

        let mut dual_stack = old.clone();
        dual_stack.spec.networking = Some(Networking {
            ip_families: Some(vec![IpFamily::IPv4, IpFamily::IPv6]),
            ..Default::default()
        });

        for mut new in [ssh_disabled, config_changed, dual_stack] {
            add_tasks(&mut new, Some(&old));
            assert_eq!(tasks_of(&new), Some("deployInfrastructure"));
        }
    }

    #[test]
    fn explicit_ssh_enabled_is_not_a_change() {
        let old = shoot();
        let mut new = old.clone();
        new.spec.provider.workers_settings = Some(WorkersSettings {
            ssh_access: Some(SshAccess {
                enabled: Some(true),
            }),
        });
        add_tasks(&mut new, Some(&old));
        assert_eq!(tasks_of(&new), None);
    }

    #[test]
    fn rotation_operations_schedule_infrastructure() {
        let old = shoot();
        for (key, op) in [
            (OPERATION_ANNOTATION, OPERATION_ROTATE_SSH_KEYPAIR),
            (OPERATION_ANNOTATION, OPERATION_ROTATE_CREDENTIALS_START),
            (
                MAINTENANCE_OPERATION_ANNOTATION,
                OPERATION_ROTATE_CREDENTIALS_START_WITHOUT_WORKERS_ROLLOUT,
            ),
        ] {
            let mut new = old.clone();
            new.annotations_mut().insert(key.into(), op.into());
            add_tasks(&mut new, Some(&old));
            assert_eq!(tasks_of(&new), Some("deployInfrastructure"), "{key}={op}");
        }

        let mut new = old.clone();
        new.annotations_mut()
            .insert(OPERATION_ANNOTATION.into(), "reconcile".into());
        add_tasks(&mut new, Some(&old));
        assert_eq!(tasks_of(&new), None);
    }

    #[test]
    fn existing_entries_are_kept_and_not_duplicated() {
        let old = shoot();
        let mut new = old.clone();
        new.annotations_mut().insert(
            SHOOT_TASKS_ANNOTATION.into(),
            "deployDNSRecordExternal,restartControlPlanePods".into(),
        );
        new.spec.dns = Some(Dns::default());

        add_tasks(&mut new, Some(&old));
        assert_eq!(
            tasks_of(&new),
            Some("deployDNSRecordExternal,restartControlPlanePods,deployDNSRecordInternal,deployDNSRecordIngress")
        );
    }

    #[test]
    fn satisfied_triggers_do_not_rewrite_the_annotation() {
        let old = shoot();
        let mut new = old.clone();
        new.annotations_mut().insert(
            SHOOT_TASKS_ANNOTATION.into(),
            " deployInfrastructure ".into(),
        );
        new.annotations_mut()
            .insert(OPERATION_ANNOTATION.into(), OPERATION_ROTATE_SSH_KEYPAIR.into());

        add_tasks(&mut new, Some(&old));
        assert_eq!(tasks_of(&new), Some(" deployInfrastructure "));
    }

    fn failed(mut shoot: Shoot) -> Shoot {
        shoot.status = Some(ShootStatus {
            last_operation: Some(LastOperation {
                r#type: "Reconcile".into(),
                state: LastOperationState::Failed,
                description: None,
            }),
        });
        shoot
    }

    fn confined(mut shoot: Shoot) -> Shoot {
        shoot.spec.maintenance = Some(Maintenance {
            confine_spec_update_rollout: Some(true),
        });
        shoot
    }

    fn retry_marker(shoot: &Shoot) -> Option<&str> {
        shoot
            .annotations()
            .get(FAILED_SHOOT_NEEDS_RETRY_OPERATION_ANNOTATION)
            .map(String::as_str)
    }

    #[test]
    fn edited_failed_shoot_with_confined_rollout_is_marked_for_retry() {
        let old = failed(confined(shoot()));
        let mut new = old.clone();
        new.spec.kubernetes.version = "1.27.4".into();

        add_tasks(&mut new, Some(&old));
        assert_eq!(retry_marker(&new), Some("true"));
        assert_eq!(tasks_of(&new), None);
    }

    #[test]
    fn retry_marker_needs_every_condition() {
        // unchanged spec
        let old = failed(confined(shoot()));
        let mut new = old.clone();
        add_tasks(&mut new, Some(&old));
        assert_eq!(retry_marker(&new), None);

        // rollout not confined
        let old = failed(shoot());
        let mut new = old.clone();
        new.spec.kubernetes.version = "1.27.4".into();
        add_tasks(&mut new, Some(&old));
        assert_eq!(retry_marker(&new), None);

        // last operation succeeded
        let mut old = failed(confined(shoot()));
        if let Some(op) = old.status.as_mut().and_then(|s| s.last_operation.as_mut()) {
            op.state = LastOperationState::Succeeded;
        }
        let mut new = old.clone();
        new.spec.kubernetes.version = "1.27.4".into();
        add_tasks(&mut new, Some(&old));
        assert_eq!(retry_marker(&new), None);
    }

    #[test]
    fn task_names_round_trip_through_parsing() {
        for task in Task::ALL {
            assert_eq!(task.as_str().parse::<Task>(), Ok(task));
        }
        assert!("deployWorkers".parse::<Task>().is_err());

        let set = TaskSet::parse(Some("deployInfrastructure,foo,,deployInfrastructure"));
        assert_eq!(set.to_string(), "deployInfrastructure,foo");
        assert!(set.contains(Task::DeployInfrastructure));
        assert!(!set.is_changed());
    }

    #[test]
    fn created_by_is_recorded() {
        let mut new = shoot();
        set_created_by(&mut new, "alice@example.com");
        assert_eq!(
            new.annotations().get(CREATED_BY_ANNOTATION).map(String::as_str),
            Some("alice@example.com")
        );
    }
}
