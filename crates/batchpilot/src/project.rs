//! Project file describing the pool to provision and the work to run on it.
//!
//! ```toml
//! [vm]
//! size = "STANDARD_D2_V2"
//! count = 2
//! max_tasks_per_node = 1
//!
//! [vm.virtual_machine]
//! publisher = "canonical"
//! offer = "0001-com-ubuntu-server-jammy"
//! sku = "22_04-lts"
//! node_agent_sku_id = "batch.node.ubuntu 22.04"
//!
//! [job]
//! timeout = "1h"
//! setup = ["pip install -r requirements.txt"]
//!
//! [[job.task]]
//! name = "unit tests"
//! command = "python -m pytest tests/unit"
//!
//! [[resource]]
//! path = "tests"
//! ```
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::common::error::BatchError;
use crate::common::utils::time::{
    deserialize_human_duration, deserialize_human_duration_opt, minutes,
};
use crate::remote::model::OsFamily;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectDef {
    vm: VmDef,
    job: JobDef,
    #[serde(default, rename = "resource")]
    resources: Vec<ResourceDef>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VmDef {
    size: String,
    count: u32,
    #[serde(default = "default_max_tasks_per_node")]
    max_tasks_per_node: u32,
    #[serde(default)]
    pool_keep_alive: bool,
    #[serde(default)]
    cloud_service: Option<CloudServiceDef>,
    #[serde(default)]
    virtual_machine: Option<VirtualMachineDef>,
}

fn default_max_tasks_per_node() -> u32 {
    1
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CloudServiceDef {
    os_family: String,
    #[serde(default = "default_os_version")]
    os_version: String,
}

fn default_os_version() -> String {
    "*".to_string()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VirtualMachineDef {
    publisher: String,
    offer: String,
    sku: String,
    #[serde(default = "default_image_version")]
    version: String,
    node_agent_sku_id: String,
}

fn default_image_version() -> String {
    "latest".to_string()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JobDef {
    #[serde(deserialize_with = "deserialize_human_duration")]
    timeout: Duration,
    #[serde(default)]
    setup: Vec<String>,
    #[serde(default, rename = "task")]
    tasks: Vec<TaskDef>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskDef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    command: String,
    #[serde(default, deserialize_with = "deserialize_human_duration_opt")]
    timeout: Option<Duration>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceDef {
    path: PathBuf,
    #[serde(default)]
    target: Option<String>,
}

/// Image the pool nodes are created from. Exactly one style is present in a valid project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmImage {
    CloudService {
        os_family: String,
        os_version: String,
    },
    VirtualMachine {
        publisher: String,
        offer: String,
        sku: String,
        version: String,
        node_agent_sku_id: String,
    },
}

impl VmImage {
    /// Cloud service pools always run Windows; virtual machine pools run Windows only when
    /// their node agent is a Windows agent.
    pub fn os_family(&self) -> OsFamily {
        match self {
            VmImage::CloudService { .. } => OsFamily::Windows,
            VmImage::VirtualMachine {
                node_agent_sku_id, ..
            } => {
                if node_agent_sku_id.to_lowercase().contains("windows") {
                    OsFamily::Windows
                } else {
                    OsFamily::Linux
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub image: VmImage,
    pub size: String,
    pub count: u32,
    pub max_tasks_per_node: u32,
    pub keep_alive: bool,
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub id: String,
    pub name: Option<String>,
    pub command: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub timeout: Duration,
    pub setup: Vec<String>,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub path: PathBuf,
    /// Path relative to the task working directory on the node.
    pub target: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub vm: VmConfig,
    pub job: JobConfig,
    pub resources: Vec<ResourceConfig>,
}

/// Wall-clock constraints are sent with minute granularity.
const MIN_TIMEOUT: Duration = minutes(1);

fn config_error<T>(message: impl Into<String>) -> crate::Result<T> {
    Err(BatchError::ConfigurationError(message.into()))
}

impl ProjectConfig {
    pub fn parse(text: &str) -> crate::Result<Self> {
        let def: ProjectDef = toml::from_str(text)?;
        Self::from_def(def)
    }

    /// Loads the project file. Relative resource paths are resolved against the directory
    /// of the project file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            BatchError::ConfigurationError(format!(
                "Cannot read project file {}: {error}",
                path.display()
            ))
        })?;
        let mut project = Self::parse(&text)?;
        if let Some(base) = path.parent() {
            for resource in &mut project.resources {
                if resource.path.is_relative() {
                    resource.path = base.join(&resource.path);
                }
            }
        }
        Ok(project)
    }

    fn from_def(def: ProjectDef) -> crate::Result<Self> {
        let ProjectDef { vm, job, resources } = def;

        let image = match (vm.cloud_service, vm.virtual_machine) {
            (Some(cs), None) => VmImage::CloudService {
                os_family: cs.os_family,
                os_version: cs.os_version,
            },
            (None, Some(vm)) => VmImage::VirtualMachine {
                publisher: vm.publisher,
                offer: vm.offer,
                sku: vm.sku,
                version: vm.version,
                node_agent_sku_id: vm.node_agent_sku_id,
            },
            (None, None) => {
                return config_error(
                    "Either `vm.cloud_service` or `vm.virtual_machine` has to be configured",
                );
            }
            (Some(_), Some(_)) => {
                return config_error(
                    "`vm.cloud_service` and `vm.virtual_machine` cannot be configured together",
                );
            }
        };
        if vm.count == 0 {
            return config_error("`vm.count` has to be at least 1");
        }
        if vm.max_tasks_per_node == 0 {
            return config_error("`vm.max_tasks_per_node` has to be at least 1");
        }
        if job.timeout < MIN_TIMEOUT {
            return config_error("`job.timeout` has to be at least one minute");
        }
        if job.tasks.is_empty() {
            return config_error("The job has to contain at least one `[[job.task]]`");
        }

        let mut ids = HashSet::new();
        let mut tasks = Vec::with_capacity(job.tasks.len());
        for (index, task) in job.tasks.into_iter().enumerate() {
            let id = task.id.unwrap_or_else(|| format!("task-{}", index + 1));
            if !ids.insert(id.clone()) {
                return config_error(format!("Task id `{id}` is used more than once"));
            }
            if task.timeout.is_some_and(|timeout| timeout < MIN_TIMEOUT) {
                return config_error(format!(
                    "Timeout of task `{id}` has to be at least one minute"
                ));
            }
            tasks.push(TaskConfig {
                id,
                name: task.name,
                command: task.command,
                timeout: task.timeout,
            });
        }

        Ok(ProjectConfig {
            vm: VmConfig {
                image,
                size: vm.size,
                count: vm.count,
                max_tasks_per_node: vm.max_tasks_per_node,
                keep_alive: vm.pool_keep_alive,
            },
            job: JobConfig {
                timeout: job.timeout,
                setup: job.setup,
                tasks,
            },
            resources: resources
                .into_iter()
                .map(|resource| ResourceConfig {
                    path: resource.path,
                    target: resource.target,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::common::error::BatchError;
    use crate::project::{ProjectConfig, VmImage};
    use crate::remote::model::OsFamily;

    const TASKS: &str = r#"
[job]
timeout = "30m"

[[job.task]]
command = "run.cmd"
"#;

    fn parse_with_vm(vm: &str) -> crate::Result<ProjectConfig> {
        ProjectConfig::parse(&format!("{vm}\n{TASKS}"))
    }

    #[test]
    fn parse_virtual_machine() {
        let project = ProjectConfig::parse(
            r#"
[vm]
size = "STANDARD_D2_V2"
count = 3
max_tasks_per_node = 2
pool_keep_alive = true

[vm.virtual_machine]
publisher = "canonical"
offer = "ubuntuserver"
sku = "18.04-lts"
node_agent_sku_id = "batch.node.ubuntu 18.04"

[job]
timeout = "1h 30m"
setup = ["apt-get install -y make"]

[[job.task]]
id = "unit"
name = "unit tests"
command = "make test"
timeout = "10m"

[[job.task]]
command = "make lint"

[[resource]]
path = "src"
target = "sources"
"#,
        )
        .unwrap();
        assert_eq!(project.vm.count, 3);
        assert_eq!(project.vm.max_tasks_per_node, 2);
        assert!(project.vm.keep_alive);
        assert_eq!(project.vm.image.os_family(), OsFamily::Linux);
        assert!(matches!(
            &project.vm.image,
            VmImage::VirtualMachine { version, .. } if version == "latest"
        ));
        assert_eq!(project.job.timeout, Duration::from_secs(90 * 60));
        assert_eq!(project.job.tasks[0].id, "unit");
        assert_eq!(project.job.tasks[0].timeout, Some(Duration::from_secs(600)));
        assert_eq!(project.job.tasks[1].id, "task-2");
        assert_eq!(project.resources[0].path, PathBuf::from("src"));
        assert_eq!(project.resources[0].target.as_deref(), Some("sources"));
    }

    #[test]
    fn parse_cloud_service_is_windows() {
        let project = parse_with_vm(
            r#"
[vm]
size = "small"
count = 1
[vm.cloud_service]
os_family = "5"
"#,
        )
        .unwrap();
        assert_eq!(project.vm.image.os_family(), OsFamily::Windows);
        assert_eq!(project.vm.max_tasks_per_node, 1);
    }

    #[test]
    fn windows_node_agent() {
        let image = VmImage::VirtualMachine {
            publisher: "MicrosoftWindowsServer".to_string(),
            offer: "WindowsServer".to_string(),
            sku: "2019-datacenter".to_string(),
            version: "latest".to_string(),
            node_agent_sku_id: "batch.node.Windows amd64".to_string(),
        };
        assert_eq!(image.os_family(), OsFamily::Windows);
    }

    #[test]
    fn missing_image_is_configuration_error() {
        let result = parse_with_vm("[vm]\nsize = \"small\"\ncount = 1\n");
        assert!(matches!(result, Err(BatchError::ConfigurationError(_))));
    }

    #[test]
    fn both_images_is_configuration_error() {
        let result = parse_with_vm(
            r#"
[vm]
size = "small"
count = 1
[vm.cloud_service]
os_family = "5"
[vm.virtual_machine]
publisher = "p"
offer = "o"
sku = "s"
node_agent_sku_id = "batch.node.ubuntu 22.04"
"#,
        );
        assert!(matches!(result, Err(BatchError::ConfigurationError(_))));
    }

    #[test]
    fn sub_minute_timeouts_are_rejected() {
        let project = |job_timeout: &str, task_timeout: &str| {
            ProjectConfig::parse(&format!(
                r#"
[vm]
size = "small"
count = 1
[vm.cloud_service]
os_family = "5"
[job]
timeout = "{job_timeout}"
[[job.task]]
command = "x"
timeout = "{task_timeout}"
"#
            ))
        };
        assert!(matches!(
            project("30s", "10m"),
            Err(BatchError::ConfigurationError(_))
        ));
        assert!(matches!(
            project("1h", "59s"),
            Err(BatchError::ConfigurationError(_))
        ));
        let config = project("1m", "1m").unwrap();
        assert_eq!(config.job.timeout, Duration::from_secs(60));
    }

    #[test]
    fn duplicate_task_id() {
        let result = ProjectConfig::parse(
            r#"
[vm]
size = "small"
count = 1
[vm.cloud_service]
os_family = "5"
[job]
timeout = "1h"
[[job.task]]
id = "a"
command = "x"
[[job.task]]
id = "a"
command = "y"
"#,
        );
        assert!(matches!(result, Err(BatchError::ConfigurationError(_))));
    }

    #[test]
    fn unknown_field() {
        let result = parse_with_vm(
            "[vm]\nsize = \"small\"\ncount = 1\ncolor = \"red\"\n[vm.cloud_service]\nos_family = \"5\"\n",
        );
        assert!(matches!(result, Err(BatchError::DeserializationError(_))));
    }

    #[test]
    fn load_resolves_resource_paths() {
        let dir = tempfile::TempDir::with_prefix("batchpilot").unwrap();
        let path = dir.path().join("project.toml");
        std::fs::write(
            &path,
            format!("[vm]\nsize = \"small\"\ncount = 1\n[vm.cloud_service]\nos_family = \"5\"\n{TASKS}\n[[resource]]\npath = \"data\"\n"),
        )
        .unwrap();
        let project = ProjectConfig::load(&path).unwrap();
        assert_eq!(project.resources[0].path, dir.path().join("data"));
    }

    #[test]
    fn load_missing_file() {
        let result = ProjectConfig::load(std::path::Path::new("/nonexistent/project.toml"));
        assert!(matches!(result, Err(BatchError::ConfigurationError(_))));
    }
}
