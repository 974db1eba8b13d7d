#![allow(dead_code)]

use devloop::config::{ConfigFile, RawConfigFile};
use devloop::devfile::{CommandDefinition, ResolvedCommand};
use devloop::errors::Result;
use devloop::types::GroupKind;

fn q(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

/// Builds a `Devloop.toml` document and parses it through the real loader
/// path (`toml` + `TryFrom`), so tests exercise validation and defaults.
///
/// Timings default to test-friendly values (50ms debounce, three 1ms
/// status polls, 1s job hint); override them with the setters.
pub struct ConfigFileBuilder {
    component: String,
    application: String,
    sections: Vec<String>,
    watch: Vec<String>,
    supervisor: Vec<String>,
    executor: Vec<String>,
}

impl ConfigFileBuilder {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            application: "app".to_string(),
            sections: Vec::new(),
            watch: vec![format!("delay = {}", q("50ms"))],
            supervisor: vec![format!(
                "status_schedule = [{}, {}, {}]",
                q("1ms"),
                q("1ms"),
                q("1ms")
            )],
            executor: vec![format!("hint_after = {}", q("1s"))],
        }
    }

    pub fn application(mut self, app: &str) -> Self {
        self.application = app.to_string();
        self
    }

    pub fn container(self, name: &str, image: &str) -> Self {
        self.raw(&format!(
            "[component.{name}]\ncontainer = {{ image = {} }}\n",
            q(image)
        ))
    }

    /// Container that does not receive synced sources.
    pub fn sidecar(self, name: &str, image: &str) -> Self {
        self.raw(&format!(
            "[component.{name}]\ncontainer = {{ image = {}, mount_sources = false }}\n",
            q(image)
        ))
    }

    pub fn kubernetes(self, name: &str, inlined: &str) -> Self {
        self.raw(&format!(
            "[component.{name}]\nkubernetes = {{ inlined = {} }}\n",
            q(inlined)
        ))
    }

    pub fn openshift(self, name: &str, inlined: &str) -> Self {
        self.raw(&format!(
            "[component.{name}]\nopenshift = {{ inlined = {} }}\n",
            q(inlined)
        ))
    }

    pub fn image(self, name: &str, image_name: &str) -> Self {
        self.raw(&format!(
            "[component.{name}]\nimage = {{ image_name = {} }}\n",
            q(image_name)
        ))
    }

    pub fn command(self, cmd: CommandBuilder) -> Self {
        let toml = cmd.to_toml();
        self.raw(&toml)
    }

    pub fn watch_delay(mut self, delay: &str) -> Self {
        self.watch[0] = format!("delay = {}", q(delay));
        self
    }

    pub fn use_hash(mut self) -> Self {
        self.watch.push("use_hash = true".to_string());
        self
    }

    pub fn status_schedule(mut self, schedule: &[&str]) -> Self {
        let items: Vec<String> = schedule.iter().map(|s| q(s)).collect();
        self.supervisor[0] = format!("status_schedule = [{}]", items.join(", "));
        self
    }

    pub fn hint_after(mut self, after: &str) -> Self {
        self.executor[0] = format!("hint_after = {}", q(after));
        self
    }

    /// Append an arbitrary TOML fragment.
    pub fn raw(mut self, toml: &str) -> Self {
        self.sections.push(toml.to_string());
        self
    }

    pub fn to_toml(&self) -> String {
        let mut out = format!(
            "[project]\ncomponent = {}\napplication = {}\n\n[watch]\n{}\n\n[supervisor]\n{}\n\n[executor]\n{}\n\n",
            q(&self.component),
            q(&self.application),
            self.watch.join("\n"),
            self.supervisor.join("\n"),
            self.executor.join("\n"),
        );
        for section in &self.sections {
            out.push_str(section);
            out.push('\n');
        }
        out
    }

    pub fn try_build(&self) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(&self.to_toml())?;
        ConfigFile::try_from(raw)
    }

    pub fn build(&self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

enum Kind {
    Exec {
        component: String,
        line: String,
        working_dir: Option<String>,
        env: Vec<(String, String)>,
        hot_reload: bool,
    },
    Apply {
        component: String,
    },
    Composite {
        commands: Vec<String>,
    },
}

/// One `[command.<id>]` table.
pub struct CommandBuilder {
    id: String,
    kind: Kind,
    group: Option<String>,
    default: bool,
}

impl CommandBuilder {
    pub fn exec(id: &str, component: &str, line: &str) -> Self {
        Self::with_kind(
            id,
            Kind::Exec {
                component: component.to_string(),
                line: line.to_string(),
                working_dir: None,
                env: Vec::new(),
                hot_reload: false,
            },
        )
    }

    pub fn apply(id: &str, component: &str) -> Self {
        Self::with_kind(
            id,
            Kind::Apply {
                component: component.to_string(),
            },
        )
    }

    pub fn composite(id: &str, commands: &[&str]) -> Self {
        Self::with_kind(
            id,
            Kind::Composite {
                commands: commands.iter().map(|c| c.to_string()).collect(),
            },
        )
    }

    fn with_kind(id: &str, kind: Kind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            group: None,
            default: false,
        }
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn hot_reload(mut self) -> Self {
        if let Kind::Exec { hot_reload, .. } = &mut self.kind {
            *hot_reload = true;
        }
        self
    }

    pub fn working_dir(mut self, dir: &str) -> Self {
        if let Kind::Exec { working_dir, .. } = &mut self.kind {
            *working_dir = Some(dir.to_string());
        }
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        if let Kind::Exec { env, .. } = &mut self.kind {
            env.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn to_toml(&self) -> String {
        let mut fields = Vec::new();
        let key = match &self.kind {
            Kind::Exec {
                component,
                line,
                working_dir,
                env,
                hot_reload,
            } => {
                fields.push(format!("component = {}", q(component)));
                fields.push(format!("command_line = {}", q(line)));
                if let Some(dir) = working_dir {
                    fields.push(format!("working_dir = {}", q(dir)));
                }
                if !env.is_empty() {
                    let pairs: Vec<String> = env
                        .iter()
                        .map(|(k, v)| format!("[{}, {}]", q(k), q(v)))
                        .collect();
                    fields.push(format!("env = [{}]", pairs.join(", ")));
                }
                if *hot_reload {
                    fields.push("hot_reload_capable = true".to_string());
                }
                "exec"
            }
            Kind::Apply { component } => {
                fields.push(format!("component = {}", q(component)));
                "apply"
            }
            Kind::Composite { commands } => {
                let items: Vec<String> = commands.iter().map(|c| q(c)).collect();
                fields.push(format!("commands = [{}]", items.join(", ")));
                "composite"
            }
        };
        if let Some(group) = &self.group {
            fields.push(format!("group = {}", q(group)));
        }
        if self.default {
            fields.push("default = true".to_string());
        }

        format!("[command.{}]\n{} = {{ {} }}\n", self.id, key, fields.join(", "))
    }
}

/// A resolved exec command without going through the walker.
pub fn resolved(
    id: &str,
    component: &str,
    line: &str,
    group: Option<GroupKind>,
    hot_reload_capable: bool,
) -> ResolvedCommand {
    ResolvedCommand {
        definition: CommandDefinition::new(id, line),
        component: component.to_string(),
        group,
        hot_reload_capable,
    }
}
