//! Built-in implements present in every catalogue
//!
//! Constructed once and handed to the merge engine explicitly. Merging never
//! lets a document replace one of these.

use std::collections::BTreeMap;

use super::models::{Corrects, Implement, Observes, Operations, Reacts, INSTANCE_PLACEHOLDER};

// `is-active` exits non-zero for every state but active; the printed state is
// the observation result either way
const SYSTEMD_SERVICE_SCRIPT: &str = r#"case "$1" in
  observe) systemctl is-active "$2" || true ;;
  react) systemctl restart "$2" ;;
  *) echo "unknown mode $1" >&2; exit 2 ;;
esac
"#;

const FILE_PRESENCE_SCRIPT: &str = r#"case "$1" in
  observe) if [ -e "$2" ]; then echo present; else echo absent; fi ;;
  react) touch "$2" ;;
  *) echo "unknown mode $1" >&2; exit 2 ;;
esac
"#;

/// Read-only table of built-in implements, keyed by name
#[derive(Debug, Clone, Default)]
pub struct DefaultImplements {
    implements: BTreeMap<String, Implement>,
}

impl DefaultImplements {
    /// The table shipped with regulator, run through the given shell
    pub fn builtin(shell: &str) -> Self {
        let mut implements = BTreeMap::new();
        implements.insert(
            "systemd_service".to_string(),
            shell_implement(
                shell,
                SYSTEMD_SERVICE_SCRIPT,
                "systemd",
                "service_state",
                "active",
                &["inactive", "failed"],
            ),
        );
        implements.insert(
            "file_presence".to_string(),
            shell_implement(
                shell,
                FILE_PRESENCE_SCRIPT,
                "file",
                "presence",
                "present",
                &["absent"],
            ),
        );
        Self { implements }
    }

    /// Upsert every default into `ops`, replacing whatever sits under a
    /// default's name
    pub fn seed(&self, ops: &mut Operations) {
        for (name, implement) in &self.implements {
            ops.implements.insert(name.clone(), implement.clone());
        }
    }

    /// A table with no entries
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a table from explicit entries
    pub fn from_map(implements: BTreeMap<String, Implement>) -> Self {
        Self { implements }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.implements.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Implement> {
        self.implements.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Implement)> {
        self.implements.iter()
    }

    pub fn len(&self) -> usize {
        self.implements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.implements.is_empty()
    }
}

fn shell_implement(
    shell: &str,
    script: &str,
    entity: &str,
    query: &str,
    results_in: &str,
    starts_from: &[&str],
) -> Implement {
    Implement {
        exe: shell.to_string(),
        path: None,
        script: Some(script.to_string()),
        observes: Some(Observes {
            entity: entity.to_string(),
            query: query.to_string(),
            args: vec!["observe".to_string(), INSTANCE_PLACEHOLDER.to_string()],
        }),
        reacts: Some(Reacts {
            args: vec!["react".to_string(), INSTANCE_PLACEHOLDER.to_string()],
            corrects: Some(Corrects {
                entity: entity.to_string(),
                query: query.to_string(),
                results_in: results_in.to_string(),
                starts_from: starts_from.iter().map(|s| s.to_string()).collect(),
            }),
        }),
    }
}
