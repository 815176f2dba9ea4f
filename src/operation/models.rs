//! Operation models - the records a catalogue document is made of
//!
//! Observations, reactions, actions and implements, plus the result of running
//! an observation. Every record deserializes strictly: unknown fields are a
//! parse error, not something to silently ignore.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Placeholder argument replaced with the triggering observation's instance
pub const INSTANCE_PLACEHOLDER: &str = "instance";

/// Separator between fields fed into a conflict key digest
const KEY_FIELD_SEPARATOR: &str = "\u{1f}";

/// Shared behaviour of every catalogue record
pub trait Entity {
    /// True when a required field is unset
    fn is_empty(&self) -> bool;

    /// Conflict keys derived from the semantically significant fields.
    ///
    /// Names never take part. Two records of any kind producing the same key
    /// describe the same real-world check or effect.
    fn hash_keys(&self) -> BTreeSet<String>;
}

/// Which of the four catalogue mappings a record lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Observation,
    Reaction,
    Action,
    Implement,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Observation => "Observation",
            Self::Reaction => "Reaction",
            Self::Action => "Action",
            Self::Implement => "Implement",
        };
        f.write_str(label)
    }
}

/// Digest of an ordered field tuple, rendered as lowercase hex
pub fn conflict_key(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fields.join(KEY_FIELD_SEPARATOR).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Accepts an explicit `null` (e.g. `observations:` with nothing under it)
/// as the empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_set(value: &str) -> bool {
    !value.is_empty()
}

/// Exactly one of a script file or an inline script body
fn one_source(path: &Option<String>, script: &Option<String>) -> bool {
    let has_path = path.as_deref().is_some_and(is_set);
    let has_script = script.as_deref().is_some_and(is_set);
    has_path != has_script
}

//=============================================================================
// OBSERVATIONS
//=============================================================================

/// A state check against a named entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observation {
    /// Target system identifier
    #[serde(default)]
    pub entity: String,
    /// What to check on the entity
    #[serde(default)]
    pub query: String,
    /// Identifier substituted for the `instance` argument placeholder
    #[serde(default)]
    pub instance: String,
    /// Result value that represents a healthy state
    #[serde(default)]
    pub expect: String,
}

impl Entity for Observation {
    fn is_empty(&self) -> bool {
        !(is_set(&self.entity) && is_set(&self.query) && is_set(&self.instance))
    }

    fn hash_keys(&self) -> BTreeSet<String> {
        BTreeSet::from([conflict_key(&[&self.entity, &self.query, &self.instance])])
    }
}

/// Outcome of running an observation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationResult {
    /// Observed state, as printed by the observing implement
    pub result: String,
    /// Whether the result matched the observation's expectation
    pub expected: bool,
    /// Anything the implement wrote to stderr
    #[serde(default)]
    pub logs: String,
}

impl ObservationResult {
    pub fn new(observation: &Observation, result: impl Into<String>, logs: impl Into<String>) -> Self {
        let result = result.into();
        Self {
            expected: result == observation.expect,
            result,
            logs: logs.into(),
        }
    }
}

//=============================================================================
// REACTIONS
//=============================================================================

/// Field of an observation result a reaction condition looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionCheck {
    /// The observed result string
    Result,
    /// The expected flag, as "true" or "false"
    Expected,
}

/// Under which observed value a reaction fires
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default)]
    pub check: Option<ConditionCheck>,
    #[serde(default)]
    pub value: String,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.check.is_none() || !is_set(&self.value)
    }

    pub fn matches(&self, result: &ObservationResult) -> bool {
        match self.check {
            Some(ConditionCheck::Result) => result.result == self.value,
            Some(ConditionCheck::Expected) => result.expected.to_string() == self.value,
            None => false,
        }
    }
}

/// Rule mapping an observation's result to a corrective action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reaction {
    /// Name of the observation this reaction watches
    #[serde(default)]
    pub observation: String,
    /// Name of the action (or implement) to run
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub condition: Condition,
}

impl Reaction {
    /// Whether this reaction should run its action for the given result
    pub fn fires(&self, result: &ObservationResult) -> bool {
        self.condition.matches(result)
    }
}

impl Entity for Reaction {
    fn is_empty(&self) -> bool {
        !is_set(&self.observation) || !is_set(&self.action) || self.condition.is_empty()
    }

    fn hash_keys(&self) -> BTreeSet<String> {
        BTreeSet::from([conflict_key(&[&self.observation])])
    }
}

//=============================================================================
// ACTIONS
//=============================================================================

/// A command to run: an executable fed a script file or an inline script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    #[serde(default)]
    pub exe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Argument template; `instance` is replaced at resolution time
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
}

impl Action {
    /// Same command with a different argument list
    pub fn with_args(&self, args: Vec<String>) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }

    /// Human readable command line, used in logs and errors
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.exe.clone()];
        if let Some(path) = self.path.as_deref().filter(|p| is_set(p)) {
            parts.push(path.to_string());
        } else if self.script.as_deref().is_some_and(is_set) {
            parts.push("<script>".to_string());
        }
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn source(&self) -> &str {
        self.path
            .as_deref()
            .filter(|p| is_set(p))
            .or(self.script.as_deref())
            .unwrap_or("")
    }
}

impl Entity for Action {
    fn is_empty(&self) -> bool {
        !is_set(&self.exe) || !one_source(&self.path, &self.script)
    }

    fn hash_keys(&self) -> BTreeSet<String> {
        let mut fields = vec![self.exe.as_str(), self.source()];
        fields.extend(self.args.iter().map(String::as_str));
        BTreeSet::from([conflict_key(&fields)])
    }
}

//=============================================================================
// IMPLEMENTS
//=============================================================================

/// Observe capability of an implement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observes {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub query: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
}

impl Observes {
    pub fn is_empty(&self) -> bool {
        !is_set(&self.entity) || !is_set(&self.query)
    }
}

/// State transition an implement's reaction moves an observation through
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Corrects {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub query: String,
    /// Result the observation should report after the reaction ran
    #[serde(default)]
    pub results_in: String,
    /// Observed results this reaction is a valid correction from
    #[serde(default, deserialize_with = "null_as_default")]
    pub starts_from: Vec<String>,
}

impl Corrects {
    pub fn is_empty(&self) -> bool {
        !is_set(&self.entity)
            || !is_set(&self.query)
            || !is_set(&self.results_in)
            || self.starts_from.is_empty()
    }

    /// Whether this transition takes `observation` from `result` to its expected state
    pub fn covers(&self, observation: &Observation, result: &ObservationResult) -> bool {
        self.entity == observation.entity
            && self.query == observation.query
            && self.results_in == observation.expect
            && self.starts_from.iter().any(|state| *state == result.result)
    }
}

/// React capability of an implement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reacts {
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<Corrects>,
}

/// Reusable bundle of observe and react logic sharing one executable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Implement {
    #[serde(default)]
    pub exe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observes: Option<Observes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reacts: Option<Reacts>,
}

impl Implement {
    fn action_with(&self, args: &[String]) -> Action {
        Action {
            exe: self.exe.clone(),
            path: self.path.clone(),
            script: self.script.clone(),
            args: args.to_vec(),
        }
    }

    /// Command running this implement's reaction, args still templated
    pub fn react_action(&self) -> Action {
        let args = self.reacts.as_ref().map(|r| r.args.as_slice()).unwrap_or(&[]);
        self.action_with(args)
    }

    /// Command running this implement's observation, args still templated
    pub fn observe_action(&self) -> Action {
        let args = self.observes.as_ref().map(|o| o.args.as_slice()).unwrap_or(&[]);
        self.action_with(args)
    }

    pub fn corrects(&self) -> Option<&Corrects> {
        self.reacts.as_ref().and_then(|r| r.corrects.as_ref())
    }
}

impl Entity for Implement {
    fn is_empty(&self) -> bool {
        if !is_set(&self.exe) || !one_source(&self.path, &self.script) {
            return true;
        }
        if self.observes.as_ref().is_some_and(Observes::is_empty) {
            return true;
        }
        if self.corrects().is_some_and(Corrects::is_empty) {
            return true;
        }
        self.observes.is_none() && self.reacts.is_none()
    }

    fn hash_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        if let Some(observes) = &self.observes {
            keys.insert(conflict_key(&[&observes.entity, &observes.query]));
        }
        if let Some(corrects) = self.corrects() {
            for state in &corrects.starts_from {
                keys.insert(conflict_key(&[
                    &corrects.entity,
                    &corrects.query,
                    &corrects.results_in,
                    state,
                ]));
            }
        }
        keys
    }
}

//=============================================================================
// CATALOGUE
//=============================================================================

/// The merged collection of observations, reactions, actions and implements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operations {
    #[serde(default, deserialize_with = "null_as_default")]
    pub observations: BTreeMap<String, Observation>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reactions: BTreeMap<String, Reaction>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actions: BTreeMap<String, Action>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub implements: BTreeMap<String, Implement>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of named records across all four mappings
    pub fn len(&self) -> usize {
        self.observations.len() + self.reactions.len() + self.actions.len() + self.implements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
