//! Regulator - observe, react, correct
//!
//! Owns the merged catalogue and drives one observation at a time through
//! the resolver and out to the runner:
//!
//! ```text
//!   observation ──▶ observing implement ──▶ runner ──▶ ObservationResult
//!                                                           │
//!          reaction condition / correction transition ◀─────┘
//!                              │
//!                              ▼
//!                    action ──▶ runner
//! ```

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{RegulatorError, Result};
use crate::exec::{remote_invocation, CommandOutput, RemoteTarget, Runner};
use crate::input::{read_source, SpecSource};
use crate::operation::*;

/// How resolved actions are carried out
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Run on this host over ssh instead of locally
    pub remote: Option<RemoteTarget>,
    /// Resolve reactions and corrections but don't run them
    pub dry_run: bool,
}

/// A command that was (or would have been) run
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    /// Action or implement the command came from
    pub name: String,
    pub command: String,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CommandOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionOutcome {
    pub reaction: String,
    pub observation: String,
    pub result: ObservationResult,
    pub fired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrectionStatus {
    /// Observation already reports its expected result
    AlreadyExpected,
    /// No implement covers the observed transition
    NoCorrection,
    /// An implement covered it
    Corrected { action: ActionReport },
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionOutcome {
    pub observation: String,
    pub result: ObservationResult,
    #[serde(flatten)]
    pub status: CorrectionStatus,
}

pub struct Regulator {
    operations: Operations,
    defaults: DefaultImplements,
    runner: Box<dyn Runner>,
    settings: RunSettings,
    /// Results of observations run so far, by observation name
    results: HashMap<String, ObservationResult>,
}

impl Regulator {
    pub fn new(defaults: DefaultImplements, runner: Box<dyn Runner>, settings: RunSettings) -> Self {
        let mut operations = Operations::default();
        defaults.seed(&mut operations);
        Self {
            operations,
            defaults,
            runner,
            settings,
            results: HashMap::new(),
        }
    }

    pub fn operations(&self) -> &Operations {
        &self.operations
    }

    pub fn defaults(&self) -> &DefaultImplements {
        &self.defaults
    }

    /// Merge one parsed document; the catalogue is untouched on error
    pub fn merge(&mut self, incoming: &Operations) -> Result<()> {
        self.operations.merge_atomic(incoming, &self.defaults)
    }

    /// Parse and merge each source in order
    pub fn load(&mut self, sources: &[SpecSource]) -> Result<()> {
        for source in sources {
            let raw = read_source(source)?;
            let incoming = parse_document(&raw)?;
            self.merge(&incoming).map_err(|e| match e {
                RegulatorError::InvalidInput(msg) => {
                    RegulatorError::InvalidInput(format!("{} (in {})", msg, source))
                }
                other => other,
            })?;
            info!(source = %source, "Loaded catalogue document");
        }
        Ok(())
    }

    /// Last result recorded for an observation in this run
    pub fn last_result(&self, name: &str) -> Option<&ObservationResult> {
        select_observation_result(name, &self.results)
    }

    fn observation(&self, name: &str) -> Result<Observation> {
        select_observation(name, &self.operations.observations)
            .cloned()
            .ok_or_else(|| RegulatorError::NotFound(format!("Observation '{}' does not exist", name)))
    }

    async fn execute(&self, action: &Action) -> Result<CommandOutput> {
        match &self.settings.remote {
            Some(target) => {
                let (command, stdin) = remote_invocation(action);
                self.runner.run_remote(&command, stdin.as_deref(), target).await
            }
            None => self.runner.run_local(action).await,
        }
    }

    /// Run (or, in dry run, describe) a resolved action
    async fn carry_out(&self, name: &str, action: Action) -> Result<ActionReport> {
        let command = action.command_line();
        if self.settings.dry_run {
            info!(action = name, command = %command, "Would run action (dry run)");
            return Ok(ActionReport {
                name: name.to_string(),
                command,
                executed: false,
                output: None,
            });
        }

        info!(action = name, command = %command, "Running action");
        let output = self.execute(&action).await?.into_success(&command)?;
        Ok(ActionReport {
            name: name.to_string(),
            command,
            executed: true,
            output: Some(output),
        })
    }

    /// Run an observation through the implement that observes it
    pub async fn observe(&mut self, name: &str) -> Result<ObservationResult> {
        let obsv = self.observation(name)?;
        let (impl_name, template) = select_observing_implement(&obsv, &self.operations.implements)
            .ok_or_else(|| {
                RegulatorError::NotFound(format!(
                    "No implement observes entity '{}' with query '{}'",
                    obsv.entity, obsv.query
                ))
            })?;

        let action = template.with_args(compute_args(&template.args, &obsv));
        let command = action.command_line();
        info!(observation = name, implement = %impl_name, "Running observation");
        let output = self.execute(&action).await?.into_success(&command)?;

        let result = ObservationResult::new(&obsv, output.stdout.trim(), output.stderr);
        if !result.logs.is_empty() {
            warn!(observation = name, logs = %result.logs, "Observation wrote to stderr");
        }
        info!(
            observation = name,
            result = %result.result,
            expected = result.expected,
            "Observation finished"
        );
        self.results.insert(name.to_string(), result.clone());
        Ok(result)
    }

    /// Observe the reaction's observation and run its action if the condition holds
    pub async fn react(&mut self, name: &str) -> Result<ReactionOutcome> {
        let reaction = select_reaction(name, &self.operations.reactions)
            .cloned()
            .ok_or_else(|| RegulatorError::NotFound(format!("Reaction '{}' does not exist", name)))?;
        let obsv = self.observation(&reaction.observation)?;
        let result = self.observe(&reaction.observation).await?;

        if !reaction.fires(&result) {
            info!(reaction = name, result = %result.result, "Reaction condition not met");
            return Ok(ReactionOutcome {
                reaction: name.to_string(),
                observation: reaction.observation,
                result,
                fired: false,
                action: None,
            });
        }

        let template = select_action(&reaction.action, &self.operations.actions)
            .cloned()
            .or_else(|| select_implement_action_by_name(&reaction.action, &self.operations.implements))
            .ok_or_else(|| {
                RegulatorError::NotFound(format!(
                    "Reaction '{}' refers to action '{}', which does not exist",
                    name, reaction.action
                ))
            })?;
        let action = template.with_args(compute_args(&template.args, &obsv));
        let report = self.carry_out(&reaction.action, action).await?;

        Ok(ReactionOutcome {
            reaction: name.to_string(),
            observation: reaction.observation,
            result,
            fired: true,
            action: Some(report),
        })
    }

    /// Observe and, when the result is unexpected, run the implement that
    /// corrects that transition
    pub async fn correct(&mut self, name: &str) -> Result<CorrectionOutcome> {
        let obsv = self.observation(name)?;
        let result = self.observe(name).await?;

        let status = if result.expected {
            CorrectionStatus::AlreadyExpected
        } else {
            match select_corrective_action(&obsv, &result, &self.operations.implements) {
                None => {
                    warn!(
                        observation = name,
                        result = %result.result,
                        expect = %obsv.expect,
                        "No implement corrects this state"
                    );
                    CorrectionStatus::NoCorrection
                }
                Some((impl_name, template)) => {
                    let action = template.with_args(compute_args(&template.args, &obsv));
                    CorrectionStatus::Corrected {
                        action: self.carry_out(&impl_name, action).await?,
                    }
                }
            }
        };

        Ok(CorrectionOutcome {
            observation: name.to_string(),
            result,
            status,
        })
    }

    /// Run an implement's reaction directly, filling `instance` from an
    /// observation when one is named
    pub async fn act(&mut self, implement: &str, observation: Option<&str>) -> Result<ActionReport> {
        let template = select_implement_action_by_name(implement, &self.operations.implements)
            .ok_or_else(|| RegulatorError::NotFound(format!("Implement '{}' does not exist", implement)))?;
        let action = match observation {
            Some(obsv_name) => {
                let obsv = self.observation(obsv_name)?;
                template.with_args(compute_args(&template.args, &obsv))
            }
            None => template,
        };
        self.carry_out(implement, action).await
    }
}
