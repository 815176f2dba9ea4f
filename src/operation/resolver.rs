//! Action resolver
//!
//! Picks the command to run for an implement name or for an observed state
//! transition. Every lookup is total: "nothing matches" is `None`, never an
//! error.

use std::collections::{BTreeMap, HashMap};

use super::models::{Action, Implement, Observation, ObservationResult, Reaction, INSTANCE_PLACEHOLDER};

/// Replace every `instance` placeholder with the observation's instance.
///
/// Other tokens pass through unchanged. An instance that is itself the string
/// `instance` is indistinguishable from the placeholder on a second pass.
pub fn compute_args(arg_template: &[String], obsv: &Observation) -> Vec<String> {
    arg_template
        .iter()
        .map(|arg| {
            if arg == INSTANCE_PLACEHOLDER {
                obsv.instance.clone()
            } else {
                arg.clone()
            }
        })
        .collect()
}

pub fn select_action<'a>(name: &str, actions: &'a BTreeMap<String, Action>) -> Option<&'a Action> {
    actions.get(name)
}

pub fn select_observation<'a>(
    name: &str,
    observations: &'a BTreeMap<String, Observation>,
) -> Option<&'a Observation> {
    observations.get(name)
}

pub fn select_reaction<'a>(
    name: &str,
    reactions: &'a BTreeMap<String, Reaction>,
) -> Option<&'a Reaction> {
    reactions.get(name)
}

pub fn select_observation_result<'a>(
    name: &str,
    results: &'a HashMap<String, ObservationResult>,
) -> Option<&'a ObservationResult> {
    results.get(name)
}

/// The react command of the implement called `name`; args stay templated
pub fn select_implement_action_by_name(
    name: &str,
    implements: &BTreeMap<String, Implement>,
) -> Option<Action> {
    implements.get(name).map(Implement::react_action)
}

/// The implement whose correction moves `obsv` from `obsv_result` to its
/// expected state, with its react command.
pub fn select_corrective_action(
    obsv: &Observation,
    obsv_result: &ObservationResult,
    implements: &BTreeMap<String, Implement>,
) -> Option<(String, Action)> {
    implements.iter().find_map(|(name, implement)| {
        implement
            .corrects()
            .filter(|corrects| corrects.covers(obsv, obsv_result))
            .map(|_| (name.clone(), implement.react_action()))
    })
}

/// The implement able to run `obsv`, with its observe command
pub fn select_observing_implement(
    obsv: &Observation,
    implements: &BTreeMap<String, Implement>,
) -> Option<(String, Action)> {
    implements.iter().find_map(|(name, implement)| {
        implement
            .observes
            .as_ref()
            .filter(|observes| observes.entity == obsv.entity && observes.query == obsv.query)
            .map(|_| (name.clone(), implement.observe_action()))
    })
}
