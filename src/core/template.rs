//! Environment parameter resolution and variable substitution

use crate::core::step::StepParameter;
use crate::k8s::{EnvVar, HostAlias};
use regex::{Captures, Regex};
use std::collections::BTreeMap;

/// Resolve a step's declared parameters against live bindings
///
/// Precedence: a live binding wins over the declared default. A parameter
/// with neither is absent from the result; that is not an error by
/// itself, it only matters if a later operation needs the value.
pub fn resolve_parameters(
    declared: &[StepParameter],
    bindings: &BTreeMap<String, String>,
) -> Vec<EnvVar> {
    declared
        .iter()
        .filter_map(|param| {
            let value = bindings
                .get(&param.name)
                .cloned()
                .or_else(|| param.default.clone())?;
            Some(EnvVar {
                name: param.name.clone(),
                value,
            })
        })
        .collect()
}

/// Substitute `${VAR}` and `$VAR` references in a free-form string
///
/// Bare references match the longest valid identifier immediately
/// following the sigil. Unbound variables are left as literal text; the
/// silent pass-through is deliberate and relied on by callers that embed
/// non-variable `$` sequences. Output never re-enters substitution, so
/// applying the resolver twice is a no-op for the original binding set.
pub fn substitute(input: &str, env: &[EnvVar]) -> String {
    // Identifier greediness gives longest-match for the bare form.
    let pattern = Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("variable pattern is valid");

    pattern
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match env.iter().find(|var| var.name == name) {
                Some(var) => var.value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Resolve variable references in host-alias entries
///
/// Both the IP and every hostname may embed references; resolution uses
/// the step's live environment immediately before pod construction.
pub fn resolve_host_aliases(aliases: &[HostAlias], env: &[EnvVar]) -> Vec<HostAlias> {
    aliases
        .iter()
        .map(|alias| HostAlias {
            ip: substitute(&alias.ip, env),
            hostnames: alias
                .hostnames
                .iter()
                .map(|hostname| substitute(hostname, env))
                .collect(),
        })
        .collect()
}
