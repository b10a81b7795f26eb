//! Overload resolution.
//!
//! A `(name, arity)` key usually finds a single method. When overloads
//! collide, every candidate's parameters are scored against the incoming
//! arguments with `try_unmarshal`, the per-parameter matches combine by
//! worst-wins, and the lowest combined mismatch is invoked. Equal scores
//! fall to the more specific signature; a full tie resolves to the first
//! candidate in declaration order, keeping resolution deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use orb_common::protocol::UnmarshalError;

use crate::localarg;
use crate::reflect::{MethodDef, MethodEntry, MethodKey};
use crate::ser::{ObjectMatch, SerializerRegistry, SerializerState};

struct MethodCandidate {
    method: Arc<MethodDef>,
    matches: Vec<ObjectMatch>,
}

impl MethodCandidate {
    fn combined(&self) -> ObjectMatch {
        self.matches
            .iter()
            .copied()
            .fold(ObjectMatch::EXACT, ObjectMatch::max)
    }
}

/// Finds the method a request resolves to, or `None` for a NO_METHOD
/// failure.
pub fn resolve_method(
    registry: &SerializerRegistry,
    method_map: &HashMap<MethodKey, MethodEntry>,
    name: &str,
    args: &[JsonValue],
) -> Option<Arc<MethodDef>> {
    let key = MethodKey::new(name, args.len());
    match method_map.get(&key)? {
        MethodEntry::Single(method) => {
            debug!("found method {}({})", name, method.signature());
            Some(method.clone())
        }
        MethodEntry::Overloaded(methods) => {
            let mut best: Option<MethodCandidate> = None;
            for method in methods {
                let candidate = match try_unmarshal_args(registry, method, args) {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        debug!("xxx {} in {}({})", e, name, method.signature());
                        continue;
                    }
                };
                debug!("+++ possible match with {}({})", name, method.signature());
                best = Some(match best {
                    None => candidate,
                    Some(current) => {
                        if current.combined() > candidate.combined() {
                            candidate
                        } else if current.combined() == candidate.combined() {
                            better_signature(current, candidate)
                        } else {
                            current
                        }
                    }
                });
            }
            let resolved = best.map(|candidate| candidate.method);
            if let Some(method) = &resolved {
                debug!("found method {}({})", name, method.signature());
            }
            resolved
        }
    }
}

/// Scores one candidate. Context-resolved parameters match exactly and
/// consume no wire slot.
fn try_unmarshal_args(
    registry: &SerializerRegistry,
    method: &Arc<MethodDef>,
    args: &[JsonValue],
) -> Result<MethodCandidate, UnmarshalError> {
    let mut matches = Vec::with_capacity(method.params().len());
    let mut wire_index = 0;
    for (i, param) in method.params().iter().enumerate() {
        if localarg::is_local_arg(param) {
            matches.push(ObjectMatch::EXACT);
        } else {
            let mut state = SerializerState::new();
            let score = registry
                .try_unmarshal(&mut state, param, &args[wire_index])
                .map_err(|e| UnmarshalError::arg(i + 1, e))?;
            matches.push(score);
            wire_index += 1;
        }
    }
    Ok(MethodCandidate {
        method: method.clone(),
        matches,
    })
}

/// Parameter-wise specificity tie-break: count how many of the other
/// candidate's parameter types are assignable from this one's (this one
/// is narrower there); strictly more narrower positions wins, otherwise
/// the incumbent stands.
fn better_signature(current: MethodCandidate, challenger: MethodCandidate) -> MethodCandidate {
    let mut current_narrower = 0;
    let mut challenger_narrower = 0;
    for (a, b) in current
        .method
        .params()
        .iter()
        .zip(challenger.method.params().iter())
    {
        if a != b {
            if a.is_assignable_from(b) {
                challenger_narrower += 1;
            } else {
                current_narrower += 1;
            }
        }
    }
    if challenger_narrower > current_narrower {
        challenger
    } else {
        current
    }
}
