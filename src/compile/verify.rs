//! Static checks of a pipeline document, for the problems an execution engine
//! would otherwise only report at run time:
//! - stage names are unique within their pipeline and contain no "."
//! - every reference starts with "input" or the name of a stage in the same
//!   or an enclosing pipeline
//! - top-level "input.<name>" references name a declared input
//! - map stages read "items" and carry a nested document

use super::document::{PipelineSpec, StageParams};
use super::reference::INPUT;
use super::{MAP_FUNC, MAP_ITEMS};

use anyhow::bail;
use std::collections::BTreeSet;

/// Every problem found, each prefixed with the stage path it concerns.
pub fn problems(spec: &PipelineSpec) -> Vec<String> {
    let mut out = Vec::new();
    let mut enclosing = Vec::new();
    check(spec, "", &mut enclosing, &mut out);
    out
}

pub fn verify(spec: &PipelineSpec) -> anyhow::Result<()> {
    let found = problems(spec);
    if !found.is_empty() {
        bail!(
            "pipeline document has {} problem(s):\n  {}",
            found.len(),
            found.join("\n  ")
        );
    }
    Ok(())
}

fn check(
    spec: &PipelineSpec,
    prefix: &str,
    enclosing: &mut Vec<BTreeSet<String>>,
    out: &mut Vec<String>,
) {
    let mut names = BTreeSet::new();
    for stage in &spec.stages {
        if stage.name.contains('.') {
            out.push(format!("{prefix}{}: stage name contains \".\"", stage.name));
        }
        if !names.insert(stage.name.clone()) {
            out.push(format!("{prefix}{}: duplicate stage name", stage.name));
        }
    }
    enclosing.push(names);

    for stage in &spec.stages {
        let at = format!("{prefix}{}", stage.name);
        for (port, reference) in &stage.input {
            if let Some(problem) = check_reference(spec, enclosing, reference) {
                out.push(format!("{at}: input {port} {problem}"));
            }
        }
        if stage.func != MAP_FUNC {
            continue;
        }
        if !stage.input.contains_key(MAP_ITEMS) {
            out.push(format!("{at}: map stage has no {MAP_ITEMS} input"));
        }
        match &stage.params {
            Some(StageParams::Pipeline(nested)) => {
                check(nested, &format!("{at}/"), enclosing, out);
            }
            _ => out.push(format!("{at}: map stage has no nested pipeline")),
        }
    }

    for reference in spec.output.references() {
        if let Some(problem) = check_reference(spec, enclosing, reference) {
            out.push(format!("{prefix}output: {problem}"));
        }
    }
    enclosing.pop();
}

fn check_reference(
    spec: &PipelineSpec,
    enclosing: &[BTreeSet<String>],
    reference: &str,
) -> Option<String> {
    let mut parts = reference.split('.');
    let head = parts.next().unwrap_or_default();
    if head == INPUT {
        let declared = spec.input.as_ref()?;
        let name = parts.next()?;
        return (!declared.iter().any(|d| d == name))
            .then(|| format!("refers to undeclared input {name:?}"));
    }
    if enclosing.iter().any(|names| names.contains(head)) {
        return None;
    }
    Some(format!("refers to unknown stage {head:?}"))
}
