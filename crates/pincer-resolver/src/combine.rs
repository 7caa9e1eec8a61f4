use std::sync::Arc;

use pincer_pep440::VersionSpecifier;

use crate::specifier::{combine, union_extras};
use crate::{IncompatibleRequirements, InstallRequirement};

/// Combine requirements on the same package into one.
///
/// The result has the AND of all specifiers and the union of all extras. It is a constraint
/// only if every input is. The direct reference and editable flag come from the first input
/// that has one. Provenance is `None` if any input was requested directly, otherwise the
/// shortest rendering among the inputs (ties broken by string order). The original
/// requirements are kept in `source_ireqs`, flattened, so combining is associative.
///
/// Two inputs that pin different versions with `==` or `===` are rejected.
pub fn combine_install_requirements(
    first: InstallRequirement,
    rest: impl IntoIterator<Item = InstallRequirement>,
) -> Result<InstallRequirement, IncompatibleRequirements> {
    let rest: Vec<InstallRequirement> = rest.into_iter().collect();
    if rest.is_empty() {
        return Ok(first);
    }

    let mut source_ireqs: Vec<Arc<InstallRequirement>> = Vec::new();
    let mut combined = InstallRequirement {
        source_ireqs: Vec::new(),
        ..first.clone()
    };
    for ireq in std::iter::once(first).chain(rest) {
        debug_assert_eq!(combined.name, ireq.name);
        if !source_ireqs.is_empty() {
            combined.specifier = combine(&combined.specifier, &ireq.specifier);
            combined.extras = union_extras(&combined, &ireq);
            combined.constraint &= ireq.constraint;
            if combined.link.is_none() && ireq.link.is_some() {
                combined.link.clone_from(&ireq.link);
                combined.editable = ireq.editable;
            }
            if combined.marker.is_none() {
                combined.marker.clone_from(&ireq.marker);
            }
        }
        if ireq.source_ireqs.is_empty() {
            source_ireqs.push(Arc::new(ireq));
        } else {
            source_ireqs.extend(ireq.source_ireqs);
        }
    }

    check_pins(&source_ireqs)?;

    combined.comes_from = if source_ireqs.iter().any(|ireq| ireq.comes_from.is_none()) {
        None
    } else {
        source_ireqs
            .iter()
            .filter_map(|ireq| ireq.comes_from.as_ref())
            .min_by_key(|comes_from| {
                let rendered = comes_from.to_string();
                (rendered.len(), rendered)
            })
            .cloned()
    };
    combined.source_ireqs = source_ireqs;

    Ok(combined)
}

/// Reject two sources that pin the same package to different versions.
fn check_pins(source_ireqs: &[Arc<InstallRequirement>]) -> Result<(), IncompatibleRequirements> {
    let pins: Vec<(&InstallRequirement, &VersionSpecifier)> = source_ireqs
        .iter()
        .flat_map(|ireq| {
            ireq.specifier
                .iter()
                .filter(|specifier| specifier.is_pin())
                .map(move |specifier| (ireq.as_ref(), specifier))
        })
        .collect();
    for (index, (first, first_pin)) in pins.iter().enumerate() {
        for (second, second_pin) in &pins[index + 1..] {
            if first_pin.version() != second_pin.version() {
                return Err(IncompatibleRequirements {
                    first: (*first).clone(),
                    second: (*second).clone(),
                });
            }
        }
    }
    Ok(())
}
