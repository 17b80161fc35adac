//! Pi message from a variable to one of its children.

use bp_common::Result;

use super::dispatch::{HelperTable, PatternElement};
use super::{MessageEngine, PiMessageHelper};
use crate::distribution::Distribution;
use crate::tags::TypeTag;

pub(crate) fn register(table: &mut HelperTable<PiMessageHelper>) {
    table.register(
        "uninformed",
        vec![
            PatternElement::one(TypeTag::AnyDistribution),
            PatternElement::any_number(TypeTag::Noninformative),
        ],
        uninformed,
    );
    table.register(
        "abstract",
        vec![
            PatternElement::one(TypeTag::AnyDistribution),
            PatternElement::any_number(TypeTag::AnyDistribution),
        ],
        combined,
    );
}

/// No other child says anything: the message is the prior itself.
fn uninformed(
    _: &MessageEngine,
    pi: &Distribution,
    others: &[Distribution],
) -> Result<Option<Distribution>> {
    if others.iter().all(Distribution::is_noninformative) {
        Ok(Some(pi.clone()))
    } else {
        Ok(None)
    }
}

fn combined(
    engine: &MessageEngine,
    pi: &Distribution,
    others: &[Distribution],
) -> Result<Option<Distribution>> {
    let lambda = engine.compute_lambda(others)?;
    engine.compute_posterior(pi, &lambda).map(Some)
}
