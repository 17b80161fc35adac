//! Helper selection by argument type signature.
//!
//! A helper is registered against a pattern: a sequence of tags, each
//! repeated a fixed number of times or zero-or-more times. A signature
//! matches when every argument is a descendant of the tag that consumes
//! it. Among matching helpers the most specific wins; a helper that
//! declines (returns `Ok(None)`) passes the call to the next candidate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use bp_common::{Error, Result};
use tracing::debug;

use crate::logging::event_names;
use crate::tags::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperKind {
    Lambda,
    Pi,
    Posterior,
    PiMessage,
    LambdaMessage,
}

impl HelperKind {
    pub fn name(self) -> &'static str {
        match self {
            HelperKind::Lambda => "lambda",
            HelperKind::Pi => "pi",
            HelperKind::Posterior => "posterior",
            HelperKind::PiMessage => "pi-message",
            HelperKind::LambdaMessage => "lambda-message",
        }
    }
}

impl fmt::Display for HelperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Exactly(usize),
    ZeroOrMore,
}

impl Repeat {
    /// Reads the numeric convention where `-1` stands for zero or more.
    pub fn from_count(count: i64) -> Result<Repeat> {
        match count {
            -1 => Ok(Repeat::ZeroOrMore),
            n if n >= 0 => Ok(Repeat::Exactly(n as usize)),
            n => Err(Error::invalid(format!("repeat count {n} is not -1 or nonnegative"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternElement {
    pub tag: TypeTag,
    pub repeat: Repeat,
}

impl PatternElement {
    pub fn one(tag: TypeTag) -> Self {
        PatternElement {
            tag,
            repeat: Repeat::Exactly(1),
        }
    }

    pub fn exactly(tag: TypeTag, count: usize) -> Self {
        PatternElement {
            tag,
            repeat: Repeat::Exactly(count),
        }
    }

    pub fn any_number(tag: TypeTag) -> Self {
        PatternElement {
            tag,
            repeat: Repeat::ZeroOrMore,
        }
    }
}

/// How tightly a pattern fits a signature. Compared field by field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    /// Sum of the hierarchy depths of the tags that consumed arguments.
    pub class_score: u32,
    /// Arguments consumed by fixed-count elements.
    pub count_score: u32,
}

impl Specificity {
    fn plus(self, other: Specificity) -> Specificity {
        Specificity {
            class_score: self.class_score + other.class_score,
            count_score: self.count_score + other.count_score,
        }
    }
}

/// Best specificity over every way `pattern` can consume `signature`.
pub fn match_pattern(pattern: &[PatternElement], signature: &[TypeTag]) -> Option<Specificity> {
    score(pattern, signature, signature)
}

/// Matches against `signature` while crediting each argument no deeper
/// than the corresponding tag of `reference`, so a promoted argument
/// scores as its original tag.
fn score(
    pattern: &[PatternElement],
    signature: &[TypeTag],
    reference: &[TypeTag],
) -> Option<Specificity> {
    let Some((element, rest)) = pattern.split_first() else {
        return signature.is_empty().then(Specificity::default);
    };
    let depth = element.tag.depth();
    let credit = |args: &[TypeTag]| -> u32 { args.iter().map(|t| depth.min(t.depth())).sum() };
    match element.repeat {
        Repeat::Exactly(n) => {
            if signature.len() < n || !signature[..n].iter().all(|t| t.is_a(element.tag)) {
                return None;
            }
            let here = Specificity {
                class_score: credit(&reference[..n]),
                count_score: n as u32,
            };
            score(rest, &signature[n..], &reference[n..]).map(|tail| here.plus(tail))
        }
        Repeat::ZeroOrMore => {
            let available = signature
                .iter()
                .take_while(|t| t.is_a(element.tag))
                .count();
            (0..=available)
                .filter_map(|k| {
                    let here = Specificity {
                        class_score: credit(&reference[..k]),
                        count_score: 0,
                    };
                    score(rest, &signature[k..], &reference[k..]).map(|tail| here.plus(tail))
                })
                .max()
        }
    }
}

/// Plain Gaussians retried as single-component mixtures.
fn promote(signature: &[TypeTag]) -> Option<Vec<TypeTag>> {
    signature.contains(&TypeTag::Gaussian).then(|| {
        signature
            .iter()
            .map(|&t| {
                if t == TypeTag::Gaussian {
                    TypeTag::MixGaussians
                } else {
                    t
                }
            })
            .collect()
    })
}

pub(crate) fn describe(signature: &[TypeTag]) -> String {
    signature
        .iter()
        .map(|t| t.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct HelperEntry<H> {
    pub name: &'static str,
    pub pattern: Vec<PatternElement>,
    pub helper: H,
}

/// Registered helpers of one kind, with a per-signature ranking cache.
#[derive(Debug)]
pub struct HelperTable<H> {
    kind: HelperKind,
    entries: Vec<HelperEntry<H>>,
    ranked: Mutex<HashMap<Vec<TypeTag>, Vec<usize>>>,
}

impl<H> HelperTable<H> {
    pub fn new(kind: HelperKind) -> Self {
        HelperTable {
            kind,
            entries: Vec::new(),
            ranked: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> HelperKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HelperEntry<H>] {
        &self.entries
    }

    /// Adds a helper. Later registrations lose ties to earlier ones.
    pub fn register(&mut self, name: &'static str, pattern: Vec<PatternElement>, helper: H) {
        self.entries.push(HelperEntry {
            name,
            pattern,
            helper,
        });
        if let Ok(mut ranked) = self.ranked.lock() {
            ranked.clear();
        }
    }

    /// Indices of every applicable helper, most specific first.
    ///
    /// Gaussians may also match as single-component mixtures. A direct
    /// match outranks a promoted one of equal specificity; remaining ties
    /// go to registration order.
    pub fn candidates(&self, signature: &[TypeTag]) -> Vec<usize> {
        if let Ok(ranked) = self.ranked.lock() {
            if let Some(hit) = ranked.get(signature) {
                return hit.clone();
            }
        }
        let order = self.rank(signature);
        if let Ok(mut ranked) = self.ranked.lock() {
            ranked.insert(signature.to_vec(), order.clone());
        }
        order
    }

    fn rank(&self, signature: &[TypeTag]) -> Vec<usize> {
        let promoted = promote(signature);
        let mut scored: Vec<(Specificity, bool, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let direct = match_pattern(&entry.pattern, signature).map(|s| (s, true));
                let via_promotion = promoted
                    .as_deref()
                    .and_then(|p| score(&entry.pattern, p, signature))
                    .map(|s| (s, false));
                let best = match (direct, via_promotion) {
                    (Some(d), Some(p)) if p.0 > d.0 => p,
                    (Some(d), _) => d,
                    (None, p) => p?,
                };
                Some((best.0, best.1, i))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        scored.into_iter().map(|(_, _, i)| i).collect()
    }

    /// Calls candidates in order until one produces a value.
    ///
    /// Fails with [`Error::UnsupportedCombination`] when no helper matches
    /// or every match declines.
    pub fn dispatch<T, F>(&self, signature: &[TypeTag], mut call: F) -> Result<T>
    where
        F: FnMut(&H) -> Result<Option<T>>,
    {
        for index in self.candidates(signature) {
            let entry = &self.entries[index];
            match call(&entry.helper)? {
                Some(value) => {
                    debug!(
                        event = event_names::HELPER_SELECTED,
                        kind = %self.kind,
                        helper = entry.name,
                        signature = %describe(signature),
                        "helper applied"
                    );
                    return Ok(value);
                }
                None => debug!(
                    event = event_names::HELPER_DECLINED,
                    kind = %self.kind,
                    helper = entry.name,
                    "helper declined; trying next candidate"
                ),
            }
        }
        debug!(
            event = event_names::HELPER_MISSING,
            kind = %self.kind,
            signature = %describe(signature),
            "no helper applies"
        );
        Err(Error::UnsupportedCombination {
            kind: self.kind.to_string(),
            signature: describe(signature),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TypeTag::*;

    fn table() -> HelperTable<&'static str> {
        let mut t = HelperTable::new(HelperKind::Posterior);
        t.register(
            "abstract",
            vec![PatternElement::one(AnyDistribution), PatternElement::one(AnyDistribution)],
            "abstract",
        );
        t.register(
            "gaussian",
            vec![PatternElement::one(Gaussian), PatternElement::one(Gaussian)],
            "gaussian",
        );
        t.register(
            "mixtures",
            vec![PatternElement::one(MixGaussians), PatternElement::one(MixGaussians)],
            "mixtures",
        );
        t
    }

    #[test]
    fn repeat_counts() {
        assert_eq!(Repeat::from_count(-1).unwrap(), Repeat::ZeroOrMore);
        assert_eq!(Repeat::from_count(2).unwrap(), Repeat::Exactly(2));
        assert!(Repeat::from_count(-2).is_err());
    }

    #[test]
    fn zero_or_more_matches_empty_and_long_signatures() {
        let pattern = [PatternElement::any_number(Gaussian)];
        assert_eq!(match_pattern(&pattern, &[]), Some(Specificity::default()));
        let s = match_pattern(&pattern, &[Gaussian, Delta, Gaussian]).unwrap();
        assert_eq!(s.class_score, 3);
        assert_eq!(s.count_score, 0);
        assert_eq!(match_pattern(&pattern, &[Gaussian, Discrete]), None);
    }

    #[test]
    fn fixed_count_must_be_exact() {
        let pattern = [PatternElement::one(Sum), PatternElement::exactly(Gaussian, 2)];
        assert!(match_pattern(&pattern, &[Sum, Gaussian, Gaussian]).is_some());
        assert!(match_pattern(&pattern, &[Sum, Gaussian]).is_none());
        assert!(match_pattern(&pattern, &[Sum, Gaussian, Gaussian, Gaussian]).is_none());
    }

    #[test]
    fn backtracking_splits_a_run() {
        let pattern = [
            PatternElement::any_number(AnyDistribution),
            PatternElement::one(Discrete),
        ];
        let s = match_pattern(&pattern, &[Discrete, Discrete, Discrete]).unwrap();
        assert_eq!(s.count_score, 1);
        assert_eq!(s.class_score, 1);
    }

    #[test]
    fn most_specific_helper_first() {
        let t = table();
        let order = t.candidates(&[Gaussian, Gaussian]);
        assert_eq!(t.entries()[order[0]].name, "gaussian");
        assert_eq!(t.entries()[*order.last().unwrap()].name, "abstract");
    }

    #[test]
    fn promotion_reaches_mixture_helpers() {
        let t = table();
        let order = t.candidates(&[Gaussian, MixGaussians]);
        assert_eq!(t.entries()[order[0]].name, "mixtures");
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn direct_match_wins_a_tie_with_promotion() {
        let t = table();
        let order = t.candidates(&[Gaussian, Gaussian]);
        let names: Vec<_> = order.iter().map(|&i| t.entries()[i].name).collect();
        assert_eq!(names, vec!["gaussian", "mixtures", "abstract"]);
    }

    #[test]
    fn ranking_is_cached_per_signature() {
        let t = table();
        let first = t.candidates(&[MixGaussians, Gaussian]);
        assert_eq!(t.candidates(&[MixGaussians, Gaussian]), first);
    }

    #[test]
    fn declining_falls_through() {
        let t = table();
        let mut seen = Vec::new();
        let out = t
            .dispatch(&[Gaussian, Gaussian], |h| {
                seen.push(*h);
                Ok((*h == "abstract").then_some(7))
            })
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(seen.last(), Some(&"abstract"));
    }

    #[test]
    fn missing_helper_is_unsupported() {
        let mut t: HelperTable<()> = HelperTable::new(HelperKind::Lambda);
        t.register("gaussians", vec![PatternElement::any_number(Gaussian)], ());
        let err = t
            .dispatch(&[Discrete], |_| Ok(Some(())))
            .unwrap_err();
        match err {
            Error::UnsupportedCombination { kind, signature } => {
                assert_eq!(kind, "lambda");
                assert_eq!(signature, "Discrete");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
