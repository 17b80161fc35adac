//! Runtime type tags for helper dispatch.
//!
//! Each distribution and conditional-model variant carries a tag. Tags form
//! a small hierarchy rooted at [`TypeTag::AnyDistribution`] and
//! [`TypeTag::AnyConditional`]; a helper registered for an ancestor accepts
//! every descendant, and deeper tags score as more specific.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    AnyDistribution,
    Gaussian,
    /// Point mass; behaves as a zero-width Gaussian in closed forms.
    Delta,
    Mixture,
    MixGaussians,
    Discrete,
    SplineDensity,
    Noninformative,
    Product,

    AnyConditional,
    /// Root variable whose model is an unconditional prior.
    Marginal,
    ConditionalGaussian,
    ConditionalDiscrete,
    Sum,
    LinearCombination,
    RegressionDensity,
}

impl TypeTag {
    pub fn parent(self) -> Option<TypeTag> {
        use TypeTag::*;
        match self {
            AnyDistribution | AnyConditional => None,
            Delta => Some(Gaussian),
            MixGaussians => Some(Mixture),
            Gaussian | Mixture | Discrete | SplineDensity | Noninformative | Product => {
                Some(AnyDistribution)
            }
            Marginal | ConditionalGaussian | ConditionalDiscrete | Sum | LinearCombination
            | RegressionDensity => Some(AnyConditional),
        }
    }

    /// Distance from the hierarchy root.
    pub fn depth(self) -> u32 {
        let mut depth = 0;
        let mut tag = self;
        while let Some(parent) = tag.parent() {
            depth += 1;
            tag = parent;
        }
        depth
    }

    /// True when `self` is `ancestor` or descends from it.
    pub fn is_a(self, ancestor: TypeTag) -> bool {
        let mut tag = Some(self);
        while let Some(t) = tag {
            if t == ancestor {
                return true;
            }
            tag = t.parent();
        }
        false
    }

    pub fn name(self) -> &'static str {
        use TypeTag::*;
        match self {
            AnyDistribution => "AbstractDistribution",
            Gaussian => "Gaussian",
            Delta => "Delta",
            Mixture => "Mixture",
            MixGaussians => "MixGaussians",
            Discrete => "Discrete",
            SplineDensity => "SplineDensity",
            Noninformative => "Noninformative",
            Product => "DistributionProduct",
            AnyConditional => "AbstractConditionalDistribution",
            Marginal => "Marginal",
            ConditionalGaussian => "ConditionalGaussian",
            ConditionalDiscrete => "ConditionalDiscrete",
            Sum => "Sum",
            LinearCombination => "LinearCombination",
            RegressionDensity => "RegressionDensity",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depths() {
        assert_eq!(TypeTag::AnyDistribution.depth(), 0);
        assert_eq!(TypeTag::Gaussian.depth(), 1);
        assert_eq!(TypeTag::Delta.depth(), 2);
        assert_eq!(TypeTag::MixGaussians.depth(), 2);
        assert_eq!(TypeTag::Sum.depth(), 1);
    }

    #[test]
    fn ancestry() {
        assert!(TypeTag::Delta.is_a(TypeTag::Gaussian));
        assert!(TypeTag::Delta.is_a(TypeTag::AnyDistribution));
        assert!(TypeTag::MixGaussians.is_a(TypeTag::Mixture));
        assert!(!TypeTag::Mixture.is_a(TypeTag::MixGaussians));
        assert!(!TypeTag::Gaussian.is_a(TypeTag::AnyConditional));
        assert!(TypeTag::Sum.is_a(TypeTag::AnyConditional));
    }
}
