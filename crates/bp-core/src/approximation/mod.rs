//! Numerical approximation: integration with retry, mixture fitting, and
//! mixture products.

pub mod fit;
pub mod integrate;
pub mod mixture_product;

pub use fit::{
    cross_entropy, entropy, fit_mixture, fit_mixture_with_report, FitIteration, FitOptions,
    FitReport,
};
pub use integrate::Integrator;
pub use mixture_product::{
    combine_components, cross_product, gaussian_mixture_product, CrossProduct, ProductTerm,
};
