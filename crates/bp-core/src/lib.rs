//! Gaussian-mixture approximation and pi/lambda message passing for
//! belief networks with continuous and discrete variables.
//!
//! - [`distribution`]: the message family (point masses, tables,
//!   Gaussians, mixtures, splines, products)
//! - [`approximation`]: integration with retry, EM fitting on densities,
//!   mixture cross products
//! - [`conditional`]: conditional models attached to network nodes
//! - [`messages`]: type-dispatched pi, lambda and posterior computation,
//!   plus per-node message caching

pub mod approximation;
pub mod conditional;
pub mod distribution;
pub mod logging;
pub mod messages;
pub mod tags;

pub use approximation::{fit_mixture, FitOptions, Integrator};
pub use bp_common::{Error, Result};
pub use conditional::ConditionalModel;
pub use distribution::{Discrete, Distribution, Gaussian, MixGaussians, Mixture};
pub use messages::{BeliefNode, MessageEngine, MessageSource, Notification};
pub use tags::TypeTag;
