pub mod bessel;
pub mod fitter;
pub mod hyperbolic;

pub use fitter::*;
pub use hyperbolic::*;
