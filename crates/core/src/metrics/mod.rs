pub mod change;
pub mod risk;
pub mod sampler;
