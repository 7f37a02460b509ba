pub mod cop;
pub mod dispatch;
pub mod economics;
pub mod heat_curve;
pub mod heat_generators;
pub mod material_properties;
pub mod network;
pub mod optimizer;
pub(crate) mod solvers;
pub mod storage;
pub mod units;
