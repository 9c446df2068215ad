/// Read-only views over the active dataset.
///
/// Each module is a pure function of a `Dataset` plus its request; none of
/// them touches the store or calls another.

pub mod chart;
pub mod profile;
pub mod regression;
