pub mod flow;
pub mod macro_risk;
pub mod premium;
pub mod quotes;

pub(crate) mod yahoo;
