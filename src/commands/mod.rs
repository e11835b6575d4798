pub mod aei;
pub mod aggregate;
pub mod collate;
pub mod common;
pub mod correct;
pub mod covariates;
pub mod discover;
pub mod normalize;
pub mod quantify;
pub mod select;

pub use aei::{run_aei, AeiArgs};
pub use aggregate::{run_aggregate, AggregateArgs};
pub use collate::{run_collate, CollateArgs};
pub use correct::{run_correct, CorrectArgs};
pub use covariates::{run_covariates, CovariatesArgs};
pub use discover::{run_discover, DiscoverArgs};
pub use normalize::{run_normalize, NormalizeArgs};
pub use quantify::{run_quantify, QuantifyArgs};
pub use select::{run_select, SelectArgs};
