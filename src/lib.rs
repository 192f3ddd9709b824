pub mod dataset;
pub mod evaluate;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod taxonomy;
pub mod util;
