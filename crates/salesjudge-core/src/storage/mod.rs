pub mod results;
pub mod schema;
pub mod store;

pub use results::{BadCase, HeatCell, PhaseStats, RuleCounts};
pub use store::Store;

pub(crate) fn now_utc() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
