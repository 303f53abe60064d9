pub mod dashboard;
pub mod notice;
pub mod reconciler;

#[cfg(test)]
mod test_support;

pub use dashboard::{Dashboard, DashboardSettings, Mode, SessionSnapshot};
pub use notice::{Notice, NoticeLevel};
pub use reconciler::{RedirectReason, Reconciler, SaveError, SaveOutcome, resolve_title};
