//! Live dashboard over the stored measurement history.
//!
//! Two timers drive it: a fast, server-wide one refreshing the latest readouts,
//! and a slower one per open page rebuilding the decimated chart for that
//! page's lookback. Both publish their newest view through a `watch` channel.

pub mod cycles;
pub mod decimate;
pub mod lookback;
pub mod scheduler;
pub mod server;

pub use cycles::{ChartPanel, ChartSettings, ChartView, LatestReadout};
pub use server::{DashboardService, DashboardState};
