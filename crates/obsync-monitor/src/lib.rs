//! obsync-monitor - Change detection for the controlled device.
//!
//! The monitor keeps a cache of the last observed value per facet and emits a
//! [`ChangeEvent`] whenever a freshly observed value differs from it. Values
//! arrive two ways:
//!
//! - the poll loop fetches every registered facet on a fixed interval
//! - the push listener maps native change notifications to facets
//!
//! While the push listener is live, push-bound facets are skipped by the poll
//! loop. When the push stream closes, polling takes over again.
//!
//! # Usage
//!
//! ```ignore
//! use obsync_monitor::{obs_facets, obs_push_bindings, StateMonitor};
//!
//! let monitor = StateMonitor::builder()
//!     .facets(obs_facets(control.clone()))
//!     .push_source(control.clone(), obs_push_bindings())
//!     .build();
//! monitor.on_change(|event| tracing::info!(facet = %event.facet, "changed"));
//! monitor.start(Duration::from_millis(1500));
//! ```

pub mod cache;
pub mod config;
pub mod facet;
pub mod monitor;
pub mod push;

pub use cache::StateCache;
pub use config::MonitorConfig;
pub use facet::{obs_facet, obs_facets, required_requests, Facet, FetchFn};
pub use monitor::{
    ChangeEvent, ChangeHandler, ChangeSource, CycleReport, StateMonitor, StateMonitorBuilder,
};
pub use push::{obs_push_bindings, PushAction, PushBinding};
