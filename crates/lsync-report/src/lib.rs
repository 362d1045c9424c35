//! Reporting for lsync.
//!
//! Turns plans, execution reports and stored sync records into short
//! human-readable text or serializable [`Summary`] values:
//!
//! ```rust,ignore
//! use lsync_report::{Summarize, render_plan};
//!
//! let plan = lsync_plan::plan(&source, &destination, &config);
//! print!("{}", render_plan(&plan));
//! print!("{}", plan.summarize());
//! ```

mod summary;

pub use summary::{Summarize, Summary, SummaryKind, format_size, render_plan, render_record};
