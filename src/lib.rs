//! Risk annotation and auto-approve orchestration for GitHub pull requests.
//!
//! A [`session::Session`] owns the per-repository analysis cache, filled in
//! the background by [`scheduler::AnalysisScheduler`], and the
//! [`workflow::AutomationWorkflow`] that evaluates, confirms and executes an
//! approve+merge batch through a [`backend::AutomationService`].

pub mod automation;
pub mod backend;
pub mod config;
pub mod pr;
pub mod report;
pub mod risk;
pub mod scheduler;
pub mod session;
pub mod workflow;
