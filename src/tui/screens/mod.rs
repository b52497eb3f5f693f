//! Screen rendering modules

pub mod forms;
pub mod jobs;
pub mod queues;

pub(crate) use forms::{render_job_form, render_queue_form};
pub(crate) use jobs::{render_detail, render_jobs};
pub(crate) use queues::{render_queues, render_workers};
