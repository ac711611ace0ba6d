//! Retry policies for transient backend failures.

pub mod retry;
