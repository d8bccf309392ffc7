//! Background Tasks Module
//!
//! Periodic maintenance tasks started by the application context.
//!
//! # Tasks
//! - Garbage collection: removes unobserved entries past their gc time

mod gc;

pub use gc::spawn_gc_task;
