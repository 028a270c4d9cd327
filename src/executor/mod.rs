//! The Executor (worker): announces itself to the Gateway, consumes its queue, and dispatches
//! each delivery to the model it serves. Grounded in the teacher's `job_worker` thread-pool shape
//! (a dedicated OS thread per unit of work, results marshalled back over a channel), adapted from
//! a pull-based job poll to a push-based broker consumer.

pub mod dispatch;
pub mod worker;
