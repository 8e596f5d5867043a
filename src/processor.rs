//! Tailing pipeline: cursor bookkeeping, two-round batch fetching, the
//! bounded transaction pool, and the poll loop that drives them.

pub(crate) mod backoff;
pub mod batch;
pub mod cursor;
pub mod tailer;
pub mod worker_pool;

#[cfg(test)]
pub(crate) mod test_support;
