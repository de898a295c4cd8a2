//! Size-based sync/async dispatch policy (spec.md §4.5): bodies at or under
//! the configured threshold are processed inline and returned in the same
//! response; larger bodies are registered as a job and processed on a
//! spawned task, returning the job ID for polling via `/status/{job_id}`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Sync,
    Async,
}

pub fn article_dispatch_mode(body_len: usize, sync_max_bytes: usize) -> DispatchMode {
    if body_len <= sync_max_bytes {
        DispatchMode::Sync
    } else {
        DispatchMode::Async
    }
}

pub fn fragment_dispatch_mode(body_len: usize, sync_max_bytes: usize) -> DispatchMode {
    if body_len <= sync_max_bytes {
        DispatchMode::Sync
    } else {
        DispatchMode::Async
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_at_threshold_is_sync() {
        assert_eq!(article_dispatch_mode(100, 100), DispatchMode::Sync);
    }

    #[test]
    fn one_byte_over_threshold_is_async() {
        assert_eq!(article_dispatch_mode(101, 100), DispatchMode::Async);
    }
}
