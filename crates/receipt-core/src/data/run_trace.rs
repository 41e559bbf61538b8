//! Correlation ids for a pipeline run and the items resolved in it

use uuid::Uuid;

/// Ids recorded on log events so one run, or one item within it, can be filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub span_id: Uuid,
}

impl RunTrace {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
        }
    }

    /// Same run, fresh span for one item.
    pub fn item_span(&self) -> Self {
        Self {
            run_id: self.run_id,
            span_id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_spans_share_the_run() {
        let run = RunTrace::start();
        let first = run.item_span();
        let second = run.item_span();

        assert_eq!(first.run_id, run.run_id);
        assert_eq!(second.run_id, run.run_id);
        assert_ne!(first.span_id, second.span_id);
        assert_ne!(first.span_id, run.span_id);
    }
}
