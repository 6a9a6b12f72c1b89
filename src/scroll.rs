use crate::controller::OffsetProvider;

/// Scroll input gathered between two frames.
///
/// Relative scrolling accumulates; a seek replaces whatever was pending and
/// later deltas apply on top of it. Nothing pending means "stay put".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrollState {
    delta: i64,
    seek: Option<u64>,
}

impl ScrollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scroll by a signed number of bytes.
    pub fn scroll_by(&mut self, bytes: i64) {
        self.delta = self.delta.saturating_add(bytes);
    }

    /// Jump to an absolute offset.
    pub fn seek(&mut self, offset: u64) {
        self.seek = Some(offset);
        self.delta = 0;
    }

    pub fn is_idle(&self) -> bool {
        self.delta == 0 && self.seek.is_none()
    }
}

impl OffsetProvider for ScrollState {
    fn desired_offset(&mut self, resolved: u64) -> u64 {
        let base = self.seek.take().unwrap_or(resolved);
        base.saturating_add_signed(std::mem::take(&mut self.delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_keeps_resolved_offset() {
        let mut scroll = ScrollState::new();
        assert!(scroll.is_idle());
        assert_eq!(scroll.desired_offset(42), 42);
    }

    #[test]
    fn test_deltas_accumulate_and_reset() {
        let mut scroll = ScrollState::new();
        scroll.scroll_by(100);
        scroll.scroll_by(-30);
        assert_eq!(scroll.desired_offset(10), 80);
        assert!(scroll.is_idle());
        assert_eq!(scroll.desired_offset(80), 80);
    }

    #[test]
    fn test_seek_overrides_pending_delta() {
        let mut scroll = ScrollState::new();
        scroll.scroll_by(500);
        scroll.seek(1000);
        scroll.scroll_by(-8);
        assert_eq!(scroll.desired_offset(0), 992);
    }

    #[test]
    fn test_saturates_at_zero() {
        let mut scroll = ScrollState::new();
        scroll.scroll_by(-1_000);
        assert_eq!(scroll.desired_offset(16), 0);

        scroll.scroll_by(i64::MAX);
        scroll.scroll_by(i64::MAX);
        assert_eq!(scroll.desired_offset(u64::MAX - 1), u64::MAX);
    }
}
