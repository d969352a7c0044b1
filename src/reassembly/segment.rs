use std::sync::Arc;

use crate::error::{StubError, StubResult};

/// Position of one segment inside a concatenated message.
///
/// `index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentInfo {
    /// Reference number shared by every segment of the message.
    pub reference: u32,
    /// Declared number of segments.
    pub total: u32,
    /// Position of this segment (`1..=total`).
    pub index: u32,
}

impl SegmentInfo {
    pub fn new(reference: u32, total: u32, index: u32) -> Self {
        Self {
            reference,
            total,
            index,
        }
    }

    /// Info for a message that fits in a single segment.
    pub fn single() -> Self {
        Self::new(0, 1, 1)
    }

    /// Returns `true` when the message needs no reassembly.
    #[inline]
    pub fn is_single(&self) -> bool {
        self.total == 1
    }

    /// Rejects segment info no complete message can be built from.
    ///
    /// ### Errors
    /// [`StubError::InvalidParam`] when `total` or `index` is zero, or `index > total`.
    pub fn validate(&self) -> StubResult<()> {
        if self.total == 0 {
            return Err(StubError::invalid("segment total is zero"));
        }
        if self.index == 0 || self.index > self.total {
            return Err(StubError::invalid(format!(
                "segment index {} outside 1..={}",
                self.index, self.total
            )));
        }
        Ok(())
    }
}

/// Identity of one message under reassembly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub sender: Arc<str>,
    pub reference: u32,
}

impl MessageKey {
    pub fn new(sender: impl Into<Arc<str>>, reference: u32) -> Self {
        Self {
            sender: sender.into(),
            reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_bounds() {
        assert!(SegmentInfo::new(7, 3, 1).validate().is_ok());
        assert!(SegmentInfo::new(7, 3, 3).validate().is_ok());
        assert!(SegmentInfo::single().validate().is_ok());

        assert!(SegmentInfo::new(7, 0, 0).validate().is_err());
        assert!(SegmentInfo::new(7, 3, 0).validate().is_err());
        assert!(SegmentInfo::new(7, 3, 4).validate().is_err());
        let err = SegmentInfo::new(7, 1, 2).validate().unwrap_err();
        assert_eq!(err.as_label(), "invalid_param");
    }
}
