//! Exception handler regions of editable CIL method bodies.
//!
//! Regions reference their boundaries by instruction identity rather than byte offset, so
//! inserting code inside or around a protected block never invalidates them. An `end`
//! boundary is exclusive: it names the first instruction *after* the block, and `None` means
//! the block runs to the end of the method.

use bitflags::bitflags;

use crate::assembly::InstrId;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// `catch_type` names the exception type this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter code starting at `filter_start` decides whether the handler runs.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Which boundary of a region an instruction anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionBoundary {
    /// First instruction of the try block
    TryStart,
    /// First instruction after the try block
    TryEnd,
    /// First instruction of the handler
    HandlerStart,
    /// First instruction after the handler
    HandlerEnd,
    /// First instruction of the filter
    FilterStart,
}

/// Exception handler defining try/catch/finally blocks within a method.
///
/// # Layout
///
/// ```text
/// try {            // [try_start, try_end)
/// }
/// catch (T) {      // [handler_start, handler_end)
/// }
/// ```
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction.
    pub try_start: InstrId,
    /// First instruction after the protected block.
    pub try_end: Option<InstrId>,
    /// First handler instruction.
    pub handler_start: InstrId,
    /// First instruction after the handler.
    pub handler_end: Option<InstrId>,
    /// If flags == FILTER, the first filter instruction.
    pub filter_start: Option<InstrId>,
    /// If flags == EXCEPTION, the full name of the caught type.
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    /// Lists the boundaries of this region that are anchored at `id`.
    #[must_use]
    pub fn boundaries_at(&self, id: InstrId) -> Vec<RegionBoundary> {
        let mut found = Vec::new();
        if self.try_start == id {
            found.push(RegionBoundary::TryStart);
        }
        if self.try_end == Some(id) {
            found.push(RegionBoundary::TryEnd);
        }
        if self.handler_start == id {
            found.push(RegionBoundary::HandlerStart);
        }
        if self.handler_end == Some(id) {
            found.push(RegionBoundary::HandlerEnd);
        }
        if self.filter_start == Some(id) {
            found.push(RegionBoundary::FilterStart);
        }
        found
    }

    /// Moves every boundary anchored at `from` onto `to`.
    ///
    /// Start boundaries must always name an instruction; passing `None` for `to` only moves
    /// end boundaries (to the end of the method) and leaves start boundaries untouched.
    pub fn reanchor(&mut self, from: InstrId, to: Option<InstrId>) {
        if let Some(to) = to {
            if self.try_start == from {
                self.try_start = to;
            }
            if self.handler_start == from {
                self.handler_start = to;
            }
            if self.filter_start == Some(from) {
                self.filter_start = Some(to);
            }
        }
        if self.try_end == Some(from) {
            self.try_end = to;
        }
        if self.handler_end == Some(from) {
            self.handler_end = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> ExceptionHandler {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: InstrId(0),
            try_end: Some(InstrId(2)),
            handler_start: InstrId(2),
            handler_end: Some(InstrId(4)),
            filter_start: None,
            catch_type: None,
        }
    }

    #[test]
    fn test_boundaries_at() {
        let eh = region();
        assert_eq!(eh.boundaries_at(InstrId(0)), vec![RegionBoundary::TryStart]);
        assert_eq!(
            eh.boundaries_at(InstrId(2)),
            vec![RegionBoundary::TryEnd, RegionBoundary::HandlerStart]
        );
        assert!(eh.boundaries_at(InstrId(1)).is_empty());
    }

    #[test]
    fn test_reanchor() {
        let mut eh = region();
        eh.reanchor(InstrId(2), Some(InstrId(3)));
        assert_eq!(eh.try_end, Some(InstrId(3)));
        assert_eq!(eh.handler_start, InstrId(3));

        eh.reanchor(InstrId(4), None);
        assert_eq!(eh.handler_end, None);
    }
}
