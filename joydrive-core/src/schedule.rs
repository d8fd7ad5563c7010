//! Periodic message templates and the table machinery that fires them
//!
//! A table is an ordered list of prototype frames, each with a period in
//! ticks and an optional payload rule applied on every emission. Tables are
//! declarative data; the per-entry rules keep tick-dependent bytes out of the
//! firing logic.

use crate::frame::{CanFrame, FrameBatch};

/// Payload rule applied to a copy of the template each time it fires
///
/// The stored template itself is never modified.
pub type Mutator = fn(&mut CanFrame, u16);

/// Errors raised while building a message table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Message 0x{id:03X} has a zero period")]
    ZeroPeriod {
        /// Identifier of the offending entry
        id: u16,
    },
}

/// One periodic entry: an immutable prototype frame plus its period
#[derive(Debug, Clone)]
pub struct PeriodicMessage {
    template: CanFrame,
    period: u16,
    mutate: Option<Mutator>,
}

impl PeriodicMessage {
    /// A template emitted verbatim every `period` ticks
    pub fn fixed(template: CanFrame, period: u16) -> Self {
        PeriodicMessage {
            template,
            period,
            mutate: None,
        }
    }

    /// A template whose payload is rewritten by `mutate` on every emission
    pub fn mutated(template: CanFrame, period: u16, mutate: Mutator) -> Self {
        PeriodicMessage {
            template,
            period,
            mutate: Some(mutate),
        }
    }

    /// Identifier of the prototype frame
    pub fn id(&self) -> u16 {
        self.template.id
    }

    /// Emission period in ticks
    pub fn period(&self) -> u16 {
        self.period
    }

    /// Whether this entry fires on `tick`
    ///
    /// Callers must have validated the period; see [`MessageTable::new`].
    pub fn due(&self, tick: u16) -> bool {
        tick % self.period == 0
    }

    /// The frame this entry emits on `tick`
    pub fn emit(&self, tick: u16) -> CanFrame {
        let mut frame = self.template;
        if let Some(mutate) = self.mutate {
            mutate(&mut frame, tick);
        }
        frame
    }
}

/// An ordered set of periodic entries validated at construction
#[derive(Debug, Clone)]
pub struct MessageTable {
    entries: Vec<PeriodicMessage>,
}

impl MessageTable {
    /// Validates every entry's period
    ///
    /// A zero period can never fire and would fault in the modulo at emission
    /// time, so it is rejected here instead.
    pub fn new(entries: Vec<PeriodicMessage>) -> Result<Self, ScheduleError> {
        for entry in &entries {
            if entry.period == 0 {
                return Err(ScheduleError::ZeroPeriod { id: entry.id() });
            }
        }
        Ok(MessageTable { entries })
    }

    /// Number of entries in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for a table with no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends every entry due on `tick` to `batch`, in table order
    ///
    /// Returns the number of frames appended. Each entry is considered
    /// independently; one entry's period never affects another's emission.
    pub fn append_due(&self, batch: &mut FrameBatch, tick: u16) -> usize {
        let mut added = 0;
        for entry in &self.entries {
            if entry.due(tick) {
                batch.push(entry.emit(tick));
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: u16) -> CanFrame {
        CanFrame::new(id, &[0x11, 0x22, 0x33], 0)
    }

    #[test]
    fn test_zero_period_rejected_at_construction() {
        let entries = vec![
            PeriodicMessage::fixed(template(0x100), 5),
            PeriodicMessage::fixed(template(0x200), 0),
        ];
        let err = MessageTable::new(entries).unwrap_err();
        assert_eq!(err, ScheduleError::ZeroPeriod { id: 0x200 });
    }

    #[test]
    fn test_due_follows_tick_modulo() {
        let entry = PeriodicMessage::fixed(template(0x100), 3);
        assert!(entry.due(0));
        assert!(!entry.due(1));
        assert!(!entry.due(2));
        assert!(entry.due(3));
        assert!(entry.due(30000));
    }

    #[test]
    fn test_emit_applies_rule_to_a_copy() {
        fn stamp_tick(frame: &mut CanFrame, tick: u16) {
            frame.data[0] = tick as u8;
        }

        let entry = PeriodicMessage::mutated(template(0x100), 1, stamp_tick);
        let first = entry.emit(7);
        let second = entry.emit(9);
        assert_eq!(first.data[0], 7);
        assert_eq!(second.data[0], 9);
        // The prototype is untouched between emissions
        assert_eq!(entry.emit(0).data[1], 0x22);
    }

    #[test]
    fn test_append_due_keeps_table_order_and_independence() {
        let table = MessageTable::new(vec![
            PeriodicMessage::fixed(template(0x300), 2),
            PeriodicMessage::fixed(template(0x100), 3),
            PeriodicMessage::fixed(template(0x200), 2),
        ])
        .unwrap();

        let mut batch = FrameBatch::new();
        assert_eq!(table.append_due(&mut batch, 4), 2);
        let ids: Vec<u16> = batch.iter().map(|frame| frame.id).collect();
        assert_eq!(ids, vec![0x300, 0x200]);

        let mut batch = FrameBatch::new();
        assert_eq!(table.append_due(&mut batch, 6), 3);
        assert_eq!(batch.len(), 3);

        let mut batch = FrameBatch::new();
        assert_eq!(table.append_due(&mut batch, 1), 0);
        assert!(batch.is_empty());
    }
}
