use chrono::{DateTime, Utc};

/// A state change recorded on a document's audit stream.
///
/// Implemented by the event enums of the document aggregates (reservations,
/// adjustments, transfers, the journal ledger).
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<area>.<document>.<change>`, e.g. `inventory.transfer.shipped`.
    fn event_type(&self) -> &'static str;

    /// Business time of the change.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Payload schema revision. Bump when a variant's fields change shape.
    fn schema_version(&self) -> u32 {
        1
    }

    /// `<area>.<document>` prefix of [`Event::event_type`].
    fn category(&self) -> &'static str {
        let name = self.event_type();
        name.rsplit_once('.').map_or(name, |(prefix, _)| prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Counted(DateTime<Utc>);

    impl Event for Counted {
        fn event_type(&self) -> &'static str {
            "inventory.count.recorded"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn category_drops_the_change_name() {
        let e = Counted(Utc::now());
        assert_eq!(e.category(), "inventory.count");
        assert_eq!(e.schema_version(), 1);
    }
}
