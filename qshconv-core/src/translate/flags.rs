//! Order-log flag word → lifecycle, side, time in force and status mask.

use super::TranslateError;
use crate::domain::{Lifecycle, OrderStatus, Side, TimeInForce};
use crate::qsh::OrdLogFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFlags {
    pub lifecycle: Option<Lifecycle>,
    pub side: Option<Side>,
    pub time_in_force: Option<TimeInForce>,
    pub status: OrderStatus,
    pub is_system: bool,
}

pub fn decode_flags(flags: OrdLogFlags) -> Result<DecodedFlags, TranslateError> {
    let lifecycle = lifecycle(flags);
    let side = side(flags)?;
    let time_in_force = time_in_force(flags);
    Ok(DecodedFlags {
        lifecycle,
        side,
        time_in_force,
        status: status(flags, lifecycle),
        is_system: !flags.contains(OrdLogFlags::NON_SYSTEM),
    })
}

/// First match wins: Add, Fill, Canceled, CanceledGroup, Moved.
fn lifecycle(flags: OrdLogFlags) -> Option<Lifecycle> {
    match (
        flags.contains(OrdLogFlags::ADD),
        flags.contains(OrdLogFlags::FILL),
        flags.contains(OrdLogFlags::CANCELED),
        flags.contains(OrdLogFlags::CANCELED_GROUP),
        flags.contains(OrdLogFlags::MOVED),
    ) {
        (true, _, _, _, _) => Some(Lifecycle::Active),
        (false, true, _, _, _) => Some(Lifecycle::Filled),
        (false, false, true, _, _) => Some(Lifecycle::Cancelled),
        (false, false, false, true, _) => Some(Lifecycle::GroupCancelled),
        (false, false, false, false, true) => Some(Lifecycle::Moved),
        (false, false, false, false, false) => None,
    }
}

fn side(flags: OrdLogFlags) -> Result<Option<Side>, TranslateError> {
    match (
        flags.contains(OrdLogFlags::BUY),
        flags.contains(OrdLogFlags::SELL),
    ) {
        (true, false) => Ok(Some(Side::Buy)),
        (false, true) => Ok(Some(Side::Sell)),
        (false, false) => Ok(None),
        (true, true) => Err(TranslateError::ConflictingSide {
            flags: flags.bits(),
        }),
    }
}

fn time_in_force(flags: OrdLogFlags) -> Option<TimeInForce> {
    match (
        flags.contains(OrdLogFlags::QUOTE),
        flags.contains(OrdLogFlags::FILL_OR_KILL),
    ) {
        (true, _) => Some(TimeInForce::PutInQueue),
        (false, true) => Some(TimeInForce::MatchOrCancel),
        (false, false) => None,
    }
}

fn status(flags: OrdLogFlags, lifecycle: Option<Lifecycle>) -> OrderStatus {
    const PLAIN_BITS: [(u16, u32); 5] = [
        (OrdLogFlags::QUOTE, OrderStatus::QUOTE),
        (OrdLogFlags::COUNTER, OrderStatus::COUNTER),
        (OrdLogFlags::NON_SYSTEM, OrderStatus::NON_SYSTEM),
        (OrdLogFlags::END_OF_TRANSACTION, OrderStatus::END_OF_TRANSACTION),
        (OrdLogFlags::CROSS_TRADE, OrderStatus::CROSS_TRADE),
    ];

    let mut status = OrderStatus::default();
    for (flag, bit) in PLAIN_BITS {
        if flags.contains(flag) {
            status.insert(bit);
        }
    }
    if flags.contains(OrdLogFlags::FILL_OR_KILL) {
        status.insert(OrderStatus::FILL_OR_KILL);
    }
    match lifecycle {
        Some(Lifecycle::Moved) => status.insert(OrderStatus::MOVED),
        Some(Lifecycle::Cancelled) => status.insert(OrderStatus::CANCELED),
        Some(Lifecycle::GroupCancelled) => status.insert(OrderStatus::CANCELED_GROUP),
        Some(Lifecycle::Active | Lifecycle::Filled) | None => {}
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(bits: &[u16]) -> OrdLogFlags {
        OrdLogFlags::from_bits(bits.iter().fold(0, |acc, b| acc | b))
    }

    #[test]
    fn cancel_buy() {
        let d = decode_flags(flags(&[OrdLogFlags::CANCELED, OrdLogFlags::BUY])).unwrap();
        assert_eq!(d.lifecycle, Some(Lifecycle::Cancelled));
        assert_eq!(d.side, Some(Side::Buy));
        assert!(d.status.contains(OrderStatus::CANCELED));
        assert!(d.is_system);
    }

    #[test]
    fn add_wins_over_later_lifecycle_flags() {
        let d = decode_flags(flags(&[
            OrdLogFlags::ADD,
            OrdLogFlags::CANCELED,
            OrdLogFlags::MOVED,
        ]))
        .unwrap();
        assert_eq!(d.lifecycle, Some(Lifecycle::Active));
        assert!(!d.status.contains(OrderStatus::CANCELED));
        assert!(!d.status.contains(OrderStatus::MOVED));
    }

    #[test]
    fn only_winning_lifecycle_sets_its_bit() {
        let d = decode_flags(flags(&[OrdLogFlags::CANCELED_GROUP, OrdLogFlags::MOVED])).unwrap();
        assert_eq!(d.lifecycle, Some(Lifecycle::GroupCancelled));
        assert_eq!(d.status.bits(), OrderStatus::CANCELED_GROUP);
    }

    #[test]
    fn both_sides_conflict() {
        let err = decode_flags(flags(&[OrdLogFlags::BUY, OrdLogFlags::SELL])).unwrap_err();
        assert!(matches!(err, TranslateError::ConflictingSide { .. }));
    }

    #[test]
    fn quote_wins_time_in_force() {
        let d = decode_flags(flags(&[OrdLogFlags::QUOTE, OrdLogFlags::FILL_OR_KILL])).unwrap();
        assert_eq!(d.time_in_force, Some(TimeInForce::PutInQueue));
        assert!(d.status.contains(OrderStatus::QUOTE));
        assert!(d.status.contains(OrderStatus::FILL_OR_KILL));

        let d = decode_flags(flags(&[OrdLogFlags::FILL_OR_KILL])).unwrap();
        assert_eq!(d.time_in_force, Some(TimeInForce::MatchOrCancel));
    }

    #[test]
    fn plain_status_bits_map_through() {
        let d = decode_flags(flags(&[
            OrdLogFlags::COUNTER,
            OrdLogFlags::NON_SYSTEM,
            OrdLogFlags::END_OF_TRANSACTION,
            OrdLogFlags::CROSS_TRADE,
        ]))
        .unwrap();
        assert_eq!(
            d.status.bits(),
            OrderStatus::COUNTER
                | OrderStatus::NON_SYSTEM
                | OrderStatus::END_OF_TRANSACTION
                | OrderStatus::CROSS_TRADE
        );
        assert!(!d.is_system);
        assert_eq!(d.lifecycle, None);
        assert_eq!(d.side, None);
    }
}
