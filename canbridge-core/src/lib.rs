//! Cyphal/CAN core data types
//!
//! Identifier, priority and transfer-kind definitions shared by the canbridge crates.
//! Applications should use the `canbridge::core` reexport instead of depending on this crate.
#![no_std]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Transfer priority
///
/// Numeric codes follow the CAN ID priority field, so a numerically lower value
/// wins bus arbitration: `Exceptional` is the most urgent level and `Optional` the least.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Priority {
    /// Reserved for total system failure handling.
    Exceptional = 0,
    Immediate = 1,
    Fast = 2,
    High = 3,
    /// Default level for regular traffic, e.g. heartbeats.
    Nominal = 4,
    Low = 5,
    Slow = 6,
    /// Diagnostic traffic that a correct system never depends on.
    Optional = 7,
}

impl Priority {
    pub const MIN: Priority = Priority::Exceptional;
    pub const MAX: Priority = Priority::Optional;
    pub const COUNT: usize = Self::MAX.into_u8() as usize + 1;

    pub const fn try_from_u8(code: u8) -> Option<Priority> {
        if code <= Self::MAX.into_u8() {
            Some(Priority::from_u8_truncating(code))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(code: u8) -> Priority {
        match code & 0x7 {
            0 => Priority::Exceptional,
            1 => Priority::Immediate,
            2 => Priority::Fast,
            3 => Priority::High,
            4 => Priority::Nominal,
            5 => Priority::Low,
            6 => Priority::Slow,
            _ => Priority::Optional,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Nominal
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.into_u8()
    }
}

impl From<Priority> for usize {
    fn from(value: Priority) -> Self {
        u8::from(value).into()
    }
}

impl TryFrom<u8> for Priority {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// A bit set of priority levels
///
/// Bit `n` stands for the priority with code `n`, so [`PrioritySet::first`] returns
/// the most urgent member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrioritySet(u8);

impl PrioritySet {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u8::MAX);

    pub const fn new_eq(priority: Priority) -> Self {
        Self(1u8 << priority.into_u8())
    }

    pub const fn contains(&self, priority: Priority) -> bool {
        (self.0 >> priority.into_u8()) & 0x1 != 0
    }

    pub const fn insert(&mut self, priority: Priority) {
        self.0 |= Self::new_eq(priority).0
    }

    pub const fn remove(&mut self, priority: Priority) {
        self.0 &= !Self::new_eq(priority).0
    }

    /// Most urgent member
    pub const fn first(&self) -> Option<Priority> {
        Priority::try_from_u8(self.0.trailing_zeros() as u8)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

macro_rules! bounded_id {
    ($(#[$attr:meta])* $name:ident, $repr:ty, $max:expr, $from_truncating:ident, $into:ident) => {
        $(#[$attr])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name($repr);

        impl $name {
            const MAX_VALUE: $repr = $max;
            pub const MAX: $name = $name(Self::MAX_VALUE);

            pub const fn new(value: $repr) -> Option<Self> {
                if value <= Self::MAX_VALUE {
                    Some(Self(value))
                } else {
                    None
                }
            }

            pub const fn $from_truncating(value: $repr) -> Self {
                Self(value & Self::MAX_VALUE)
            }

            pub const fn $into(self) -> $repr {
                self.0
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.$into()
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = InvalidValue;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(InvalidValue)
            }
        }
    };
}

bounded_id!(
    /// Node address on the bus
    NodeId,
    u8,
    0x7f,
    from_u8_truncating,
    into_u8
);

bounded_id!(
    /// Message port identifier
    SubjectId,
    u16,
    0x1fff,
    from_u16_truncating,
    into_u16
);

bounded_id!(
    /// Request/response port identifier
    ServiceId,
    u16,
    0x1ff,
    from_u16_truncating,
    into_u16
);

bounded_id!(
    /// Cyclic transfer sequence number
    ///
    /// Increments by one per transfer on a session and wraps to zero after [`TransferId::MAX`].
    TransferId,
    u8,
    0x1f,
    from_u8_truncating,
    into_u8
);

impl TransferId {
    pub const SESSION_START: TransferId = TransferId(0);

    pub const fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX_VALUE)
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::SESSION_START
    }
}

impl From<NodeId> for usize {
    fn from(value: NodeId) -> Self {
        u8::from(value).into()
    }
}

/// Transfer kind
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferKind {
    Message,
    Request,
    Response,
}

/// Transfer kind together with its port
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataSpecifier {
    Message(SubjectId),
    Request(ServiceId),
    Response(ServiceId),
}

impl DataSpecifier {
    /// Builds a specifier from a raw port number, validating its range for the kind.
    pub const fn new(kind: TransferKind, port: u16) -> Option<Self> {
        match kind {
            TransferKind::Message => match SubjectId::new(port) {
                Some(subject) => Some(DataSpecifier::Message(subject)),
                None => None,
            },
            TransferKind::Request => match ServiceId::new(port) {
                Some(service) => Some(DataSpecifier::Request(service)),
                None => None,
            },
            TransferKind::Response => match ServiceId::new(port) {
                Some(service) => Some(DataSpecifier::Response(service)),
                None => None,
            },
        }
    }

    pub const fn kind(&self) -> TransferKind {
        match self {
            DataSpecifier::Message(_) => TransferKind::Message,
            DataSpecifier::Request(_) => TransferKind::Request,
            DataSpecifier::Response(_) => TransferKind::Response,
        }
    }

    pub const fn port(&self) -> u16 {
        match self {
            DataSpecifier::Message(subject) => subject.into_u16(),
            DataSpecifier::Request(service) | DataSpecifier::Response(service) => {
                service.into_u16()
            }
        }
    }
}
