//! Bus frame value type

/// A transport-layer maximum transmission unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mtu {
    #[default]
    Classic,
    Fd,
}

impl Mtu {
    pub const fn bytes(self) -> usize {
        match self {
            Mtu::Classic => 8,
            Mtu::Fd => 64,
        }
    }

    pub const fn is_fd(self) -> bool {
        matches!(self, Mtu::Fd)
    }
}

impl From<Mtu> for usize {
    fn from(value: Mtu) -> Self {
        value.bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IncorrectMtu;

impl TryFrom<usize> for Mtu {
    type Error = IncorrectMtu;
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(Mtu::Classic),
            64 => Ok(Mtu::Fd),
            _ => Err(IncorrectMtu),
        }
    }
}

/// Extended (29-bit) CAN identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanId(u32);

impl CanId {
    const MAX_VALUE: u32 = 0x1fff_ffff;
    pub const MAX: CanId = CanId(Self::MAX_VALUE);

    pub const fn new(value: u32) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn from_u32_truncating(value: u32) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

impl From<CanId> for u32 {
    fn from(value: CanId) -> Self {
        value.into_u32()
    }
}

/// CAN-FD-compatible data length
///
/// The CAN FD data length code covers 0..=8 bytes one by one and then
/// 12, 16, 20, 24, 32, 48 and 64. Classic CAN uses the 0..=8 subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataLength(u8);

impl DataLength {
    pub const MAX: usize = 64;

    pub const fn new(value: usize) -> Option<Self> {
        let floor = Self::new_floor(value);
        if floor.as_usize() == value {
            Some(floor)
        } else {
            None
        }
    }

    /// Longest valid length not exceeding `value`
    pub const fn new_floor(value: usize) -> Self {
        let floor = match value {
            0..=8 => value,
            9..24 => value / 4 * 4,
            24..32 => value / 8 * 8,
            32..64 => value / 16 * 16,
            64.. => 64,
        };
        Self(floor as u8)
    }

    /// Shortest valid length not below `value`, e.g. the padded size of a last frame
    pub const fn new_ceil(value: usize) -> Option<Self> {
        if value > Self::MAX {
            return None;
        }
        let ceil = match value {
            0..=8 => value,
            9..24 => value.div_ceil(4) * 4,
            24..32 => value.div_ceil(8) * 8,
            32.. => value.div_ceil(16) * 16,
        };
        Some(Self(ceil as u8))
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl From<DataLength> for usize {
    fn from(value: DataLength) -> Self {
        value.as_usize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidLength;

/// Frame payload of a DLC-compatible length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    length: DataLength,
    bytes: [u8; DataLength::MAX],
}

impl Data {
    pub fn new(data: &[u8]) -> Result<Self, InvalidLength> {
        let length = DataLength::new(data.len()).ok_or(InvalidLength)?;
        let mut bytes = [0; DataLength::MAX];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self { length, bytes })
    }

    pub const fn new_zeros(length: DataLength) -> Self {
        Self {
            length,
            bytes: [0; DataLength::MAX],
        }
    }

    pub fn length(&self) -> DataLength {
        self.length
    }
}

impl Default for Data {
    fn default() -> Self {
        Self::new_zeros(DataLength(0))
    }
}

impl core::ops::Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..self.length.as_usize()]
    }
}

impl core::ops::DerefMut for Data {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes[..self.length.as_usize()]
    }
}

/// Raw bus frame as seen by the driver
///
/// The value is copied by the ISR relay, so it holds no references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub id: CanId,
    pub data: Data,
}

impl Frame {
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            id,
            data: Data::new(data)?,
        })
    }
}
