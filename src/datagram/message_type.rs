//! Message-type codes carried in every routing header.

use std::fmt;

/// Enumerated message kinds understood by the roles in this crate.
///
/// The raw `u16` travels on the wire; codes outside this set are carried
/// through the bus untouched and rejected only by the participant reading them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    // State server
    ObjectGenerateWithRequired = 2001,
    ObjectGenerateWithRequiredOther = 2003,
    ObjectUpdateField = 2004,
    ObjectDeleteRam = 2007,
    ObjectSetZone = 2008,
    ObjectChangeZone = 2009,
    ObjectQueryAll = 2020,
    ObjectQueryField = 2024,
    ObjectQueryAllResp = 2030,
    ObjectLeavingAuthority = 2033,
    ObjectSetAuthority = 2045,
    ObjectNotifyAuthority = 2047,
    ObjectQueryFieldResp = 2062,
    ObjectEnterZoneWithRequired = 2065,
    ObjectEnterZoneWithRequiredOther = 2066,
    ObjectEnterAuthority = 2067,
    ObjectQueryAuthority = 2083,

    // Database
    DbCreateObject = 3000,
    DbCreateObjectResp = 3001,
    DbDeleteObject = 3008,
    DbGetAll = 3015,
    DbGetAllResp = 3016,

    // Network participant control
    ControlAddChannel = 9000,
    ControlRemoveChannel = 9001,
}

impl MessageType {
    const ALL: [MessageType; 24] = [
        Self::ObjectGenerateWithRequired,
        Self::ObjectGenerateWithRequiredOther,
        Self::ObjectUpdateField,
        Self::ObjectDeleteRam,
        Self::ObjectSetZone,
        Self::ObjectChangeZone,
        Self::ObjectQueryAll,
        Self::ObjectQueryField,
        Self::ObjectQueryAllResp,
        Self::ObjectLeavingAuthority,
        Self::ObjectSetAuthority,
        Self::ObjectNotifyAuthority,
        Self::ObjectQueryFieldResp,
        Self::ObjectEnterZoneWithRequired,
        Self::ObjectEnterZoneWithRequiredOther,
        Self::ObjectEnterAuthority,
        Self::ObjectQueryAuthority,
        Self::DbCreateObject,
        Self::DbCreateObjectResp,
        Self::DbDeleteObject,
        Self::DbGetAll,
        Self::DbGetAllResp,
        Self::ControlAddChannel,
        Self::ControlRemoveChannel,
    ];

    /// Wire code.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Look up a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }
}

impl From<MessageType> for u16 {
    fn from(value: MessageType) -> Self {
        value.code()
    }
}

impl TryFrom<u16> for MessageType {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
