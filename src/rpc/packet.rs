//! Packet catalog and reply status tokens.

/// Request types understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Ping = 0,
    Trace = 1,
    Boot = 2,
    WriteBegin = 3,
    WriteData = 4,
    WriteEnd = 5,
    SetWirelessConfig = 6,
    OtaBegin = 7,
    OtaData = 8,
    OtaEnd = 9,
}

impl PacketType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Ping,
            1 => Self::Trace,
            2 => Self::Boot,
            3 => Self::WriteBegin,
            4 => Self::WriteData,
            5 => Self::WriteEnd,
            6 => Self::SetWirelessConfig,
            7 => Self::OtaBegin,
            8 => Self::OtaData,
            9 => Self::OtaEnd,
            _ => return None,
        })
    }

    /// Type byte carried by the reply to this request.
    pub const fn reply_type(self) -> u8 {
        reply_type(self as u8)
    }
}

/// Reply type for any request type byte (high bit set).
pub const fn reply_type(request: u8) -> u8 {
    request ^ 0x80
}

/// Short ASCII status carried in reply payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// A boot cannot be accepted right now.
    Busy,
    /// The requested slot holds no image.
    Empty,
    /// Another source owns the current write session.
    Token,
    /// The request payload was malformed.
    Invalid,
    /// The storage backend failed.
    Error,
}

impl Status {
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Ok => b"OK",
            Self::Busy => b"BUSY",
            Self::Empty => b"EMPTY",
            Self::Token => b"TOKEN",
            Self::Invalid => b"INVALID",
            Self::Error => b"ERROR",
        }
    }
}

/// Where a packet came from. Also serves as the write-session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// USB serial.
    Usb,
    /// Framed bytes tunnelled through the legacy CPU's signal channel.
    Tunnel,
    /// The TCP client.
    Network,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Usb, Source::Tunnel, Source::Network];

    pub const fn index(self) -> usize {
        match self {
            Self::Usb => 0,
            Self::Tunnel => 1,
            Self::Network => 2,
        }
    }
}

impl core::fmt::Display for Source {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Usb => write!(f, "usb"),
            Self::Tunnel => write!(f, "tunnel"),
            Self::Network => write!(f, "net"),
        }
    }
}
