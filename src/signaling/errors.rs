#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HelloErrorCode {
    OriginNotAllowed = 1,
}

impl HelloErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinErrorCode {
    NotWelcomed = 10,
    EmptyRoomId = 11,
}

impl JoinErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
