/// Websocket close codes used on runner connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// The runner is shutting down in an orderly way.
    ClientDisconnect,
    /// The server dropped the runner (heartbeat timeout, shutdown, reset).
    ServerDisconnect,
    /// Another runner with the same name is already connected.
    NameTaken,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            CloseCode::ClientDisconnect => 4000,
            CloseCode::ServerDisconnect => 4002,
            CloseCode::NameTaken => 4003,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(CloseCode::ClientDisconnect),
            4002 => Some(CloseCode::ServerDisconnect),
            4003 => Some(CloseCode::NameTaken),
            _ => None,
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CloseCode::ClientDisconnect => "client disconnect",
            CloseCode::ServerDisconnect => "server disconnect",
            CloseCode::NameTaken => "name already taken",
        };
        write!(f, "{} ({})", label, self.code())
    }
}
