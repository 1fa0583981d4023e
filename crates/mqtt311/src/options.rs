use mqtt311_protocol::{ConnectPacket, Message, MqttError, Result};
use std::time::Duration;

/// Connection configuration.
///
/// The keep-alive is carried as a duration string (`"30s"`, `"100ms"`) and
/// parsed when connecting; an unparseable value fails the connect call
/// before any network activity.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: String,
    pub will: Option<Message>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            clean_session: true,
            keep_alive: "30s".to_string(),
            will: None,
            username: None,
            password: None,
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: Message) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Checks the options and returns the parsed keep-alive interval.
    pub(crate) fn validate(&self) -> Result<Duration> {
        if self.client_id.is_empty() && !self.clean_session {
            return Err(MqttError::InvalidOption(
                "client ID is required when clean session is disabled".to_string(),
            ));
        }

        humantime::parse_duration(&self.keep_alive).map_err(|err| {
            MqttError::InvalidOption(format!("invalid keep alive {:?}: {err}", self.keep_alive))
        })
    }

    pub(crate) fn to_connect_packet(&self, keep_alive: Duration) -> ConnectPacket {
        ConnectPacket {
            client_id: self.client_id.clone(),
            keep_alive: keep_alive.as_secs().try_into().unwrap_or(u16::MAX),
            clean_session: self.clean_session,
            will: self.will.clone(),
            username: self.username.clone(),
            password: self.password.as_ref().map(|p| p.as_bytes().to_vec()),
        }
    }
}
