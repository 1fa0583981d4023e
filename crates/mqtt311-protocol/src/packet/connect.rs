use crate::encoding::{read_lp_bytes, read_lp_string, read_u16, write_lp_bytes, write_u16};
use crate::error::{MqttError, Result};
use crate::packet::{header_len, read_header, write_header, MqttPacket, PacketType};
use crate::types::{Message, QoS};

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Session-establishment request, the first packet on every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<Message>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl Default for ConnectPacket {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            keep_alive: 30,
            clean_session: true,
            will: None,
            username: None,
            password: None,
        }
    }
}

impl ConnectPacket {
    fn body_len(&self) -> usize {
        let mut total = 10 + 2 + self.client_id.len();
        if let Some(ref will) = self.will {
            total += 2 + will.topic.len() + 2 + will.payload.len();
        }
        if let Some(ref username) = self.username {
            total += 2 + username.len();
        }
        if let Some(ref password) = self.password {
            total += 2 + password.len();
        }
        total
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(ref will) = self.will {
            flags |= FLAG_WILL;
            flags |= will.qos.as_u8() << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn len(&self) -> usize {
        let body = self.body_len();
        header_len(body as u32) + body
    }

    fn encode(&self, dst: &mut [u8]) -> Result<usize> {
        if self.client_id.is_empty() && !self.clean_session {
            return Err(MqttError::MalformedPacket(
                "Client ID must be set when clean session is disabled".to_string(),
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(MqttError::MalformedPacket(
                "Password must not be set without a username".to_string(),
            ));
        }

        let needed = self.len();
        if dst.len() < needed {
            return Err(MqttError::BufferTooSmall {
                needed,
                available: dst.len(),
            });
        }

        let mut total = write_header(dst, PacketType::Connect, self.body_len() as u32)?;
        total += write_lp_bytes(&mut dst[total..], PROTOCOL_NAME)?;
        dst[total] = PROTOCOL_LEVEL;
        total += 1;
        dst[total] = self.connect_flags();
        total += 1;
        total += write_u16(&mut dst[total..], self.keep_alive)?;

        total += write_lp_bytes(&mut dst[total..], self.client_id.as_bytes())?;
        if let Some(ref will) = self.will {
            total += write_lp_bytes(&mut dst[total..], will.topic.as_bytes())?;
            total += write_lp_bytes(&mut dst[total..], &will.payload)?;
        }
        if let Some(ref username) = self.username {
            total += write_lp_bytes(&mut dst[total..], username.as_bytes())?;
        }
        if let Some(ref password) = self.password {
            total += write_lp_bytes(&mut dst[total..], password)?;
        }

        Ok(total)
    }

    fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (remaining, header_len) = read_header(src, PacketType::Connect)?;
        if remaining < 10 {
            return Err(MqttError::MalformedPacket(
                "CONNECT variable header truncated".to_string(),
            ));
        }
        let end = header_len + remaining as usize;
        let mut total = header_len;

        let (name, n) = read_lp_bytes(&src[total..])?;
        if name != PROTOCOL_NAME {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid protocol name: {name:?}"
            )));
        }
        total += n;

        let level = src[total];
        if level != PROTOCOL_LEVEL {
            return Err(MqttError::MalformedPacket(format!(
                "Unsupported protocol level: {level}"
            )));
        }
        total += 1;

        let flags = src[total];
        total += 1;
        if flags & 0x01 != 0 {
            return Err(MqttError::MalformedPacket(
                "Reserved connect flag must be zero".to_string(),
            ));
        }

        let clean_session = flags & FLAG_CLEAN_SESSION != 0;
        let has_will = flags & FLAG_WILL != 0;
        let will_qos = (flags >> 3) & 0x03;
        let will_retain = flags & FLAG_WILL_RETAIN != 0;
        let has_username = flags & FLAG_USERNAME != 0;
        let has_password = flags & FLAG_PASSWORD != 0;

        if !has_will && (will_qos != 0 || will_retain) {
            return Err(MqttError::MalformedPacket(
                "Will flags set without a will".to_string(),
            ));
        }
        if has_password && !has_username {
            return Err(MqttError::MalformedPacket(
                "Password flag set without the username flag".to_string(),
            ));
        }

        let (keep_alive, n) = read_u16(&src[total..])?;
        total += n;

        let (client_id, n) = read_lp_string(&src[total..])?;
        total += n;

        let will = if has_will {
            let (topic, n) = read_lp_string(&src[total..])?;
            total += n;
            let (payload, n) = read_lp_bytes(&src[total..])?;
            total += n;
            Some(Message {
                topic,
                payload: payload.to_vec().into(),
                qos: QoS::try_from(will_qos)?,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if has_username {
            let (username, n) = read_lp_string(&src[total..])?;
            total += n;
            Some(username)
        } else {
            None
        };

        let password = if has_password {
            let (password, n) = read_lp_bytes(&src[total..])?;
            total += n;
            Some(password.to_vec())
        } else {
            None
        };

        if total != end {
            return Err(MqttError::MalformedPacket(format!(
                "CONNECT body length mismatch: declared {remaining}, decoded {}",
                total - header_len
            )));
        }

        Ok((
            Self {
                client_id,
                keep_alive,
                clean_session,
                will,
                username,
                password,
            },
            total,
        ))
    }
}
