//! Typed message payloads and their byte layouts

use crate::course::RoundingSide;
use crate::geo::GeoPoint;
use crate::protocol::{Frame, ProtocolError};

const MESSAGE_VERSION: u8 = 1;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = ProtocolError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(ProtocolError::InvalidValue {
                        field: stringify!($name),
                        value: other,
                    }),
                }
            }
        }
    };
}

wire_enum!(
    /// Message type identifiers carried in the frame header
    MessageType {
        Heartbeat = 1,
        RaceStatus = 12,
        Xml = 26,
        Chatter = 36,
        BoatLocation = 37,
        MarkRounding = 38,
        BoatAction = 100,
        RegistrationRequest = 101,
        RegistrationResponse = 102,
        CustomizeRequest = 103,
        CustomizeResponse = 104,
        Collision = 110,
        TokenUpdate = 111,
        PowerUp = 112,
    }
);

impl MessageType {
    /// Types a client is allowed to send once registered
    pub fn is_client_message(self) -> bool {
        matches!(
            self,
            MessageType::BoatAction
                | MessageType::Chatter
                | MessageType::CustomizeRequest
                | MessageType::RegistrationRequest
        )
    }
}

wire_enum!(
    RaceStage {
        Lobbying = 0,
        PreRace = 1,
        Racing = 2,
        Finished = 3,
    }
);

wire_enum!(
    BoatStatus {
        NotStarted = 1,
        Racing = 2,
        Finished = 3,
    }
);

wire_enum!(
    XmlSubType {
        Regatta = 5,
        Race = 6,
        Boats = 7,
    }
);

wire_enum!(
    /// Helm commands a player can send
    BoatAction {
        Vmg = 1,
        SailsIn = 2,
        SailsOut = 3,
        TackGybe = 4,
        Upwind = 5,
        Downwind = 6,
        MaintainHeading = 7,
        ContinuouslyTurning = 8,
        DefaultTurning = 9,
    }
);

wire_enum!(
    ClientType {
        Spectator = 0,
        Player = 1,
    }
);

wire_enum!(
    RegistrationStatus {
        SuccessSpectating = 0,
        SuccessPlaying = 1,
        FailureGeneral = 0x10,
        FailureFull = 0x11,
    }
);

wire_enum!(
    CustomizeRequestType {
        Name = 0,
        Color = 1,
        Shape = 2,
    }
);

wire_enum!(
    CustomizeStatus {
        Success = 0,
        Failure = 1,
    }
);

wire_enum!(
    CollisionKind {
        Yacht = 0,
        Mark = 1,
        Boundary = 2,
    }
);

wire_enum!(
    MarkType {
        RoundingMark = 1,
        Gate = 2,
    }
);

wire_enum!(
    TokenType {
        Boost = 0,
        Handling = 1,
        WindWalker = 2,
        Bumper = 3,
        Random = 4,
    }
);

impl TokenType {
    /// Every type a random token can resolve into
    pub const CONCRETE: [TokenType; 4] = [
        TokenType::Boost,
        TokenType::Handling,
        TokenType::WindWalker,
        TokenType::Bumper,
    ];
    pub const ALL: [TokenType; 5] = [
        TokenType::Boost,
        TokenType::Handling,
        TokenType::WindWalker,
        TokenType::Bumper,
        TokenType::Random,
    ];
}

wire_enum!(
    PowerUpEvent {
        PickedUp = 0,
        Expired = 1,
        Disabled = 2,
    }
);

impl TryFrom<u8> for RoundingSide {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoundingSide::Unknown),
            1 => Ok(RoundingSide::Port),
            2 => Ok(RoundingSide::Starboard),
            other => Err(ProtocolError::InvalidValue {
                field: "RoundingSide",
                value: other,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoatStatusEntry {
    pub source_id: u32,
    pub status: BoatStatus,
    pub leg: u8,
    pub mark_seq: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceStatusMessage {
    pub race_id: u32,
    pub stage: RaceStage,
    pub start_time: u64,
    pub wind_direction: f64,
    /// Millimetres per second
    pub wind_speed: u16,
    pub boats: Vec<BoatStatusEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoatLocationMessage {
    pub source_id: u32,
    pub sequence: u32,
    pub position: GeoPoint,
    pub heading: f64,
    /// Millimetres per second
    pub speed: u16,
    pub sail_in: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkRoundingMessage {
    pub time: u64,
    pub ack: u16,
    pub race_id: u32,
    pub source_id: u32,
    pub boat_status: BoatStatus,
    pub rounding_side: RoundingSide,
    pub mark_type: MarkType,
    pub mark_id: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub token_type: TokenType,
    pub position: GeoPoint,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat {
        sequence: u32,
    },
    RaceStatus(RaceStatusMessage),
    Xml {
        sub_type: XmlSubType,
        sequence: u16,
        text: String,
    },
    Chatter {
        message_type: u8,
        text: String,
    },
    BoatLocation(BoatLocationMessage),
    MarkRounding(MarkRoundingMessage),
    BoatAction {
        action: BoatAction,
        source_id: u32,
    },
    RegistrationRequest {
        client_type: ClientType,
    },
    RegistrationResponse {
        source_id: u32,
        status: RegistrationStatus,
    },
    CustomizeRequest {
        request: CustomizeRequestType,
        source_id: u32,
        data: Vec<u8>,
    },
    CustomizeResponse {
        request: CustomizeRequestType,
        source_id: u32,
        status: CustomizeStatus,
        data: Vec<u8>,
    },
    Collision {
        source_id: u32,
        kind: CollisionKind,
    },
    TokenUpdate {
        tokens: Vec<TokenInfo>,
    },
    PowerUp {
        source_id: u32,
        event: PowerUpEvent,
        token_type: TokenType,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Heartbeat { .. } => MessageType::Heartbeat,
            Message::RaceStatus(_) => MessageType::RaceStatus,
            Message::Xml { .. } => MessageType::Xml,
            Message::Chatter { .. } => MessageType::Chatter,
            Message::BoatLocation(_) => MessageType::BoatLocation,
            Message::MarkRounding(_) => MessageType::MarkRounding,
            Message::BoatAction { .. } => MessageType::BoatAction,
            Message::RegistrationRequest { .. } => MessageType::RegistrationRequest,
            Message::RegistrationResponse { .. } => MessageType::RegistrationResponse,
            Message::CustomizeRequest { .. } => MessageType::CustomizeRequest,
            Message::CustomizeResponse { .. } => MessageType::CustomizeResponse,
            Message::Collision { .. } => MessageType::Collision,
            Message::TokenUpdate { .. } => MessageType::TokenUpdate,
            Message::PowerUp { .. } => MessageType::PowerUp,
        }
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        match self {
            Message::Heartbeat { sequence } => {
                out.extend_from_slice(&sequence.to_be_bytes());
            }
            Message::RaceStatus(status) => {
                out.push(MESSAGE_VERSION);
                out.extend_from_slice(&status.race_id.to_be_bytes());
                out.push(status.stage as u8);
                put_u48(&mut out, status.start_time);
                out.extend_from_slice(&pack_heading(status.wind_direction).to_be_bytes());
                out.extend_from_slice(&status.wind_speed.to_be_bytes());
                let count = u8::try_from(status.boats.len())
                    .map_err(|_| ProtocolError::PayloadTooLarge(status.boats.len()))?;
                out.push(count);
                for boat in &status.boats {
                    out.extend_from_slice(&boat.source_id.to_be_bytes());
                    out.push(boat.status as u8);
                    out.push(boat.leg);
                    out.push(boat.mark_seq);
                }
            }
            Message::Xml {
                sub_type,
                sequence,
                text,
            } => {
                let len = text_len::<u16>(text, u16::MAX as usize)?;
                out.push(MESSAGE_VERSION);
                out.extend_from_slice(&0u16.to_be_bytes());
                out.push(*sub_type as u8);
                out.extend_from_slice(&sequence.to_be_bytes());
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(text.as_bytes());
            }
            Message::Chatter { message_type, text } => {
                let len = text_len::<u8>(text, u8::MAX as usize)?;
                out.push(MESSAGE_VERSION);
                out.push(*message_type);
                out.push(len);
                out.extend_from_slice(text.as_bytes());
            }
            Message::BoatLocation(location) => {
                out.push(MESSAGE_VERSION);
                out.extend_from_slice(&location.source_id.to_be_bytes());
                out.extend_from_slice(&location.sequence.to_be_bytes());
                out.extend_from_slice(&pack_coordinate(location.position.lat).to_be_bytes());
                out.extend_from_slice(&pack_coordinate(location.position.lng).to_be_bytes());
                out.extend_from_slice(&pack_heading(location.heading).to_be_bytes());
                out.extend_from_slice(&location.speed.to_be_bytes());
                out.push(location.sail_in as u8);
            }
            Message::MarkRounding(rounding) => {
                out.push(MESSAGE_VERSION);
                put_u48(&mut out, rounding.time);
                out.extend_from_slice(&rounding.ack.to_be_bytes());
                out.extend_from_slice(&rounding.race_id.to_be_bytes());
                out.extend_from_slice(&rounding.source_id.to_be_bytes());
                out.push(rounding.boat_status as u8);
                out.push(rounding.rounding_side as u8);
                out.push(rounding.mark_type as u8);
                out.push(rounding.mark_id);
            }
            Message::BoatAction { action, source_id } => {
                out.push(*action as u8);
                out.extend_from_slice(&source_id.to_be_bytes());
            }
            Message::RegistrationRequest { client_type } => {
                out.push(*client_type as u8);
            }
            Message::RegistrationResponse { source_id, status } => {
                out.extend_from_slice(&source_id.to_be_bytes());
                out.push(*status as u8);
            }
            Message::CustomizeRequest {
                request,
                source_id,
                data,
            } => {
                out.push(*request as u8);
                out.extend_from_slice(&source_id.to_be_bytes());
                out.extend_from_slice(data);
            }
            Message::CustomizeResponse {
                request,
                source_id,
                status,
                data,
            } => {
                out.push(*request as u8);
                out.extend_from_slice(&source_id.to_be_bytes());
                out.push(*status as u8);
                out.extend_from_slice(data);
            }
            Message::Collision { source_id, kind } => {
                out.extend_from_slice(&source_id.to_be_bytes());
                out.push(*kind as u8);
            }
            Message::TokenUpdate { tokens } => {
                let count = u8::try_from(tokens.len())
                    .map_err(|_| ProtocolError::PayloadTooLarge(tokens.len()))?;
                out.push(count);
                for token in tokens {
                    out.push(token.token_type as u8);
                    out.extend_from_slice(&pack_coordinate(token.position.lat).to_be_bytes());
                    out.extend_from_slice(&pack_coordinate(token.position.lng).to_be_bytes());
                }
            }
            Message::PowerUp {
                source_id,
                event,
                token_type,
            } => {
                out.extend_from_slice(&source_id.to_be_bytes());
                out.push(*event as u8);
                out.push(*token_type as u8);
            }
        }
        Ok(out)
    }

    pub fn to_frame(&self, timestamp: u64) -> Result<Frame, ProtocolError> {
        Ok(Frame::new(
            self.message_type() as u8,
            timestamp,
            self.encode_payload()?,
        ))
    }

    /// Frames the message and returns the bytes ready to be written
    pub fn encode(&self, timestamp: u64) -> Result<Vec<u8>, ProtocolError> {
        self.to_frame(timestamp)?.encode()
    }

    pub fn from_frame(frame: &Frame) -> Result<Message, ProtocolError> {
        let message_type = MessageType::try_from(frame.message_type)
            .map_err(|_| ProtocolError::UnknownMessageType(frame.message_type))?;
        let mut r = PayloadReader::new(&frame.payload);

        let message = match message_type {
            MessageType::Heartbeat => Message::Heartbeat {
                sequence: r.u32()?,
            },
            MessageType::RaceStatus => {
                r.u8()?;
                let race_id = r.u32()?;
                let stage = RaceStage::try_from(r.u8()?)?;
                let start_time = r.u48()?;
                let wind_direction = unpack_heading(r.u16()?);
                let wind_speed = r.u16()?;
                let count = r.u8()?;
                let mut boats = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    boats.push(BoatStatusEntry {
                        source_id: r.u32()?,
                        status: BoatStatus::try_from(r.u8()?)?,
                        leg: r.u8()?,
                        mark_seq: r.u8()?,
                    });
                }
                Message::RaceStatus(RaceStatusMessage {
                    race_id,
                    stage,
                    start_time,
                    wind_direction,
                    wind_speed,
                    boats,
                })
            }
            MessageType::Xml => {
                r.u8()?;
                r.u16()?;
                let sub_type = XmlSubType::try_from(r.u8()?)?;
                let sequence = r.u16()?;
                let len = r.u16()? as usize;
                let text = r.text(len)?;
                Message::Xml {
                    sub_type,
                    sequence,
                    text,
                }
            }
            MessageType::Chatter => {
                r.u8()?;
                let message_type = r.u8()?;
                let len = r.u8()? as usize;
                let text = r.text(len)?;
                Message::Chatter { message_type, text }
            }
            MessageType::BoatLocation => {
                r.u8()?;
                Message::BoatLocation(BoatLocationMessage {
                    source_id: r.u32()?,
                    sequence: r.u32()?,
                    position: GeoPoint::new(
                        unpack_coordinate(r.i32()?),
                        unpack_coordinate(r.i32()?),
                    ),
                    heading: unpack_heading(r.u16()?),
                    speed: r.u16()?,
                    sail_in: r.u8()? != 0,
                })
            }
            MessageType::MarkRounding => {
                r.u8()?;
                Message::MarkRounding(MarkRoundingMessage {
                    time: r.u48()?,
                    ack: r.u16()?,
                    race_id: r.u32()?,
                    source_id: r.u32()?,
                    boat_status: BoatStatus::try_from(r.u8()?)?,
                    rounding_side: RoundingSide::try_from(r.u8()?)?,
                    mark_type: MarkType::try_from(r.u8()?)?,
                    mark_id: r.u8()?,
                })
            }
            MessageType::BoatAction => Message::BoatAction {
                action: BoatAction::try_from(r.u8()?)?,
                source_id: r.u32()?,
            },
            MessageType::RegistrationRequest => Message::RegistrationRequest {
                client_type: ClientType::try_from(r.u8()?)?,
            },
            MessageType::RegistrationResponse => Message::RegistrationResponse {
                source_id: r.u32()?,
                status: RegistrationStatus::try_from(r.u8()?)?,
            },
            MessageType::CustomizeRequest => Message::CustomizeRequest {
                request: CustomizeRequestType::try_from(r.u8()?)?,
                source_id: r.u32()?,
                data: r.rest().to_vec(),
            },
            MessageType::CustomizeResponse => Message::CustomizeResponse {
                request: CustomizeRequestType::try_from(r.u8()?)?,
                source_id: r.u32()?,
                status: CustomizeStatus::try_from(r.u8()?)?,
                data: r.rest().to_vec(),
            },
            MessageType::Collision => Message::Collision {
                source_id: r.u32()?,
                kind: CollisionKind::try_from(r.u8()?)?,
            },
            MessageType::TokenUpdate => {
                let count = r.u8()?;
                let mut tokens = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    tokens.push(TokenInfo {
                        token_type: TokenType::try_from(r.u8()?)?,
                        position: GeoPoint::new(
                            unpack_coordinate(r.i32()?),
                            unpack_coordinate(r.i32()?),
                        ),
                    });
                }
                Message::TokenUpdate { tokens }
            }
            MessageType::PowerUp => Message::PowerUp {
                source_id: r.u32()?,
                event: PowerUpEvent::try_from(r.u8()?)?,
                token_type: TokenType::try_from(r.u8()?)?,
            },
        };

        Ok(message)
    }
}

/// Latitude or longitude scaled so that 180 degrees maps to 2^31
pub fn pack_coordinate(degrees: f64) -> i32 {
    (degrees * 2_147_483_648.0 / 180.0).round() as i32
}

pub fn unpack_coordinate(packed: i32) -> f64 {
    packed as f64 * 180.0 / 2_147_483_648.0
}

/// Angle scaled so that a full turn maps to 2^16
pub fn pack_heading(degrees: f64) -> u16 {
    let scaled = (degrees.rem_euclid(360.0) * 65_536.0 / 360.0).round() as u32;
    (scaled % 65_536) as u16
}

pub fn unpack_heading(packed: u16) -> f64 {
    packed as f64 * 360.0 / 65_536.0
}

fn put_u48(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes()[2..]);
}

fn text_len<T: TryFrom<usize>>(text: &str, max: usize) -> Result<T, ProtocolError> {
    T::try_from(text.len()).map_err(|_| ProtocolError::TextTooLong {
        len: text.len(),
        max,
    })
}

/// Big-endian cursor over a payload
struct PayloadReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ProtocolError> {
        let available = self.bytes.len() - self.offset;
        if count > available {
            return Err(ProtocolError::Truncated {
                needed: count,
                available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u48(&mut self) -> Result<u64, ProtocolError> {
        let b = self.take(6)?;
        Ok(u64::from_be_bytes([0, 0, b[0], b[1], b[2], b[3], b[4], b[5]]))
    }

    fn text(&mut self, len: usize) -> Result<String, ProtocolError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidText)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn decode(message: &Message) -> Message {
        let frame = message.to_frame(42).unwrap();
        Message::from_frame(&frame).unwrap()
    }

    #[test]
    fn test_client_messages_round_trip() {
        let messages = vec![
            Message::RegistrationRequest {
                client_type: ClientType::Player,
            },
            Message::BoatAction {
                action: BoatAction::TackGybe,
                source_id: 7,
            },
            Message::Chatter {
                message_type: 1,
                text: "/speed 2.5".to_string(),
            },
            Message::CustomizeRequest {
                request: CustomizeRequestType::Color,
                source_id: 3,
                data: vec![255, 0, 128],
            },
        ];

        for message in messages {
            assert_eq!(decode(&message), message);
        }
    }

    #[test]
    fn test_registration_response_layout() {
        let message = Message::RegistrationResponse {
            source_id: 0x0102_0304,
            status: RegistrationStatus::FailureFull,
        };
        assert_eq!(message.encode_payload().unwrap(), vec![1, 2, 3, 4, 0x11]);
        assert_eq!(decode(&message), message);
    }

    #[test]
    fn test_xml_layout() {
        let message = Message::Xml {
            sub_type: XmlSubType::Race,
            sequence: 1,
            text: "ab".to_string(),
        };

        let payload = message.encode_payload().unwrap();
        assert_eq!(payload, vec![1, 0, 0, 6, 0, 1, 0, 2, b'a', b'b']);
        assert_eq!(message.encode(1_000).unwrap(), message.encode(1_000).unwrap());
        assert_eq!(decode(&message), message);
    }

    #[test]
    fn test_mark_rounding_layout() {
        let message = Message::MarkRounding(MarkRoundingMessage {
            time: 1_600_000_000_000,
            ack: 0,
            race_id: 99,
            source_id: 5,
            boat_status: BoatStatus::Racing,
            rounding_side: RoundingSide::Port,
            mark_type: MarkType::Gate,
            mark_id: 3,
        });

        let payload = message.encode_payload().unwrap();
        assert_eq!(payload.len(), 21);
        assert_eq!(&payload[17..], &[2, 1, 2, 3]);
        assert_eq!(decode(&message), message);
    }

    #[test]
    fn test_boat_location_is_close_after_packing() {
        let original = BoatLocationMessage {
            source_id: 12,
            sequence: 400,
            position: GeoPoint::new(57.671234, 11.834567),
            heading: 271.3,
            speed: 6200,
            sail_in: true,
        };

        match decode(&Message::BoatLocation(original.clone())) {
            Message::BoatLocation(decoded) => {
                assert_eq!(decoded.source_id, original.source_id);
                assert_eq!(decoded.sequence, original.sequence);
                assert_approx_eq!(decoded.position.lat, original.position.lat, 1e-6);
                assert_approx_eq!(decoded.position.lng, original.position.lng, 1e-6);
                assert_approx_eq!(decoded.heading, original.heading, 0.01);
                assert_eq!(decoded.speed, 6200);
                assert!(decoded.sail_in);
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_race_status_and_tokens() {
        let status = Message::RaceStatus(RaceStatusMessage {
            race_id: 1,
            stage: RaceStage::Racing,
            start_time: 1_234_567,
            wind_direction: 180.0,
            wind_speed: 10_000,
            boats: vec![BoatStatusEntry {
                source_id: 1,
                status: BoatStatus::Finished,
                leg: 3,
                mark_seq: 2,
            }],
        });
        assert_eq!(decode(&status), status);

        let tokens = Message::TokenUpdate {
            tokens: vec![TokenInfo {
                token_type: TokenType::Bumper,
                position: GeoPoint::new(0.0, 0.0),
            }],
        };
        assert_eq!(decode(&tokens), tokens);
    }

    #[test]
    fn test_unknown_and_invalid_values() {
        let frame = Frame::new(55, 0, vec![]);
        assert_eq!(
            Message::from_frame(&frame),
            Err(ProtocolError::UnknownMessageType(55))
        );

        let frame = Frame::new(MessageType::BoatAction as u8, 0, vec![42, 0, 0, 0, 1]);
        assert_eq!(
            Message::from_frame(&frame),
            Err(ProtocolError::InvalidValue {
                field: "BoatAction",
                value: 42
            })
        );
    }

    #[test]
    fn test_truncated_payload() {
        let frame = Frame::new(MessageType::Collision as u8, 0, vec![0, 0, 1]);
        assert_eq!(
            Message::from_frame(&frame),
            Err(ProtocolError::Truncated {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_chatter_text_limits() {
        let long = Message::Chatter {
            message_type: 1,
            text: "x".repeat(256),
        };
        assert_eq!(
            long.encode_payload(),
            Err(ProtocolError::TextTooLong { len: 256, max: 255 })
        );

        let frame = Frame::new(MessageType::Chatter as u8, 0, vec![1, 1, 2, 0xff, 0xfe]);
        assert_eq!(Message::from_frame(&frame), Err(ProtocolError::InvalidText));
    }

    #[test]
    fn test_heading_packing_wraps() {
        assert_eq!(pack_heading(0.0), 0);
        assert_eq!(pack_heading(360.0), 0);
        assert_eq!(pack_heading(-90.0), pack_heading(270.0));
        assert_eq!(pack_heading(359.999), 0);
        assert_approx_eq!(unpack_heading(pack_heading(90.0)), 90.0, 1e-9);
    }

    #[test]
    fn test_client_message_types() {
        assert!(MessageType::BoatAction.is_client_message());
        assert!(!MessageType::MarkRounding.is_client_message());
        assert!(!MessageType::RegistrationResponse.is_client_message());
    }
}
