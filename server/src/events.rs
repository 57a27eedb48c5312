use crate::progression::Progress;
use shared::protocol::{
    CollisionKind, MarkRoundingMessage, Message, PowerUpEvent, RaceStage, TokenInfo, TokenType,
};

/// Chatter message type used for server announcements
pub const ANNOUNCEMENT_CHATTER: u8 = 0;

/// Something that happened during a tick and must reach every client
#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    StageChanged(RaceStage),
    MarkRounded(Progress),
    Collision {
        source_id: u32,
        kind: CollisionKind,
    },
    TokensChanged(Vec<TokenInfo>),
    PowerUp {
        source_id: u32,
        event: PowerUpEvent,
        token_type: TokenType,
    },
    Chatter {
        message_type: u8,
        text: String,
    },
    YachtJoined {
        source_id: u32,
    },
    YachtLeft {
        source_id: u32,
    },
}

impl RaceEvent {
    pub fn announcement(text: impl Into<String>) -> Self {
        RaceEvent::Chatter {
            message_type: ANNOUNCEMENT_CHATTER,
            text: text.into(),
        }
    }

    /// Wire messages for this event, in send order
    ///
    /// Stage changes, joins and leaves carry no message of their own; the
    /// next race status broadcast reflects them.
    pub fn to_messages(&self, race_id: u32, now_ms: u64) -> Vec<Message> {
        match self {
            RaceEvent::StageChanged(_)
            | RaceEvent::YachtJoined { .. }
            | RaceEvent::YachtLeft { .. } => Vec::new(),
            RaceEvent::MarkRounded(progress) => vec![
                Message::MarkRounding(MarkRoundingMessage {
                    time: now_ms,
                    ack: 0,
                    race_id,
                    source_id: progress.source_id,
                    boat_status: progress.boat_status,
                    rounding_side: progress.rounding_side,
                    mark_type: progress.mark_type,
                    mark_id: progress.mark_id,
                }),
                Message::Chatter {
                    message_type: ANNOUNCEMENT_CHATTER,
                    text: progress.announcement.clone(),
                },
            ],
            RaceEvent::Collision { source_id, kind } => vec![Message::Collision {
                source_id: *source_id,
                kind: *kind,
            }],
            RaceEvent::TokensChanged(tokens) => vec![Message::TokenUpdate {
                tokens: tokens.clone(),
            }],
            RaceEvent::PowerUp {
                source_id,
                event,
                token_type,
            } => vec![Message::PowerUp {
                source_id: *source_id,
                event: *event,
                token_type: *token_type,
            }],
            RaceEvent::Chatter { message_type, text } => vec![Message::Chatter {
                message_type: *message_type,
                text: text.clone(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::course::RoundingSide;
    use shared::protocol::{BoatStatus, MarkType};

    #[test]
    fn test_mark_rounding_carries_race_and_time() {
        let event = RaceEvent::MarkRounded(Progress {
            source_id: 3,
            mark_id: 2,
            mark_type: MarkType::RoundingMark,
            rounding_side: RoundingSide::Port,
            boat_status: BoatStatus::Racing,
            announcement: "Boat 3 passed leg 2".to_string(),
        });

        let messages = event.to_messages(9, 1_234);
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            Message::MarkRounding(rounding) => {
                assert_eq!(rounding.race_id, 9);
                assert_eq!(rounding.time, 1_234);
                assert_eq!(rounding.source_id, 3);
                assert_eq!(rounding.mark_id, 2);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(
            messages[1],
            Message::Chatter {
                message_type: ANNOUNCEMENT_CHATTER,
                text: "Boat 3 passed leg 2".to_string()
            }
        );
    }

    #[test]
    fn test_silent_events() {
        assert!(RaceEvent::StageChanged(RaceStage::Racing).to_messages(1, 0).is_empty());
        assert!(RaceEvent::YachtLeft { source_id: 1 }.to_messages(1, 0).is_empty());
    }

    #[test]
    fn test_collision_message() {
        let event = RaceEvent::Collision {
            source_id: 4,
            kind: CollisionKind::Boundary,
        };
        assert_eq!(
            event.to_messages(1, 0),
            vec![Message::Collision {
                source_id: 4,
                kind: CollisionKind::Boundary
            }]
        );
    }
}
