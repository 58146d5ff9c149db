//! Wire format of the live session protocol.
//!
//! Every frame is a JSON array `[command, params]`. [`Command`] is the closed
//! set of commands the relay carries; each variant owns a typed payload and
//! all validation of untyped JSON happens in [`Command::from_parts`].
//!
//! `"direct"` is a meta-command understood by the relay: its params map
//! recipient identities (or `"host"`) to nested `[command, params]` frames,
//! and the relay delivers each nested frame only to its recipient.

use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{Result, SessionError};
use crate::state::{Edition, Identity, Nomination, Role, Timer};

// ── Seat slots ──────────────────────────────────────────────────────

/// A seat index that may be empty. Encoded as `-1` when empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeatSlot(pub Option<usize>);

impl SeatSlot {
    pub const EMPTY: Self = Self(None);

    pub fn seat(index: usize) -> Self {
        Self(Some(index))
    }
}

impl Serialize for SeatSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Some(seat) => serializer.serialize_u64(seat as u64),
            None => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for SeatSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<i64>::deserialize(deserializer)?;
        match raw {
            Some(value) if value >= 0 => usize::try_from(value)
                .map(|seat| Self(Some(seat)))
                .map_err(D::Error::custom),
            _ => Ok(Self(None)),
        }
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// The public projection of a player: what spectators may know.
///
/// `role_id` is present only for travelers, whose characters are public.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProjection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: Identity,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub vote_token: bool,
    #[serde(default)]
    pub pronouns: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
}

/// Payload of `edition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EditionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<Edition>,
    /// Character list of a custom script; absent for official editions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
}

/// Payload of `gs`: a roster snapshot, plus the game flags unless
/// `is_lightweight` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GamestatePayload {
    pub gamestate: Vec<PlayerProjection>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_lightweight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_night: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ringing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_rooster: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_vote_history_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_organ_vote_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomination: Option<Nomination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_speed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_vote: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_vote_in_progress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_player: Option<SeatSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabled: Option<Vec<Role>>,
    /// Only sent while a nomination is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<Vec<Option<bool>>>,
}

/// A single replicated player property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerField {
    Name(String),
    Id(Identity),
    IsDead(bool),
    VoteToken(bool),
    Pronouns(String),
    /// Character id; empty when a traveler stops being one.
    Role(String),
}

impl PlayerField {
    pub fn property(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Id(_) => "id",
            Self::IsDead(_) => "isDead",
            Self::VoteToken(_) => "voteToken",
            Self::Pronouns(_) => "pronouns",
            Self::Role(_) => "role",
        }
    }

    fn value(&self) -> Value {
        match self {
            Self::Name(v) | Self::Id(v) | Self::Pronouns(v) | Self::Role(v) => json!(v),
            Self::IsDead(v) | Self::VoteToken(v) => json!(v),
        }
    }

    fn from_parts(property: &str, value: Value) -> Result<Self> {
        Ok(match property {
            "name" => Self::Name(string_or_empty(value)?),
            "id" => Self::Id(string_or_empty(value)?),
            "isDead" => Self::IsDead(truthy(&value)),
            "voteToken" => Self::VoteToken(truthy(&value)),
            "pronouns" => Self::Pronouns(string_or_empty(value)?),
            "role" => Self::Role(string_or_empty(value)?),
            other => {
                return Err(SessionError::Decode(format!(
                    "unknown player property {other:?}"
                )))
            }
        })
    }
}

/// Payload of `player`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerUpdate {
    pub index: usize,
    pub field: PlayerField,
}

/// Who sent a `ping`: a spectator sends its identity, the host sends the
/// number of participants it currently sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingSubject {
    Identity(Identity),
    Count(usize),
}

/// Payload of `ping`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub subject: PingSubject,
    /// Round-trip latency in milliseconds, when known.
    pub latency: Option<u64>,
}

/// Payload of `vote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteMessage {
    pub seat: usize,
    /// `None` flips the current value.
    pub vote: Option<bool>,
    pub from_host: bool,
}

/// Payload of `lock`: the new lock counter and the vote at the newly locked
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockMessage {
    pub locked_vote: usize,
    pub vote: Option<bool>,
}

// ── Commands ────────────────────────────────────────────────────────

/// Every command of the live session protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Spectator asks the host for a full snapshot.
    GetGamestate(Identity),
    Edition(EditionPayload),
    Fabled(Vec<Role>),
    /// `gs`
    Gamestate(Box<GamestatePayload>),
    Player(PlayerUpdate),
    /// Spectator asks to sit in a seat, or to leave its seat.
    Claim { seat: SeatSlot, identity: Identity },
    Ping(Ping),
    /// `None` ends the current nomination.
    Nomination(Option<Nomination>),
    Swap(usize, usize),
    Move(usize, usize),
    Remove(usize),
    Marked(SeatSlot),
    IsNight(bool),
    IsOrganVoteMode(bool),
    IsRinging(bool),
    IsRooster(bool),
    SetTimer(Timer),
    IsVoteHistoryAllowed(bool),
    VotingSpeed(u64),
    ClearVoteHistory,
    IsVoteInProgress(bool),
    Vote(VoteMessage),
    Lock(LockMessage),
    /// Spectator leaves the channel.
    Bye(Identity),
    Pronouns { seat: usize, pronouns: String },
    /// Per-recipient fan-out performed by the relay.
    Direct(BTreeMap<String, Command>),
}

impl Command {
    /// Wrap `command` so that the relay delivers it to `target` only.
    pub fn direct(target: impl Into<String>, command: Command) -> Self {
        let mut recipients = BTreeMap::new();
        recipients.insert(target.into(), command);
        Self::Direct(recipients)
    }

    /// The command name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetGamestate(_) => "getGamestate",
            Self::Edition(_) => "edition",
            Self::Fabled(_) => "fabled",
            Self::Gamestate(_) => "gs",
            Self::Player(_) => "player",
            Self::Claim { .. } => "claim",
            Self::Ping(_) => "ping",
            Self::Nomination(_) => "nomination",
            Self::Swap(..) => "swap",
            Self::Move(..) => "move",
            Self::Remove(_) => "remove",
            Self::Marked(_) => "marked",
            Self::IsNight(_) => "isNight",
            Self::IsOrganVoteMode(_) => "isOrganVoteMode",
            Self::IsRinging(_) => "isRinging",
            Self::IsRooster(_) => "isRooster",
            Self::SetTimer(_) => "setTimer",
            Self::IsVoteHistoryAllowed(_) => "isVoteHistoryAllowed",
            Self::VotingSpeed(_) => "votingSpeed",
            Self::ClearVoteHistory => "clearVoteHistory",
            Self::IsVoteInProgress(_) => "isVoteInProgress",
            Self::Vote(_) => "vote",
            Self::Lock(_) => "lock",
            Self::Bye(_) => "bye",
            Self::Pronouns { .. } => "pronouns",
            Self::Direct(_) => "direct",
        }
    }

    /// The params element of the frame.
    pub fn params(&self) -> Result<Value> {
        Ok(match self {
            Self::GetGamestate(identity) | Self::Bye(identity) => json!(identity),
            Self::Edition(payload) => serde_json::to_value(payload)?,
            Self::Fabled(fabled) => serde_json::to_value(fabled)?,
            Self::Gamestate(payload) => serde_json::to_value(payload)?,
            Self::Player(update) => json!({
                "index": update.index,
                "property": update.field.property(),
                "value": update.field.value(),
            }),
            Self::Claim { seat, identity } => json!([seat, identity]),
            Self::Ping(ping) => {
                let subject = match &ping.subject {
                    PingSubject::Identity(identity) => json!(identity),
                    PingSubject::Count(count) => json!(count),
                };
                json!([subject, ping.latency])
            }
            Self::Nomination(nomination) => serde_json::to_value(nomination)?,
            Self::Swap(from, to) | Self::Move(from, to) => json!([from, to]),
            Self::Remove(index) => json!(index),
            Self::Marked(seat) => json!(seat),
            Self::IsNight(flag)
            | Self::IsOrganVoteMode(flag)
            | Self::IsRinging(flag)
            | Self::IsRooster(flag)
            | Self::IsVoteHistoryAllowed(flag)
            | Self::IsVoteInProgress(flag) => json!(flag),
            Self::SetTimer(timer) => serde_json::to_value(timer)?,
            Self::VotingSpeed(speed) => json!(speed),
            Self::ClearVoteHistory => Value::Null,
            Self::Vote(vote) => json!([vote.seat, vote.vote, vote.from_host]),
            Self::Lock(lock) => json!([lock.locked_vote, lock.vote]),
            Self::Pronouns { seat, pronouns } => json!([seat, pronouns]),
            Self::Direct(recipients) => serde_json::to_value(recipients)?,
        })
    }

    /// Build a command from its wire name and params, validating the payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] for unknown commands or payloads of the
    /// wrong shape, [`SessionError::Serialization`] when a typed payload fails
    /// to deserialize.
    pub fn from_parts(name: &str, params: Value) -> Result<Self> {
        Ok(match name {
            "getGamestate" => Self::GetGamestate(string_or_empty(params)?),
            "edition" => Self::Edition(serde_json::from_value(params)?),
            "fabled" => Self::Fabled(serde_json::from_value(params)?),
            "gs" => Self::Gamestate(Box::new(serde_json::from_value(params)?)),
            "player" => {
                let mut object = match params {
                    Value::Object(object) => object,
                    other => {
                        return Err(SessionError::Decode(format!(
                            "player params must be an object, got {other}"
                        )))
                    }
                };
                let index = serde_json::from_value(object.remove("index").unwrap_or(Value::Null))?;
                let property: String =
                    serde_json::from_value(object.remove("property").unwrap_or(Value::Null))?;
                let value = object.remove("value").unwrap_or(Value::Null);
                Self::Player(PlayerUpdate {
                    index,
                    field: PlayerField::from_parts(&property, value)?,
                })
            }
            "claim" => {
                let mut items = elements(params, name)?;
                Self::Claim {
                    seat: take(&mut items)?,
                    identity: string_or_empty(items.next().unwrap_or(Value::Null))?,
                }
            }
            "ping" => {
                let mut items = match params {
                    Value::Null => Vec::new().into_iter(),
                    other => elements(other, name)?,
                };
                let subject = match items.next().unwrap_or(Value::Null) {
                    Value::String(identity) => PingSubject::Identity(identity),
                    other => PingSubject::Count(
                        other.as_u64().and_then(|n| usize::try_from(n).ok()).unwrap_or(0),
                    ),
                };
                Self::Ping(Ping {
                    subject,
                    latency: items.next().as_ref().and_then(latency_sample),
                })
            }
            "nomination" => Self::Nomination(serde_json::from_value(params)?),
            "swap" | "move" => {
                let (from, to): (usize, usize) = serde_json::from_value(params)?;
                if name == "swap" {
                    Self::Swap(from, to)
                } else {
                    Self::Move(from, to)
                }
            }
            "remove" => Self::Remove(serde_json::from_value(params)?),
            "marked" => Self::Marked(serde_json::from_value(params)?),
            "isNight" => Self::IsNight(truthy(&params)),
            "isOrganVoteMode" => Self::IsOrganVoteMode(truthy(&params)),
            "isRinging" => Self::IsRinging(truthy(&params)),
            "isRooster" => Self::IsRooster(truthy(&params)),
            "setTimer" => Self::SetTimer(serde_json::from_value(params)?),
            "isVoteHistoryAllowed" => Self::IsVoteHistoryAllowed(truthy(&params)),
            "votingSpeed" => Self::VotingSpeed(serde_json::from_value(params)?),
            "clearVoteHistory" => Self::ClearVoteHistory,
            "isVoteInProgress" => Self::IsVoteInProgress(truthy(&params)),
            "vote" => {
                let mut items = elements(params, name)?;
                Self::Vote(VoteMessage {
                    seat: take(&mut items)?,
                    vote: take(&mut items)?,
                    from_host: items.next().as_ref().is_some_and(truthy),
                })
            }
            "lock" => {
                let mut items = elements(params, name)?;
                Self::Lock(LockMessage {
                    locked_vote: take(&mut items)?,
                    vote: take(&mut items)?,
                })
            }
            "bye" => Self::Bye(string_or_empty(params)?),
            "pronouns" => {
                let mut items = elements(params, name)?;
                Self::Pronouns {
                    seat: take(&mut items)?,
                    pronouns: string_or_empty(items.next().unwrap_or(Value::Null))?,
                }
            }
            "direct" => Self::Direct(serde_json::from_value(params)?),
            other => return Err(SessionError::Decode(format!("unknown command {other:?}"))),
        })
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&(self.name(), self.params()?))?)
    }

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Fails if the text is not a `[command, params]` pair or the params do
    /// not match the command.
    pub fn decode(text: &str) -> Result<Self> {
        let (name, params): (String, Value) = serde_json::from_str(text)?;
        Self::from_parts(&name, params)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let params = self.params().map_err(serde::ser::Error::custom)?;
        (self.name(), params).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (name, params) = <(String, Value)>::deserialize(deserializer)?;
        Self::from_parts(&name, params).map_err(D::Error::custom)
    }
}

// ── Decoding helpers ────────────────────────────────────────────────

/// JavaScript truthiness, as the flags were produced by `!!value`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_or_empty(value: Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        other => Err(SessionError::Decode(format!("expected a string, got {other}"))),
    }
}

/// A latency sample may arrive as a number or a numeric string.
fn latency_sample(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn elements(params: Value, name: &str) -> Result<std::vec::IntoIter<Value>> {
    match params {
        Value::Array(items) => Ok(items.into_iter()),
        other => Err(SessionError::Decode(format!(
            "{name} params must be an array, got {other}"
        ))),
    }
}

/// Next array element; a missing element reads as `null`.
fn take<T: DeserializeOwned>(items: &mut std::vec::IntoIter<Value>) -> Result<T> {
    Ok(serde_json::from_value(items.next().unwrap_or(Value::Null))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn seat_slot_encodes_empty_as_minus_one() {
        assert_eq!(serde_json::to_string(&SeatSlot::EMPTY).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&SeatSlot::seat(3)).unwrap(), "3");
        let empty: SeatSlot = serde_json::from_str("-1").unwrap();
        assert_eq!(empty, SeatSlot::EMPTY);
        let null: SeatSlot = serde_json::from_str("null").unwrap();
        assert_eq!(null, SeatSlot::EMPTY);
    }

    #[test]
    fn direct_wraps_nested_frame() {
        let cmd = Command::direct("host", Command::GetGamestate("abc".into()));
        assert_eq!(
            cmd.encode().unwrap(),
            r#"["direct",{"host":["getGamestate","abc"]}]"#
        );
    }

    #[test]
    fn player_update_uses_property_and_value() {
        let cmd = Command::Player(PlayerUpdate {
            index: 2,
            field: PlayerField::IsDead(true),
        });
        let value: Value = serde_json::from_str(&cmd.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!(["player", { "index": 2, "property": "isDead", "value": true }])
        );
    }

    #[test]
    fn unknown_player_property_is_a_decode_error() {
        let err = Command::decode(r#"["player",{"index":0,"property":"reminders","value":[]}]"#)
            .unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[test]
    fn ping_accepts_identity_or_count_and_lenient_latency() {
        let Command::Ping(ping) = Command::decode(r#"["ping",["abc","42"]]"#).unwrap() else {
            panic!("expected ping");
        };
        assert_eq!(ping.subject, PingSubject::Identity("abc".into()));
        assert_eq!(ping.latency, Some(42));

        let Command::Ping(ping) = Command::decode(r#"["ping",[3,"latency"]]"#).unwrap() else {
            panic!("expected ping");
        };
        assert_eq!(ping.subject, PingSubject::Count(3));
        assert_eq!(ping.latency, None);
    }

    #[test]
    fn vote_null_means_toggle() {
        let Command::Vote(vote) = Command::decode(r#"["vote",[4,null,false]]"#).unwrap() else {
            panic!("expected vote");
        };
        assert_eq!(vote.seat, 4);
        assert_eq!(vote.vote, None);
        assert!(!vote.from_host);
    }

    #[test]
    fn flags_decode_with_truthiness() {
        assert_eq!(
            Command::decode(r#"["isNight",null]"#).unwrap(),
            Command::IsNight(false)
        );
        assert_eq!(
            Command::decode(r#"["isRinging",1]"#).unwrap(),
            Command::IsRinging(true)
        );
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(Command::decode("not json").is_err());
        assert!(Command::decode(r#"{"command":"ping"}"#).is_err());
        assert!(matches!(
            Command::decode(r#"["teleport",{}]"#),
            Err(SessionError::Decode(_))
        ));
        assert!(Command::decode(r#"["swap",[1]]"#).is_err());
    }

    #[test]
    fn lightweight_gamestate_omits_game_flags() {
        let payload = GamestatePayload {
            gamestate: vec![PlayerProjection {
                name: "Ann".into(),
                ..PlayerProjection::default()
            }],
            is_lightweight: true,
            ..GamestatePayload::default()
        };
        let value = Command::Gamestate(Box::new(payload)).params().unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("gamestate"));
        assert!(object.contains_key("isLightweight"));
        assert!(!object.contains_key("isNight"));
        assert!(!object.contains_key("votes"));
    }

    #[test]
    fn nested_direct_frames_decode() {
        let text = r#"["direct",{"p1":["player",{"index":0,"property":"role","value":"imp"}]}]"#;
        let Command::Direct(recipients) = Command::decode(text).unwrap() else {
            panic!("expected direct");
        };
        assert_eq!(
            recipients.get("p1"),
            Some(&Command::Player(PlayerUpdate {
                index: 0,
                field: PlayerField::Role("imp".into()),
            }))
        );
    }
}
