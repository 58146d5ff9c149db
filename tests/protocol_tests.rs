#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire format tests for the live session protocol.
//!
//! Frames are compared as JSON values so that key order does not matter.
//! The fixtures are shaped like what existing clients put on the relay.

use grimoire_live::protocol::{
    Command, EditionPayload, GamestatePayload, LockMessage, Ping, PingSubject, PlayerField,
    PlayerProjection, PlayerUpdate, SeatSlot, VoteMessage,
};
use grimoire_live::state::{Edition, Nomination, Role, SeatRef, SpecialVote, Team, Timer};
use grimoire_live::SessionError;
use serde_json::{json, Value};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn frame(command: &Command) -> Value {
    serde_json::from_str(&command.encode().expect("encode")).expect("frame is JSON")
}

fn decode(value: Value) -> Command {
    Command::decode(&value.to_string()).expect("decode")
}

// ════════════════════════════════════════════════════════════════════
// Encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn claim_encodes_seat_then_identity() {
    let claim = Command::Claim {
        seat: SeatSlot::seat(3),
        identity: "p-1".into(),
    };
    assert_eq!(frame(&claim), json!(["claim", [3, "p-1"]]));

    let leave = Command::Claim {
        seat: SeatSlot::EMPTY,
        identity: "p-1".into(),
    };
    assert_eq!(frame(&leave), json!(["claim", [-1, "p-1"]]));
}

#[test]
fn pings_from_each_side() {
    let spectator = Command::Ping(Ping {
        subject: PingSubject::Identity("p-1".into()),
        latency: None,
    });
    assert_eq!(frame(&spectator), json!(["ping", ["p-1", null]]));

    let host = Command::Ping(Ping {
        subject: PingSubject::Count(4),
        latency: Some(85),
    });
    assert_eq!(frame(&host), json!(["ping", [4, 85]]));
}

#[test]
fn voting_commands_are_positional() {
    let vote = Command::Vote(VoteMessage {
        seat: 2,
        vote: Some(true),
        from_host: false,
    });
    assert_eq!(frame(&vote), json!(["vote", [2, true, false]]));

    let lock = Command::Lock(LockMessage {
        locked_vote: 3,
        vote: None,
    });
    assert_eq!(frame(&lock), json!(["lock", [3, null]]));

    assert_eq!(
        frame(&Command::ClearVoteHistory),
        json!(["clearVoteHistory", null])
    );
    assert_eq!(frame(&Command::VotingSpeed(1500)), json!(["votingSpeed", 1500]));
}

#[test]
fn nomination_frames() {
    assert_eq!(
        frame(&Command::Nomination(Some(Nomination::standard(1, 2)))),
        json!(["nomination", { "nominator": 1, "nominee": 2 }])
    );
    assert_eq!(frame(&Command::Nomination(None)), json!(["nomination", null]));

    let special = Nomination::special(
        Some(SeatRef::Label("Storyteller".into())),
        None,
        SpecialVote {
            kind: "Bishop".into(),
            timer_text: Some("Discuss".into()),
            debate_text: None,
            button_label: None,
        },
    );
    assert_eq!(
        frame(&Command::Nomination(Some(special))),
        json!(["nomination", {
            "nominator": "Storyteller",
            "nominee": null,
            "specialVote": { "type": "Bishop", "timerText": "Discuss" }
        }])
    );
}

#[test]
fn roster_edits_and_marks() {
    assert_eq!(frame(&Command::Swap(0, 4)), json!(["swap", [0, 4]]));
    assert_eq!(frame(&Command::Move(4, 1)), json!(["move", [4, 1]]));
    assert_eq!(frame(&Command::Remove(2)), json!(["remove", 2]));
    assert_eq!(frame(&Command::Marked(SeatSlot::EMPTY)), json!(["marked", -1]));
    assert_eq!(
        frame(&Command::Pronouns {
            seat: 1,
            pronouns: "they/them".into()
        }),
        json!(["pronouns", [1, "they/them"]])
    );
}

#[test]
fn timer_and_flags() {
    let timer = Command::SetTimer(Timer {
        name: "Day".into(),
        duration: 300,
    });
    assert_eq!(
        frame(&timer),
        json!(["setTimer", { "name": "Day", "duration": 300 }])
    );
    assert_eq!(frame(&Command::IsRooster(true)), json!(["isRooster", true]));
}

#[test]
fn custom_edition_carries_its_roles() {
    let payload = EditionPayload {
        edition: Some(Edition {
            id: "homebrew".into(),
            name: Some("Homebrew".into()),
            ..Edition::default()
        }),
        roles: Some(vec![
            Role::reference("imp"),
            Role {
                id: "wizard".into(),
                name: Some("Wizard".into()),
                team: Some(Team::Townsfolk),
                ability: Some("Once per game, make a wish.".into()),
                ..Role::default()
            },
        ]),
    };
    assert_eq!(
        frame(&Command::Edition(payload)),
        json!(["edition", {
            "edition": { "id": "homebrew", "name": "Homebrew" },
            "roles": [
                { "id": "imp" },
                {
                    "id": "wizard",
                    "name": "Wizard",
                    "team": "townsfolk",
                    "ability": "Once per game, make a wish."
                }
            ]
        }])
    );
}

#[test]
fn official_edition_is_only_an_id() {
    let payload = EditionPayload {
        edition: Some(Edition::reference("tb")),
        roles: None,
    };
    assert_eq!(
        frame(&Command::Edition(payload)),
        json!(["edition", { "edition": { "id": "tb" } }])
    );
}

// ════════════════════════════════════════════════════════════════════
// Decoding fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn full_gamestate_fixture() {
    let command = decode(json!(["gs", {
        "gamestate": [
            { "name": "Ann", "id": "p-1", "isDead": false, "voteToken": false, "pronouns": "" },
            { "name": "Bob", "id": "", "isDead": true, "voteToken": true, "pronouns": "he/him", "roleId": "beggar" }
        ],
        "isNight": true,
        "isRinging": false,
        "isRooster": false,
        "timer": { "name": "", "duration": 0 },
        "isVoteHistoryAllowed": true,
        "isOrganVoteMode": false,
        "nomination": { "nominator": 0, "nominee": 1 },
        "votingSpeed": 1000,
        "lockedVote": 2,
        "isVoteInProgress": true,
        "markedPlayer": -1,
        "fabled": [{ "id": "doomsayer" }],
        "votes": [true, null]
    }]));

    let Command::Gamestate(payload) = command else {
        panic!("expected gs");
    };
    assert!(!payload.is_lightweight);
    assert_eq!(payload.gamestate.len(), 2);
    assert_eq!(payload.gamestate[1].role_id.as_deref(), Some("beggar"));
    assert!(payload.gamestate[1].is_dead);
    assert_eq!(payload.nomination, Some(Nomination::standard(0, 1)));
    assert_eq!(payload.locked_vote, Some(2));
    assert_eq!(payload.marked_player, Some(SeatSlot::EMPTY));
    assert_eq!(payload.fabled, Some(vec![Role::reference("doomsayer")]));
    assert_eq!(payload.votes, Some(vec![Some(true), None]));
}

#[test]
fn lightweight_gamestate_fixture() {
    let command = decode(json!(["gs", {
        "gamestate": [{ "name": "Ann", "id": "", "isDead": false, "voteToken": false, "pronouns": "" }],
        "isLightweight": true
    }]));
    let expected = GamestatePayload {
        gamestate: vec![PlayerProjection {
            name: "Ann".into(),
            ..PlayerProjection::default()
        }],
        is_lightweight: true,
        ..GamestatePayload::default()
    };
    assert_eq!(command, Command::Gamestate(Box::new(expected)));
}

#[test]
fn player_fixture_values() {
    assert_eq!(
        decode(json!(["player", { "index": 3, "property": "name", "value": "Cat" }])),
        Command::Player(PlayerUpdate {
            index: 3,
            field: PlayerField::Name("Cat".into()),
        })
    );
    // a traveler leaving its role sends an empty id
    assert_eq!(
        decode(json!(["player", { "index": 0, "property": "role", "value": "" }])),
        Command::Player(PlayerUpdate {
            index: 0,
            field: PlayerField::Role(String::new()),
        })
    );
    assert_eq!(
        decode(json!(["player", { "index": 1, "property": "voteToken", "value": 0 }])),
        Command::Player(PlayerUpdate {
            index: 1,
            field: PlayerField::VoteToken(false),
        })
    );
}

#[test]
fn host_vote_and_toggle_fixtures() {
    assert_eq!(
        decode(json!(["vote", [0, false, true]])),
        Command::Vote(VoteMessage {
            seat: 0,
            vote: Some(false),
            from_host: true,
        })
    );
    // older clients omit the host flag
    assert_eq!(
        decode(json!(["vote", [5, null]])),
        Command::Vote(VoteMessage {
            seat: 5,
            vote: None,
            from_host: false,
        })
    );
}

#[test]
fn flags_accept_any_truthy_value() {
    assert_eq!(decode(json!(["isNight", 1])), Command::IsNight(true));
    assert_eq!(decode(json!(["isNight", 0])), Command::IsNight(false));
    assert_eq!(
        decode(json!(["isOrganVoteMode", "yes"])),
        Command::IsOrganVoteMode(true)
    );
    assert_eq!(
        decode(json!(["isVoteInProgress", null])),
        Command::IsVoteInProgress(false)
    );
}

#[test]
fn ping_without_params_counts_nobody() {
    assert_eq!(
        decode(json!(["ping", null])),
        Command::Ping(Ping {
            subject: PingSubject::Count(0),
            latency: None,
        })
    );
}

#[test]
fn role_distribution_envelope() {
    let command = decode(json!(["direct", {
        "p-1": ["player", { "index": 0, "property": "role", "value": "imp" }],
        "p-2": ["player", { "index": 1, "property": "role", "value": "chef" }]
    }]));
    let Command::Direct(recipients) = command else {
        panic!("expected direct");
    };
    assert_eq!(recipients.len(), 2);
    assert_eq!(
        recipients["p-2"],
        Command::Player(PlayerUpdate {
            index: 1,
            field: PlayerField::Role("chef".into()),
        })
    );
}

// ════════════════════════════════════════════════════════════════════
// Malformed frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_commands_are_decode_errors() {
    let err = Command::decode(r#"["kick","p-1"]"#).unwrap_err();
    assert!(matches!(err, SessionError::Decode(message) if message.contains("kick")));
}

#[test]
fn wrong_shapes_are_rejected() {
    for text in [
        r#"["claim","p-1"]"#,
        r#"["vote",{"seat":1}]"#,
        r#"["player",[0,"name","x"]]"#,
        r#"["remove","two"]"#,
        r#"["getGamestate",42]"#,
        r#"["gs",{"isNight":true}]"#,
        r#"["direct",{"p-1":["noSuchCommand",null]}]"#,
        r#"["ping"]"#,
        "[]",
    ] {
        assert!(Command::decode(text).is_err(), "{text} should not decode");
    }
}

#[test]
fn serde_impls_match_frames() {
    let command = Command::direct("host", Command::Bye("p-1".into()));
    let value = serde_json::to_value(&command).unwrap();
    assert_eq!(value, json!(["direct", { "host": ["bye", "p-1"] }]));
    let back: Command = serde_json::from_value(value).unwrap();
    assert_eq!(back, command);
}
