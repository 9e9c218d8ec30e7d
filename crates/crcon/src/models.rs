//! Wire models for the CRCON REST and log-stream protocols.
//!
//! Every type here round-trips through serde_json; string tags match the
//! upstream transmission format exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Both native (from the game server) and synthetic (created by CRCON) log types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogMessageType {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "ADMIN ANTI-CHEAT")]
    AdminAntiCheat,
    #[serde(rename = "ADMIN BANNED")]
    AdminBanned,
    #[serde(rename = "ADMIN IDLE")]
    AdminIdle,
    #[serde(rename = "ADMIN KICKED")]
    AdminKicked,
    #[serde(rename = "ADMIN MISC")]
    AdminMisc,
    #[serde(rename = "ADMIN PERMA BANNED")]
    AdminPermaBanned,
    #[serde(rename = "CHAT[Allies]")]
    AlliesChat,
    #[serde(rename = "CHAT[Allies][Team]")]
    AlliesTeamChat,
    #[serde(rename = "CHAT[Allies][Unit]")]
    AlliesUnitChat,
    #[serde(rename = "CHAT[Axis]")]
    AxisChat,
    #[serde(rename = "CHAT[Axis][Team]")]
    AxisTeamChat,
    #[serde(rename = "CHAT[Axis][Unit]")]
    AxisUnitChat,
    #[serde(rename = "CAMERA")]
    Camera,
    #[serde(rename = "CHAT")]
    Chat,
    #[serde(rename = "CONNECTED")]
    Connected,
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
    #[serde(rename = "KILL")]
    Kill,
    #[serde(rename = "MATCH")]
    Match,
    #[serde(rename = "MATCH ENDED")]
    MatchEnd,
    #[serde(rename = "MATCH START")]
    MatchStart,
    #[serde(rename = "MESSAGE")]
    Message,
    #[serde(rename = "TEAM KILL")]
    TeamKill,
    #[serde(rename = "TEAMSWITCH")]
    TeamSwitch,
    /// Automatic kicks for team kills.
    #[serde(rename = "TK")]
    Tk,
    #[serde(rename = "TK AUTO")]
    TkAuto,
    #[serde(rename = "TK AUTO BANNED")]
    TkAutoBanned,
    #[serde(rename = "TK AUTO KICKED")]
    TkAutoKicked,
    /// Vote kicks.
    #[serde(rename = "VOTE")]
    Vote,
    #[serde(rename = "VOTE COMPLETED")]
    VoteCompleted,
    #[serde(rename = "VOTE EXPIRED")]
    VoteExpired,
    #[serde(rename = "VOTE PASSED")]
    VotePassed,
    #[serde(rename = "VOTE STARTED")]
    VoteStarted,
}

/// One structured line from the game-server log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredLogLine {
    pub version: i64,
    pub timestamp_ms: i64,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub relative_time_ms: Option<f64>,
    pub raw: String,
    #[serde(default)]
    pub line_without_time: Option<String>,
    pub action: LogMessageType,
    #[serde(default)]
    pub player_name_1: Option<String>,
    #[serde(default)]
    pub player_id_1: Option<String>,
    #[serde(default)]
    pub player_name_2: Option<String>,
    #[serde(default)]
    pub player_id_2: Option<String>,
    #[serde(default)]
    pub weapon: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sub_content: Option<String>,
}

/// A log line plus its stream cursor.
///
/// `id` is a redis stream id, by default the unix timestamp of when the
/// element was added with a 0-indexed sequence number for entries sharing a
/// timestamp, e.g. "1526919030474-0". Opaque to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStreamObject {
    pub id: Option<String>,
    pub log: StructuredLogLine,
}

/// One websocket frame body pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStreamResponse {
    #[serde(default)]
    pub logs: Vec<LogStreamObject>,
    #[serde(default)]
    pub last_seen_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The init frame the client sends immediately after connecting.
///
/// `last_seen_id` is always serialized, null included, mirroring the
/// upstream contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStreamInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<LogMessageType>>,
    pub last_seen_id: Option<String>,
}

/// The standard wrapper for the result of an API call. The payload, if any,
/// is in `result`; void operations carry a JSON null there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub command: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
    pub failed: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Team {
    Allies,
    Axis,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    Dawn,
    #[default]
    Day,
    Dusk,
    Night,
    Overcast,
    Rain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameMode {
    Warfare,
    Offensive,
    Control,
    Phased,
    Majority,
}

impl GameMode {
    /// Warfare and offensive run on the large layout.
    pub fn is_large(self) -> bool {
        matches!(self, GameMode::Warfare | GameMode::Offensive)
    }

    /// Control, phased and majority make up the skirmish family.
    pub fn is_small(self) -> bool {
        matches!(self, GameMode::Control | GameMode::Phased | GameMode::Majority)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faction {
    pub name: String,
    pub team: Team,
}

/// The underlying terrain; many layers share one map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMap {
    pub id: String,
    pub name: String,
    pub tag: String,
    pub pretty_name: String,
    pub shortname: String,
    pub allies: Faction,
    pub axis: Faction,
    pub orientation: Orientation,
}

/// One specific playable variant: map + mode + environment + attacker side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub map: GameMap,
    pub game_mode: GameMode,
    #[serde(default)]
    pub attackers: Option<Team>,
    #[serde(default)]
    pub environment: Environment,
    pub pretty_name: String,
    pub image_name: String,
}

/// Snapshot of the live game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub map: Layer,
    pub current_players: u32,
    pub max_players: u32,
    pub short_name: String,
    pub server_number: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultMethod {
    #[default]
    #[serde(rename = "least_played_from_suggestions")]
    LeastPlayedSuggestions,
    #[serde(rename = "least_played_from_all_map")]
    LeastPlayedAllMaps,
    #[serde(rename = "random_from_suggestions")]
    RandomSuggestions,
    #[serde(rename = "random_from_all_maps")]
    RandomAllMaps,
}

/// The upstream vote-map policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteMapUserConfig {
    pub enabled: bool,
    pub default_method: DefaultMethod,
    pub number_last_played_to_exclude: u32,
    pub num_warfare_options: u32,
    pub num_offensive_options: u32,
    pub num_skirmish_control_options: u32,
    pub consider_offensive_same_map: bool,
    pub consider_skirmishes_as_same_map: bool,
    pub allow_consecutive_offensives: bool,
    pub allow_consecutive_offensives_opposite_sides: bool,
    pub allow_default_to_offensive: bool,
    pub allow_consecutive_skirmishes: bool,
    pub allow_default_to_skirmish: bool,
    pub instruction_text: String,
    pub thank_you_text: Option<String>,
    pub no_vote_text: String,
    pub reminder_frequency_minutes: u32,
    pub allow_opt_out: bool,
    pub help_text: Option<String>,
}

impl Default for VoteMapUserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_method: DefaultMethod::default(),
            number_last_played_to_exclude: 3,
            num_warfare_options: 4,
            num_offensive_options: 2,
            num_skirmish_control_options: 1,
            consider_offensive_same_map: true,
            consider_skirmishes_as_same_map: true,
            allow_consecutive_offensives: true,
            allow_consecutive_offensives_opposite_sides: false,
            allow_default_to_offensive: false,
            allow_consecutive_skirmishes: false,
            allow_default_to_skirmish: false,
            instruction_text: String::new(),
            thank_you_text: None,
            no_vote_text: String::new(),
            reminder_frequency_minutes: 20,
            allow_opt_out: true,
            help_text: None,
        }
    }
}

/// POST body for `api/set_votemap_whitelist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteMapWhitelistBody {
    pub map_names: Vec<String>,
}

/// POST body for `api/message_player`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePlayerBody {
    pub player_id: String,
    pub message: String,
}
