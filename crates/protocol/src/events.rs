//! Signaling-Events (TCP, JSON)
//!
//! Definiert alle Events, die ueber die Signaling-Verbindung zwischen Client
//! und Server laufen.
//!
//! ## Design
//! - Umschlag: `{"event": "<name>", "data": {...}}` (adjacently tagged)
//! - Event-Namen in kebab-case, Feldnamen in camelCase
//! - Relay-Payloads (`offer`, `answer`, `candidate`) und freie Zusatzdaten
//!   bleiben `serde_json::Value` und werden nie inspiziert

use raumzeit_core::{FehlerKategorie, Position, RaumzeitError, RoomId, Rotation, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Freie Benutzerdaten (username, avatarColor, capabilities, ...)
///
/// Wird beim Aktualisieren flach zusammengefuehrt.
pub type UserData = serde_json::Map<String, Value>;

/// Faehigkeiten, die der Server bei der Registrierung meldet
pub const SERVER_CAPABILITIES: &[&str] = &[
    "webrtc",
    "spatial-updates",
    "device-sharing",
    "chat",
    "user-actions",
    "device-discovery",
];

// ---------------------------------------------------------------------------
// Raum-Konfiguration
// ---------------------------------------------------------------------------

/// Schalter eines Raums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub device_sharing: bool,
    pub screen_share: bool,
    pub spatial_audio: bool,
    pub recording: bool,
    pub require_auth: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            device_sharing: true,
            screen_share: true,
            spatial_audio: true,
            recording: false,
            require_auth: false,
        }
    }
}

/// Teil-Aktualisierung der Schalter (nur gesetzte Felder werden uebernommen)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettingsPatch {
    pub device_sharing: Option<bool>,
    pub screen_share: Option<bool>,
    pub spatial_audio: Option<bool>,
    pub recording: Option<bool>,
    pub require_auth: Option<bool>,
}

impl RoomSettings {
    /// Uebernimmt alle gesetzten Felder aus dem Patch
    pub fn anwenden(&mut self, patch: &RoomSettingsPatch) {
        if let Some(v) = patch.device_sharing {
            self.device_sharing = v;
        }
        if let Some(v) = patch.screen_share {
            self.screen_share = v;
        }
        if let Some(v) = patch.spatial_audio {
            self.spatial_audio = v;
        }
        if let Some(v) = patch.recording {
            self.recording = v;
        }
        if let Some(v) = patch.require_auth {
            self.require_auth = v;
        }
    }
}

/// Optionen beim Erstellen oder Bearbeiten eines Raums (`roomData`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptions {
    pub is_public: Option<bool>,
    pub max_users: Option<usize>,
    pub settings: Option<RoomSettingsPatch>,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Zaehler eines Raums
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub messages_relayed: u64,
    pub peak_users: usize,
    pub total_joins: u64,
}

/// Vollstaendiger Raum-Snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: RoomId,
    pub creator_id: UserId,
    pub is_public: bool,
    pub max_users: usize,
    pub user_count: usize,
    pub created_at: u64,
    pub last_activity: u64,
    pub settings: RoomSettings,
    pub stats: RoomStats,
}

/// Kurzform fuer Raum-Listen im Inventar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub user_count: usize,
    pub created_at: u64,
    pub is_public: bool,
}

impl From<&RoomInfo> for RoomSummary {
    fn from(info: &RoomInfo) -> Self {
        Self {
            id: info.id.clone(),
            user_count: info.user_count,
            created_at: info.created_at,
            is_public: info.is_public,
        }
    }
}

/// Snapshot einer Mitgliedschaft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub user_id: UserId,
    pub username: String,
    pub avatar_color: String,
    pub capabilities: Vec<String>,
    pub joined_at: u64,
    pub last_seen: u64,
    pub position: Position,
    pub rotation: Rotation,
    pub messages_sent: u64,
}

/// Raum plus aktuelle Mitglieder (Antwort auf create/join)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomInfo,
    pub users: Vec<MemberInfo>,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Registrierung der Identitaet
///
/// `userId` bleibt roh, damit auch Nicht-Strings als `INVALID_IDENTITY`
/// beantwortet werden statt als Protokollfehler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub user_id: Value,
    pub user_data: Option<UserData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_id: String,
    pub room_data: Option<RoomOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: String,
    pub user_data: Option<UserData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub to: String,
    pub offer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub to: String,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub to: String,
    pub candidate: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialUpdateRequest {
    pub position: Position,
    pub rotation: Rotation,
    pub spatial_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdateRequest {
    pub devices: Value,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionRequest {
    pub action: String,
    pub target_user_id: Option<String>,
    pub action_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickUserRequest {
    pub target_user_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRoomSettingsRequest {
    pub settings: RoomOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteRoomRequest {
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserDataRequest {
    pub user_data: UserData,
}

/// Keepalive in beide Richtungen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp: u64,
}

/// Alle Events vom Client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Register(RegisterRequest),
    CreateRoom(CreateRoomRequest),
    JoinRoom(JoinRoomRequest),
    LeaveRoom(LeaveRoomRequest),
    Offer(OfferRequest),
    Answer(AnswerRequest),
    IceCandidate(IceCandidateRequest),
    SpatialUpdate(SpatialUpdateRequest),
    DeviceUpdate(DeviceUpdateRequest),
    ChatMessage(ChatMessageRequest),
    UserAction(UserActionRequest),
    KickUser(KickUserRequest),
    UpdateRoomSettings(UpdateRoomSettingsRequest),
    DeleteRoom(DeleteRoomRequest),
    UpdateUserData(UpdateUserDataRequest),
    Ping(PingMessage),
    Pong(PingMessage),
}

impl ClientEvent {
    /// Wire-Name des Events (fuer Logs und Fehler-Antworten)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::CreateRoom(_) => "create-room",
            Self::JoinRoom(_) => "join-room",
            Self::LeaveRoom(_) => "leave-room",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::SpatialUpdate(_) => "spatial-update",
            Self::DeviceUpdate(_) => "device-update",
            Self::ChatMessage(_) => "chat-message",
            Self::UserAction(_) => "user-action",
            Self::KickUser(_) => "kick-user",
            Self::UpdateRoomSettings(_) => "update-room-settings",
            Self::DeleteRoom(_) => "delete-room",
            Self::UpdateUserData(_) => "update-user-data",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredEvent {
    pub user_id: UserId,
    pub capabilities: Vec<String>,
    pub server_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeftEvent {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedEvent {
    pub room_id: RoomId,
    pub user: MemberInfo,
}

/// Grund fuer das Verlassen eines Raums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaveReason {
    Left,
    Switched,
    Disconnected,
    Kicked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftEvent {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub reason: LeaveReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedOffer {
    pub from: UserId,
    pub offer: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedAnswer {
    pub from: UserId,
    pub answer: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedCandidate {
    pub from: UserId,
    pub candidate: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialUpdateEvent {
    pub user_id: UserId,
    pub position: Position,
    pub rotation: Rotation,
    pub spatial_data: Option<Value>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdateEvent {
    pub user_id: UserId,
    pub devices: Value,
    pub action: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageEvent {
    pub id: String,
    pub user_id: UserId,
    pub username: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: u64,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionEvent {
    pub user_id: UserId,
    pub action: String,
    pub target_user_id: Option<String>,
    pub action_data: Option<Value>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdatedEvent {
    pub room_id: RoomId,
    pub user: MemberInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdatedEvent {
    pub room: RoomInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDeletedEvent {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickedEvent {
    pub room_id: RoomId,
    pub by: UserId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    /// Originaler Timestamp aus dem Ping
    pub timestamp: u64,
    pub server_time: u64,
}

/// Standardisierte Fehler-Antwort (geht nur an den Ausloeser)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub category: FehlerKategorie,
    pub message: String,
    /// Event, das den Fehler ausgeloest hat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl ErrorPayload {
    /// Baut die Fehler-Antwort aus einem fachlichen Fehler
    pub fn aus_fehler(fehler: &RaumzeitError, event: Option<&str>) -> Self {
        Self {
            code: fehler.code().to_string(),
            category: fehler.kategorie(),
            message: fehler.to_string(),
            event: event.map(str::to_string),
        }
    }

    /// Nicht lesbares Event (JSON passt nicht zum Schema)
    pub fn ungueltige_nachricht(grund: impl Into<String>) -> Self {
        Self {
            code: "INVALID_MESSAGE".to_string(),
            category: FehlerKategorie::Validation,
            message: grund.into(),
            event: None,
        }
    }
}

/// Alle Events vom Server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Registered(RegisteredEvent),
    RoomCreated(RoomSnapshot),
    RoomJoined(RoomSnapshot),
    RoomLeft(RoomLeftEvent),
    UserJoinedRoom(UserJoinedEvent),
    UserLeftRoom(UserLeftEvent),
    Offer(RelayedOffer),
    Answer(RelayedAnswer),
    IceCandidate(RelayedCandidate),
    SpatialUpdate(SpatialUpdateEvent),
    DeviceUpdate(DeviceUpdateEvent),
    ChatMessage(ChatMessageEvent),
    UserAction(UserActionEvent),
    UserUpdated(UserUpdatedEvent),
    RoomUpdated(RoomUpdatedEvent),
    RoomDeleted(RoomDeletedEvent),
    Kicked(KickedEvent),
    Ping(PingMessage),
    Pong(PongMessage),
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Fehler-Event aus einem fachlichen Fehler
    pub fn fehler(fehler: &RaumzeitError, event: Option<&str>) -> Self {
        Self::Error(ErrorPayload::aus_fehler(fehler, event))
    }

    /// Wire-Name des Events
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered(_) => "registered",
            Self::RoomCreated(_) => "room-created",
            Self::RoomJoined(_) => "room-joined",
            Self::RoomLeft(_) => "room-left",
            Self::UserJoinedRoom(_) => "user-joined-room",
            Self::UserLeftRoom(_) => "user-left-room",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::SpatialUpdate(_) => "spatial-update",
            Self::DeviceUpdate(_) => "device-update",
            Self::ChatMessage(_) => "chat-message",
            Self::UserAction(_) => "user-action",
            Self::UserUpdated(_) => "user-updated",
            Self::RoomUpdated(_) => "room-updated",
            Self::RoomDeleted(_) => "room-deleted",
            Self::Kicked(_) => "kicked",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
