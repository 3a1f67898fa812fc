//! raumzeit-protocol – Event-Definitionen und Wire-Format
//!
//! Dieses Crate definiert alle Events, die zwischen Client und Server
//! ausgetauscht werden. Event-Namen und Feldnamen sind Teil der
//! Kompatibilitaetsschnittstelle zum Render-Client und duerfen sich nicht
//! aendern.

pub mod events;
pub mod wire;

pub use events::{ClientEvent, ErrorPayload, MemberInfo, RoomInfo, ServerEvent, UserData};
pub use wire::{ClientCodec, FrameCodec, ServerCodec};
