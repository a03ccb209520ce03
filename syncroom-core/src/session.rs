use crate::Id;

/// Marker for the identity of a connected client.
///
/// Sessions themselves are tracked by the collab layer, the core only needs to
/// refer to them when recording who added or voted for a track.
#[derive(Debug)]
pub enum Session {}

pub type SessionId = Id<Session>;
