pub mod scripted;

pub use scripted::{ScriptedNode, ScriptedReply};
